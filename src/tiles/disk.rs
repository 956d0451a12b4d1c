use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::debug;

use crate::core::constants::SHARD_SIZE;
use crate::core::geo::TileCoord;
use crate::tiles::source::TileBytes;
use crate::Result;

/// Path of a tile in the sharded layout
/// `{root}/z{Z}/{X/1024}/x{X}/{Y/1024}/y{Y}{ext}`.
pub fn shard_path(root: &Path, zoom: u8, x: u32, y: u32, ext: &str) -> PathBuf {
    root.join(format!("z{}", zoom))
        .join((x / SHARD_SIZE).to_string())
        .join(format!("x{}", x))
        .join((y / SHARD_SIZE).to_string())
        .join(format!("y{}{}", y, ext))
}

/// On-disk copy of downloaded tiles for one provider
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    ttl: Option<Duration>,
}

impl DiskCache {
    /// Cache rooted at `{cache_root}/tiles/{code}`
    pub fn new(cache_root: &Path, code: &str, ttl: Option<Duration>) -> Self {
        Self {
            root: cache_root.join("tiles").join(code),
            ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, coord: TileCoord) -> PathBuf {
        shard_path(&self.root, coord.z, coord.x, coord.y, ".png")
    }

    /// Reads a stored tile, flagging it expired when older than the TTL
    pub fn load(&self, coord: TileCoord) -> Result<Option<TileBytes>> {
        let path = self.tile_path(coord);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let expired = match self.ttl {
            Some(ttl) => {
                let modified = fs::metadata(&path)?.modified()?;
                SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age > ttl)
                    .unwrap_or(false)
            }
            None => false,
        };

        Ok(Some(TileBytes { data, expired }))
    }

    /// Writes a tile, replacing any previous copy atomically
    pub fn store(&self, coord: TileCoord, data: &[u8]) -> Result<()> {
        let path = self.tile_path(coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = path.with_extension("part");
        fs::write(&partial, data)?;
        fs::rename(&partial, &path)?;

        debug!("Stored tile {:?} at {}", coord, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shard_path() {
        let path = shard_path(Path::new("/maps/sas"), 14, 2049, 5000, ".jpg");
        assert_eq!(path, PathBuf::from("/maps/sas/z14/2/x2049/4/y5000.jpg"));
    }

    #[test]
    fn test_cache_layout() {
        let cache = DiskCache::new(Path::new("/var/cache"), "osm", None);
        assert_eq!(
            cache.tile_path(TileCoord::new(3, 1025, 11)),
            PathBuf::from("/var/cache/tiles/osm/z11/0/x3/1/y1025.png")
        );
    }

    #[test]
    fn test_store_and_load() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path(), "osm", None);
        let coord = TileCoord::new(1, 2, 3);

        assert_eq!(cache.load(coord).unwrap(), None);
        cache.store(coord, &[1, 2, 3]).unwrap();
        assert_eq!(cache.load(coord).unwrap(), Some(TileBytes::new(vec![1, 2, 3])));

        cache.store(coord, &[4]).unwrap();
        assert_eq!(cache.load(coord).unwrap().unwrap().data, vec![4]);
    }

    #[test]
    fn test_expired_copy() {
        let temp = TempDir::new().unwrap();
        let coord = TileCoord::new(0, 0, 0);
        DiskCache::new(temp.path(), "osm", None)
            .store(coord, &[9])
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let stale = DiskCache::new(temp.path(), "osm", Some(Duration::from_millis(1)));
        assert!(stale.load(coord).unwrap().unwrap().expired);

        let fresh = DiskCache::new(temp.path(), "osm", Some(Duration::from_secs(3600)));
        assert!(!fresh.load(coord).unwrap().unwrap().expired);
    }
}
