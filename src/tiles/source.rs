use crate::core::constants::TILE_SIZE;
use crate::core::geo::{LatLngBounds, TileCoord};
use crate::{MapError, Result};

/// Raw tile bytes as read from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBytes {
    pub data: Vec<u8>,
    /// The stored copy is older than the source allows
    pub expired: bool,
}

impl TileBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            expired: false,
        }
    }

    pub fn expired(data: Vec<u8>) -> Self {
        Self {
            data,
            expired: true,
        }
    }
}

/// Backend that produces tile bytes for a pyramid.
///
/// `load` is synchronous and only touches local storage; remote sources
/// additionally implement `download`/`store`, which the fetch pipeline
/// calls from its workers.
pub trait TileSource: Send + Sync {
    fn name(&self) -> String;

    fn min_zoom(&self) -> u8;

    fn max_zoom(&self) -> u8;

    fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    /// Tiles are laid out in ellipsoidal rather than spherical Mercator
    fn ellipsoid(&self) -> bool {
        false
    }

    /// Geographic coverage, `None` for the whole world
    fn bounds(&self) -> Option<LatLngBounds> {
        None
    }

    /// Acquires resources (connections, directories) before use
    fn activate(&self) -> Result<()> {
        Ok(())
    }

    /// Releases whatever `activate` acquired
    fn deactivate(&self) {}

    /// Reads a tile from local storage; `Ok(None)` when it is not there
    fn load(&self, coord: TileCoord) -> Result<Option<TileBytes>>;

    fn is_remote(&self) -> bool {
        false
    }

    /// Fetches a tile over the network
    fn download(&self, coord: TileCoord) -> Result<Vec<u8>> {
        Err(MapError::Network(format!(
            "{} cannot download tile {:?}",
            self.name(),
            coord
        )))
    }

    /// Persists downloaded bytes so later `load` calls find them
    fn store(&self, _coord: TileCoord, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Download workers wanted by this source
    fn worker_count(&self) -> usize {
        0
    }
}
