use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use crate::core::geo::TileCoord;
use crate::tiles::disk::shard_path;
use crate::tiles::source::{TileBytes, TileSource};
use crate::{MapError, Result};

/// Pre-rendered tile tree on the local file system
#[derive(Debug, Clone)]
pub struct LocalPyramid {
    name: String,
    root: PathBuf,
    ext: String,
    min_zoom: u8,
    max_zoom: u8,
    /// Added to the engine zoom to get the directory level
    zoom_offset: u8,
}

impl LocalPyramid {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        ext: impl Into<String>,
        min_zoom: u8,
        max_zoom: u8,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ext: ext.into(),
            min_zoom,
            max_zoom,
            zoom_offset: 0,
        }
    }

    /// SAS.Planet caches number zoom levels from 1
    pub fn sas(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        ext: impl Into<String>,
        min_zoom: u8,
        max_zoom: u8,
    ) -> Self {
        Self {
            zoom_offset: 1,
            ..Self::new(name, root, ext, min_zoom, max_zoom)
        }
    }

    /// Opens a tree and derives its zoom range from the `z{N}` directories
    pub fn scan(root: impl Into<PathBuf>, ext: impl Into<String>, zoom_offset: u8) -> Result<Self> {
        let root = root.into();
        let mut levels = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let level = name
                .to_str()
                .and_then(|n| n.strip_prefix('z'))
                .and_then(|n| n.parse::<u8>().ok());
            if let Some(level) = level.and_then(|l| l.checked_sub(zoom_offset)) {
                levels.push(level);
            }
        }

        let (Some(&min_zoom), Some(&max_zoom)) = (levels.iter().min(), levels.iter().max()) else {
            return Err(MapError::Storage(format!(
                "no zoom directories under {}",
                root.display()
            )));
        };

        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tiles")
            .to_string();

        Ok(Self {
            name,
            root,
            ext: ext.into(),
            min_zoom,
            max_zoom,
            zoom_offset,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, coord: TileCoord) -> PathBuf {
        shard_path(
            &self.root,
            coord.z.saturating_add(self.zoom_offset),
            coord.x,
            coord.y,
            &self.ext,
        )
    }
}

impl TileSource for LocalPyramid {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn activate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(MapError::Storage(format!(
                "tile directory {} does not exist",
                self.root.display()
            )));
        }
        info!("Activated local pyramid {} at {}", self.name, self.root.display());
        Ok(())
    }

    fn load(&self, coord: TileCoord) -> Result<Option<TileBytes>> {
        match fs::read(self.tile_path(coord)) {
            Ok(data) => Ok(Some(TileBytes::new(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
