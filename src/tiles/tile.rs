use std::sync::Arc;

use image::RgbaImage;

use crate::core::geo::TileCoord;
use crate::Result;

/// A decoded tile as held by the cache.
///
/// Cloning is cheap: the pixels are shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    /// `None` means the tile was requested but nothing is available
    pub image: Option<Arc<RgbaImage>>,
    /// Built from a coarser ancestor rather than loaded
    pub generated: bool,
    /// Loaded from a disk copy older than the source TTL
    pub expired: bool,
}

impl Tile {
    pub fn new(coord: TileCoord, image: RgbaImage) -> Self {
        Self {
            coord,
            image: Some(Arc::new(image)),
            generated: false,
            expired: false,
        }
    }

    pub fn empty(coord: TileCoord) -> Self {
        Self {
            coord,
            image: None,
            generated: false,
            expired: false,
        }
    }

    /// Decodes PNG/JPEG/... bytes into an RGBA tile
    pub fn decode(coord: TileCoord, data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data)?.to_rgba8();
        Ok(Self::new(coord, image))
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn with_expired(mut self, expired: bool) -> Self {
        self.expired = expired;
        self
    }

    pub fn key(&self) -> u64 {
        self.coord.key()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn width(&self) -> u32 {
        self.image.as_ref().map(|i| i.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.image.as_ref().map(|i| i.height()).unwrap_or(0)
    }
}
