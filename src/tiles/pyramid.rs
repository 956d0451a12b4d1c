use image::imageops::{self, FilterType};
use log::{debug, warn};

use crate::core::geo::TileCoord;
use crate::tiles::cache::TileCache;
use crate::tiles::source::TileSource;
use crate::tiles::tile::Tile;

/// Stands in for a missing tile by stretching the matching part of the
/// nearest ancestor found in the cache or in the source's storage.
pub struct PyramidSynthesizer<'a> {
    source: &'a dyn TileSource,
    cache: &'a TileCache,
}

impl<'a> PyramidSynthesizer<'a> {
    pub fn new(source: &'a dyn TileSource, cache: &'a TileCache) -> Self {
        Self { source, cache }
    }

    /// Builds a generated tile for `coord`, or `None` when no ancestor down
    /// to the source's minimum zoom has pixels to spare.
    pub fn synthesize(&self, coord: TileCoord) -> Option<Tile> {
        let min_zoom = self.source.min_zoom();
        let mut ancestor = coord.parent()?;
        let mut scale: u32 = 2;

        loop {
            if ancestor.z < min_zoom {
                return None;
            }

            if let Some(parent) = self.ancestor(ancestor) {
                if let Some(image) = parent.image.as_ref() {
                    if scale <= image.width() && scale <= image.height() {
                        let mini_w = image.width() / scale;
                        let mini_h = image.height() / scale;
                        let from_x = (coord.x % scale) * mini_w;
                        let from_y = (coord.y % scale) * mini_h;

                        let mini = imageops::crop_imm(&**image, from_x, from_y, mini_w, mini_h)
                            .to_image();
                        let stretched =
                            imageops::resize(&mini, mini_w * scale, mini_h * scale, FilterType::Nearest);

                        debug!("Synthesized {:?} from {:?} (x{})", coord, ancestor, scale);
                        return Some(Tile::new(coord, stretched).generated());
                    }
                }
            }

            ancestor = ancestor.parent()?;
            scale = scale.checked_mul(2)?;
        }
    }

    fn ancestor(&self, coord: TileCoord) -> Option<Tile> {
        if self.cache.contains_key(coord.key()) {
            return self.cache.get(coord.key());
        }
        match self.source.load(coord) {
            Ok(Some(bytes)) => match Tile::decode(coord, &bytes.data) {
                Ok(tile) => Some(tile),
                Err(e) => {
                    warn!("Undecodable ancestor tile {:?}: {}", coord, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load ancestor tile {:?}: {}", coord, e);
                None
            }
        }
    }
}
