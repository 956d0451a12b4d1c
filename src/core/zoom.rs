use std::f64::consts::PI;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::constants::{DYNAMIC_SCALE_SNAP, EARTH_RADIUS};

/// Maps a continuous zoom factor onto a discrete pyramid level plus a
/// residual scale applied when painting.
///
/// A factor of `1.0` shows the pyramid at `default_zoom` unscaled; every
/// doubling moves one source level up until the pyramid's edge, after which
/// the remainder is absorbed by `dynamic_scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomController {
    zoom: f64,
    source_zoom: u8,
    default_zoom: u8,
    dynamic_scale: f64,
    min_zoom: u8,
    max_zoom: u8,
}

impl ZoomController {
    pub fn new(min_zoom: u8, max_zoom: u8, default_zoom: u8) -> Self {
        let default_zoom = default_zoom.clamp(min_zoom, max_zoom);
        Self {
            zoom: 1.0,
            source_zoom: default_zoom,
            default_zoom,
            dynamic_scale: 1.0,
            min_zoom,
            max_zoom,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn source_zoom(&self) -> u8 {
        self.source_zoom
    }

    pub fn default_zoom(&self) -> u8 {
        self.default_zoom
    }

    pub fn dynamic_scale(&self) -> f64 {
        self.dynamic_scale
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Applies a zoom factor. Returns `true` when the source level or the
    /// dynamic scale changed, which invalidates the tile cache.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        if !zoom.is_finite() || zoom <= 0.0 {
            warn!("Ignoring invalid zoom factor {}", zoom);
            return false;
        }

        let delta = zoom.log2().round() as i64;
        let source_zoom = (self.default_zoom as i64 + delta)
            .clamp(self.min_zoom as i64, self.max_zoom as i64) as u8;
        let mut dynamic_scale =
            zoom / 2f64.powi(source_zoom as i32 - self.default_zoom as i32);
        if (dynamic_scale - 1.0).abs() < DYNAMIC_SCALE_SNAP {
            dynamic_scale = 1.0;
        }

        let changed = source_zoom != self.source_zoom || dynamic_scale != self.dynamic_scale;
        self.zoom = zoom;
        self.source_zoom = source_zoom;
        self.dynamic_scale = dynamic_scale;

        if changed {
            debug!(
                "Zoom {:.4}: source level {}, dynamic scale {:.4}",
                zoom, source_zoom, dynamic_scale
            );
        }
        changed
    }

    /// Factor showing one source level closer, or `0.0` at the top of the pyramid
    pub fn next_zoom(&self) -> f64 {
        if self.source_zoom >= self.max_zoom {
            return 0.0;
        }
        2f64.powi(self.source_zoom as i32 + 1 - self.default_zoom as i32)
    }

    /// Factor showing one source level further, or `0.0` at the bottom of the pyramid
    pub fn prev_zoom(&self) -> f64 {
        if self.source_zoom <= self.min_zoom {
            return 0.0;
        }
        2f64.powi(self.source_zoom as i32 - 1 - self.default_zoom as i32)
    }

    /// Meters per on-screen pixel at `latitude`
    pub fn mpp(&self, latitude: f64, tile_size: u32) -> f64 {
        level_mpp(self.source_zoom, latitude, tile_size) / self.dynamic_scale
    }

    /// Meters per pixel of the unscaled default level
    pub fn absolute_mpp(&self, latitude: f64, tile_size: u32) -> f64 {
        level_mpp(self.default_zoom, latitude, tile_size)
    }

    /// Zoom factor at which the map shows `mpp` meters per pixel
    pub fn zoom_for_mpp(&self, mpp: f64, latitude: f64, tile_size: u32) -> f64 {
        self.absolute_mpp(latitude, tile_size) / mpp
    }
}

fn level_mpp(zoom: u8, latitude: f64, tile_size: u32) -> f64 {
    EARTH_RADIUS * 2.0 * PI * latitude.to_radians().cos()
        / (2f64.powi(zoom as i32) * tile_size as f64)
}
