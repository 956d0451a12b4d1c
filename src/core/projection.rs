//! Web-Mercator projection between WGS84 degrees and map pixels.
//!
//! Two flavours are supported: the spherical variant used by most XYZ
//! servers and the ellipsoidal (WGS84) variant used by a few national
//! providers. Neither fails; latitudes outside the Mercator band are clamped
//! and longitudes outside [-180, 180] land outside the pixel extent.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::core::constants::{INVERSE_EPSILON, INVERSE_MAX_ITERATIONS, WGS84_ECCENTRICITY};
use crate::core::geo::{LatLng, Point, TileCoord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    Spherical,
    Ellipsoidal,
}

impl Projection {
    pub fn from_ellipsoid_flag(ellipsoid: bool) -> Self {
        if ellipsoid {
            Projection::Ellipsoidal
        } else {
            Projection::Spherical
        }
    }

    /// Side of the whole world in pixels at `zoom`
    pub fn world_size(zoom: u8, tile_size: u32) -> f64 {
        tile_size as f64 * 2f64.powi(zoom as i32)
    }

    /// Projects geographic coordinates to fractional pixels
    pub fn forward(&self, lat: f64, lng: f64, zoom: u8, tile_size: u32) -> Point {
        let size = Self::world_size(zoom, tile_size);
        let lat = LatLng::clamp_lat(lat).to_radians();

        let x = size * (lng + 180.0) / 360.0;
        let mercator = match self {
            Projection::Spherical => (lat.tan() + 1.0 / lat.cos()).ln(),
            Projection::Ellipsoidal => {
                let sin = lat.sin();
                sin.atanh() - WGS84_ECCENTRICITY * (WGS84_ECCENTRICITY * sin).atanh()
            }
        };
        let y = size * (1.0 - mercator / PI) / 2.0;

        Point::new(x, y)
    }

    /// Inverse of [`Projection::forward`]
    pub fn inverse(&self, x: f64, y: f64, zoom: u8, tile_size: u32) -> LatLng {
        let size = Self::world_size(zoom, tile_size);
        let lng = x / size * 360.0 - 180.0;
        let psi = PI * (1.0 - 2.0 * y / size);

        let lat = match self {
            Projection::Spherical => psi.sinh().atan(),
            Projection::Ellipsoidal => ellipsoidal_latitude(psi),
        };

        LatLng::new(lat.to_degrees(), lng)
    }

    /// Tile containing the given point, clamped into the zoom's extent
    pub fn tile_for(&self, lat: f64, lng: f64, zoom: u8, tile_size: u32) -> TileCoord {
        let p = self.forward(lat, lng, zoom, tile_size);
        let max = (1u64 << zoom) as f64 - 1.0;
        let column = (p.x / tile_size as f64).floor().clamp(0.0, max);
        let row = (p.y / tile_size as f64).floor().clamp(0.0, max);
        TileCoord::new(column as u32, row as u32, zoom)
    }
}

/// Fixed-point solve of the conformal latitude; returns the last estimate
/// when the iteration cap is reached.
fn ellipsoidal_latitude(psi: f64) -> f64 {
    let e = WGS84_ECCENTRICITY;
    let t = psi.exp();
    let mut phi = 2.0 * t.atan() - PI / 2.0;

    for _ in 0..INVERSE_MAX_ITERATIONS {
        let es = e * phi.sin();
        let next = 2.0 * (t * ((1.0 + es) / (1.0 - es)).powf(e / 2.0)).atan() - PI / 2.0;
        if (next - phi).abs() < INVERSE_EPSILON {
            return next;
        }
        phi = next;
    }
    phi
}
