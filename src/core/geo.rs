use serde::{Deserialize, Serialize};

use crate::core::constants::{KEY_COORD_BITS, MAX_KEY_ZOOM, MAX_LATITUDE};

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Whether the latitude lies inside the Mercator-valid band
    pub fn in_mercator_band(&self) -> bool {
        self.lat > -MAX_LATITUDE && self.lat < MAX_LATITUDE
    }

    /// Clamps latitude to the Mercator-valid band
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Fractional point in projected pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer pixel containing this point
    pub fn floor(&self) -> PixelPoint {
        PixelPoint::new(self.x.floor() as i64, self.y.floor() as i64)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Integer pixel coordinates in map space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i64, dy: i64) -> PixelPoint {
        PixelPoint::new(self.x + dx, self.y + dy)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Parses the OpenLayers `left,bottom,right,top` form used by MBTiles metadata
    pub fn parse_ltrb(value: &str) -> Option<Self> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [left, bottom, right, top] => Some(Self::from_coords(*bottom, *left, *top, *right)),
            _ => None,
        }
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Packs the coordinate into a single ordinal key.
    ///
    /// Layout is `z << 48 | x << 24 | y`; zoom levels up to 24 never overlap
    /// because `x` and `y` stay below `2^z`.
    pub fn key(&self) -> u64 {
        ((self.z as u64) << (2 * KEY_COORD_BITS))
            | ((self.x as u64) << KEY_COORD_BITS)
            | self.y as u64
    }

    /// Inverse of [`TileCoord::key`]
    pub fn from_key(key: u64) -> Self {
        let mask = (1u64 << KEY_COORD_BITS) - 1;
        Self {
            x: ((key >> KEY_COORD_BITS) & mask) as u32,
            y: (key & mask) as u32,
            z: (key >> (2 * KEY_COORD_BITS)) as u8,
        }
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.z
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Row index counted from the south edge (TMS convention)
    pub fn tms_y(&self) -> u32 {
        (self.tiles_per_axis() - 1 - self.y as u64) as u32
    }

    /// Bing-style quadtree key
    pub fn quadkey(&self) -> String {
        (1..=self.z)
            .rev()
            .map(|i| {
                let bit = i - 1;
                let digit = ((self.x >> bit) & 1) | (((self.y >> bit) & 1) << 1);
                char::from(b'0' + digit as u8)
            })
            .collect()
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        self.z <= MAX_KEY_ZOOM
            && (self.x as u64) < self.tiles_per_axis()
            && (self.y as u64) < self.tiles_per_axis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
        assert!(coord.in_mercator_band());
        assert!(!LatLng::new(86.0, 0.0).in_mercator_band());
    }

    #[test]
    fn test_key_round_trip() {
        let coord = TileCoord::new(1234, 5678, 14);
        assert_eq!(TileCoord::from_key(coord.key()), coord);

        let deepest = TileCoord::new((1 << 24) - 1, (1 << 24) - 1, 24);
        assert_eq!(TileCoord::from_key(deepest.key()), deepest);
    }

    #[test]
    fn test_key_orders_by_zoom_first() {
        let coarse = TileCoord::new(1, 1, 1);
        let fine = TileCoord::new(0, 0, 2);
        assert!(coarse.key() < fine.key());
    }

    #[test]
    fn test_quadkey() {
        // Example from the Bing Maps tile system documentation
        assert_eq!(TileCoord::new(3, 5, 3).quadkey(), "213");
        assert_eq!(TileCoord::new(0, 0, 0).quadkey(), "");
    }

    #[test]
    fn test_tms_row_inversion() {
        assert_eq!(TileCoord::new(0, 0, 2).tms_y(), 3);
        assert_eq!(TileCoord::new(0, 3, 2).tms_y(), 0);
    }

    #[test]
    fn test_parent() {
        let tile = TileCoord::new(5, 7, 3);
        assert_eq!(tile.parent(), Some(TileCoord::new(2, 3, 2)));
        assert_eq!(TileCoord::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_bounds_parse_and_contains() {
        let bounds = LatLngBounds::parse_ltrb("-75.0, 40.0, -73.0, 41.0").unwrap();
        assert!(bounds.contains(&LatLng::new(40.5, -74.0)));
        assert!(!bounds.contains(&LatLng::new(42.0, -74.0)));
        assert!(LatLngBounds::parse_ltrb("1,2,3").is_none());
        assert!(LatLngBounds::parse_ltrb("a,b,c,d").is_none());
    }
}
