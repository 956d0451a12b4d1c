//! Core constants shared by the projection, zoom and cache code.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

use std::time::Duration;

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Equatorial radius of the WGS84 ellipsoid in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Northern and southern limit of the Mercator-valid latitude band.
pub const MAX_LATITUDE: f64 = 85.051129;

/// First eccentricity of the WGS84 ellipsoid, as used by ellipsoidal Mercator servers.
pub const WGS84_ECCENTRICITY: f64 = 0.0818197;

/// Convergence threshold (radians) of the ellipsoidal inverse projection.
pub const INVERSE_EPSILON: f64 = 1e-7;

/// Iteration cap of the ellipsoidal inverse projection.
pub const INVERSE_MAX_ITERATIONS: u32 = 100_000;

/// Dynamic scale factors closer than this to 1.0 are snapped to 1.0 (1/128).
pub const DYNAMIC_SCALE_SNAP: f64 = 0.0078125;

/// Highest zoom level a tile key can encode.
pub const MAX_KEY_ZOOM: u8 = 24;

/// Bits reserved for each of the column and row in a tile key.
pub const KEY_COORD_BITS: u32 = 24;

/// Extra tiles kept in cache beyond the visible grid, per axis.
pub const CACHE_MARGIN: u32 = 2;

/// Hard ceiling on cache slots whatever the viewport and zoom.
pub const MAX_CACHE_TILES: usize = 4096;

/// How long shutdown waits for idle fetch workers before detaching them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(50);

/// Directory fan-out bucket of the sharded tile layouts.
pub const SHARD_SIZE: u32 = 1024;

/// Zoom base of the RMaps/BigPlanet SQLite schema (`z` column holds `17 - zoom`).
pub const RMAPS_BASE_ZOOM: i64 = 17;

/// Default number of download workers for a remote provider.
pub const DEFAULT_FETCH_THREADS: usize = 4;
