//! Prelude module for common tilemap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilemap::prelude::*;`

pub use crate::core::{
    canvas::{Canvas, ImageCanvas},
    config::{EngineConfig, FetchConfig, TileSourceConfig},
    geo::{LatLng, LatLngBounds, PixelPoint, Point, TileCoord},
    map::{MapInfo, TileMap},
    projection::Projection,
    viewport::Viewport,
    zoom::ZoomController,
};

pub use crate::tiles::{
    cache::{CacheSlot, TileCache},
    loader::{FetchPipeline, TileEvent},
    local::LocalPyramid,
    mbtiles::EmbeddedDatabase,
    remote::RemoteProvider,
    source::{TileBytes, TileSource},
    tile::Tile,
};

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
