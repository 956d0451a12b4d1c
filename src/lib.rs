//! # tilemap
//!
//! A raster tile map engine for arbitrarily large map pyramids.
//!
//! The engine projects between WGS84 coordinates and map pixels, manages a
//! continuous zoom factor on top of discrete pyramid levels, keeps a bounded
//! LRU cache of decoded tiles, stretches coarser ancestors when a tile is
//! missing, and resolves remote tiles on a background worker pool without
//! blocking the render path.
//!
//! Tile bytes come from pluggable [`TileSource`] backends: a local
//! pre-rendered file tree, MBTiles/SQLite databases and remote XYZ servers
//! with an on-disk cache.

pub mod core;
pub mod logging;
pub mod prelude;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    canvas::{Canvas, ImageCanvas},
    config::{EngineConfig, FetchConfig, TileSourceConfig},
    geo::{LatLng, LatLngBounds, PixelPoint, Point, TileCoord},
    map::{MapInfo, TileMap},
    projection::Projection,
    viewport::Viewport,
    zoom::ZoomController,
};

pub use tiles::{
    cache::{CacheSlot, TileCache},
    loader::{FetchPipeline, TileEvent},
    local::LocalPyramid,
    mbtiles::{DatabaseSchema, EmbeddedDatabase},
    pyramid::PyramidSynthesizer,
    remote::{HttpClient, RemoteProvider, ReqwestClient},
    source::{TileBytes, TileSource},
    tile::Tile,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Map is not active")]
    Inactive,
}

/// Error type alias for convenience
pub type Error = MapError;
