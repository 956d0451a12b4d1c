pub mod cache;
pub mod disk;
pub mod loader;
pub mod local;
pub mod mbtiles;
pub mod pyramid;
pub mod remote;
pub mod source;
pub mod tile;

// Re-exports for convenience
pub use cache::{CacheSlot, TileCache};
pub use loader::{FetchPipeline, TileEvent};
pub use source::{TileBytes, TileSource};
