use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use fxhash::FxBuildHasher;
use log::debug;
use lru::LruCache;

use crate::core::constants::MAX_CACHE_TILES;
use crate::core::geo::TileCoord;
use crate::tiles::tile::Tile;

/// In-memory tile cache using LRU eviction
///
/// A single mutex guards both the map and the recency order. Once
/// [`TileCache::destroy`] has run the cache is inert: lookups miss and puts
/// are dropped.
pub struct TileCache {
    capacity: usize,
    cache: Mutex<Option<LruCache<u64, Tile, FxBuildHasher>>>,
}

impl TileCache {
    /// Create a new tile cache; a capacity of zero stores nothing
    pub fn new(capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity)
            .map(|cap| LruCache::with_hasher(cap, FxBuildHasher::default()));
        Self {
            capacity,
            cache: Mutex::new(cache),
        }
    }

    /// Capacity for a viewport of `width` x `height` pixels showing tiles
    /// `tile_px` pixels wide, with `margin` extra tiles per axis.
    ///
    /// Never more than the tiles that exist at `zoom`, nor `MAX_CACHE_TILES`.
    pub fn capacity_for(width: u32, height: u32, tile_px: f64, margin: u32, zoom: u8) -> usize {
        if tile_px <= 0.0 || !tile_px.is_finite() {
            return 0;
        }
        let per_axis = |pixels: u32| {
            // Float to int casts saturate
            ((pixels as f64 / tile_px).ceil() as usize).saturating_add(margin as usize)
        };
        let wanted = per_axis(width).saturating_mul(per_axis(height));

        let level_tiles = 1usize
            .checked_shl(2 * zoom as u32)
            .unwrap_or(usize::MAX);
        wanted.min(level_tiles).min(MAX_CACHE_TILES)
    }

    /// Get a tile from the cache, marking it most recently used
    pub fn get(&self, key: u64) -> Option<Tile> {
        self.cache.lock().ok()?.as_mut()?.get(&key).cloned()
    }

    /// Insert a tile.
    ///
    /// An existing entry is only replaced when it was generated or expired and
    /// the incoming tile is a fresh real one; otherwise the put is a no-op.
    pub fn put(&self, tile: Tile) {
        let Ok(mut guard) = self.cache.lock() else {
            return;
        };
        let Some(cache) = guard.as_mut() else {
            return;
        };

        let key = tile.key();
        if let Some(existing) = cache.peek(&key) {
            let upgrade = !tile.generated
                && !tile.expired
                && tile.has_image()
                && (existing.generated || existing.expired);
            if !upgrade {
                return;
            }
            cache.pop(&key);
        }

        if let Some((evicted, _)) = cache.push(key, tile) {
            if evicted != key {
                debug!("Evicted tile {:?}", TileCoord::from_key(evicted));
            }
        }
    }

    /// Check if a tile is in the cache without touching its recency
    pub fn contains_key(&self, key: u64) -> bool {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.as_ref().map(|c| c.contains(&key)))
            .unwrap_or(false)
    }

    /// Clear all tiles from the cache
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cache) = cache.as_mut() {
                cache.clear();
            }
        }
    }

    /// Empties the cache and makes it permanently inert
    pub fn destroy(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.cache.lock().map(|c| c.is_none()).unwrap_or(true)
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.as_ref().map(|c| c.len()))
            .unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Shared handle to the map's current cache.
///
/// Replacing the cache swaps the inner `Arc` and destroys the previous
/// instance; anyone still holding it sees an inert cache.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    current: Arc<RwLock<Arc<TileCache>>>,
}

impl CacheSlot {
    pub fn new(cache: TileCache) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(cache))),
        }
    }

    /// The cache in use right now
    pub fn current(&self) -> Arc<TileCache> {
        match self.current.read() {
            Ok(cache) => Arc::clone(&*cache),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Installs `cache` and destroys the one it replaces
    pub fn replace(&self, cache: TileCache) -> Arc<TileCache> {
        let cache = Arc::new(cache);
        let old = match self.current.write() {
            Ok(mut slot) => std::mem::replace(&mut *slot, Arc::clone(&cache)),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), Arc::clone(&cache)),
        };
        old.destroy();
        debug!(
            "Replaced tile cache (capacity {} -> {})",
            old.capacity(),
            cache.capacity()
        );
        cache
    }

    /// Destroys the current cache in place
    pub fn destroy(&self) {
        self.current().destroy();
    }
}
