use std::sync::Arc;

use crossbeam_channel::Receiver;
use image::imageops::{self, FilterType};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::core::canvas::Canvas;
use crate::core::config::EngineConfig;
use crate::core::geo::{LatLng, LatLngBounds, PixelPoint, Point, TileCoord};
use crate::core::projection::Projection;
use crate::core::viewport::Viewport;
use crate::core::zoom::ZoomController;
use crate::tiles::cache::{CacheSlot, TileCache};
use crate::tiles::loader::{FetchPipeline, TileEvent};
use crate::tiles::pyramid::PyramidSynthesizer;
use crate::tiles::source::TileSource;
use crate::tiles::tile::Tile;
use crate::{MapError, Result};

/// Serializable summary of a map's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapInfo {
    pub name: String,
    pub title: String,
    pub active: bool,
    pub remote: bool,
    pub projection: Projection,
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub source_zoom: u8,
    pub zoom: f64,
    pub dynamic_scale: f64,
    pub mpp: f64,
    pub cache_capacity: usize,
    pub bounds: Option<LatLngBounds>,
    pub load_error: Option<String>,
}

impl MapInfo {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Raster map over a tile pyramid.
///
/// Owns the zoom state, the tile cache and, for remote sources, the fetch
/// pipeline. The render thread calls [`TileMap::draw`]; it never waits on
/// the network.
pub struct TileMap {
    source: Arc<dyn TileSource>,
    config: EngineConfig,
    projection: Projection,
    zoom: ZoomController,
    slot: CacheSlot,
    pipeline: Option<FetchPipeline>,
    active: bool,
    width: u32,
    height: u32,
    /// Latitude of the last drawn centre, used for resolution figures
    reference_latitude: f64,
    load_error: Option<String>,
}

impl TileMap {
    /// Map whose unscaled level is the source's finest zoom
    pub fn new(source: Arc<dyn TileSource>, config: EngineConfig) -> Self {
        let default_zoom = source.max_zoom();
        Self::with_default_zoom(source, config, default_zoom)
    }

    pub fn with_default_zoom(
        source: Arc<dyn TileSource>,
        config: EngineConfig,
        default_zoom: u8,
    ) -> Self {
        let zoom = ZoomController::new(source.min_zoom(), source.max_zoom(), default_zoom);
        let projection = Projection::from_ellipsoid_flag(source.ellipsoid());
        Self {
            source,
            config,
            projection,
            zoom,
            slot: CacheSlot::new(TileCache::new(0)),
            pipeline: None,
            active: false,
            width: 0,
            height: 0,
            reference_latitude: 0.0,
            load_error: None,
        }
    }

    /// Opens the source, sizes the cache for a `width` x `height` viewport and
    /// starts the fetch workers of a remote source.
    pub fn activate(&mut self, width: u32, height: u32, zoom: f64) -> Result<()> {
        if self.active {
            return Ok(());
        }
        if let Err(e) = self.source.activate() {
            error!("Failed to activate {}: {}", self.source.name(), e);
            self.load_error = Some(e.to_string());
            return Err(e);
        }
        self.load_error = None;

        if self.source.is_remote() {
            self.pipeline = Some(FetchPipeline::new(
                Arc::clone(&self.source),
                self.slot.clone(),
                &self.config.fetch,
            ));
        }

        self.width = width;
        self.height = height;
        self.active = true;
        self.zoom.set_zoom(zoom);
        self.recalculate_cache();

        info!("Activated map {}", self.title());
        Ok(())
    }

    /// Stops the workers, drops the cache and closes the source
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
        self.slot.destroy();
        self.source.deactivate();
        info!("Deactivated map {}", self.source.name());
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    pub fn zoom_controller(&self) -> &ZoomController {
        &self.zoom
    }

    pub fn zoom(&self) -> f64 {
        self.zoom.zoom()
    }

    /// Applies a zoom factor, resizing the cache and dropping queued
    /// downloads when the level or scale changes.
    pub fn set_zoom(&mut self, zoom: f64) {
        if !self.zoom.set_zoom(zoom) {
            return;
        }
        self.recalculate_cache();
        if let Some(pipeline) = &self.pipeline {
            pipeline.reset();
        }
    }

    /// Zooms so that one pixel covers `mpp` meters at the reference latitude
    pub fn zoom_to_mpp(&mut self, mpp: f64) {
        let zoom = self
            .zoom
            .zoom_for_mpp(mpp, self.reference_latitude, self.source.tile_size());
        self.set_zoom(zoom);
    }

    pub fn next_zoom(&self) -> f64 {
        self.zoom.next_zoom()
    }

    pub fn prev_zoom(&self) -> f64 {
        self.zoom.prev_zoom()
    }

    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.recalculate_cache();
    }

    fn recalculate_cache(&mut self) {
        if !self.active {
            return;
        }
        let capacity = TileCache::capacity_for(
            self.width,
            self.height,
            self.scaled_size(),
            self.config.cache_margin,
            self.zoom.source_zoom(),
        );
        self.slot.replace(TileCache::new(capacity));
        debug!("Cache sized to {} tiles for {}", capacity, self.title());
    }

    /// On-screen size of one tile
    pub fn scaled_size(&self) -> f64 {
        self.source.tile_size() as f64 * self.zoom.dynamic_scale()
    }

    /// Fractional map pixel of a geographic point
    pub fn lat_lon_to_point(&self, lat: f64, lon: f64) -> Point {
        let p = self
            .projection
            .forward(lat, lon, self.zoom.source_zoom(), self.source.tile_size());
        let scale = self.zoom.dynamic_scale();
        Point::new(p.x * scale, p.y * scale)
    }

    pub fn lat_lon_to_pixel(&self, lat: f64, lon: f64) -> PixelPoint {
        self.lat_lon_to_point(lat, lon).floor()
    }

    pub fn pixel_to_lat_lon(&self, x: f64, y: f64) -> LatLng {
        let scale = self.zoom.dynamic_scale();
        self.projection.inverse(
            x / scale,
            y / scale,
            self.zoom.source_zoom(),
            self.source.tile_size(),
        )
    }

    /// Tile under a geographic point at the current source zoom
    pub fn tile_at(&self, lat: f64, lon: f64) -> TileCoord {
        self.projection
            .tile_for(lat, lon, self.zoom.source_zoom(), self.source.tile_size())
    }

    /// Whether the map has imagery for the point
    pub fn covers(&self, lat: f64, lon: f64) -> bool {
        let point = LatLng::new(lat, lon);
        if !point.in_mercator_band() || !(-180.0..=180.0).contains(&lon) {
            return false;
        }
        self.source
            .bounds()
            .map(|bounds| bounds.contains(&point))
            .unwrap_or(true)
    }

    /// Meters per on-screen pixel at the reference latitude
    pub fn mpp(&self) -> f64 {
        self.zoom
            .mpp(self.reference_latitude, self.source.tile_size())
    }

    pub fn title(&self) -> String {
        format!("{} ({})", self.source.name(), self.zoom.source_zoom())
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Tile arrival notifications; `None` for local sources
    pub fn events(&self) -> Option<Receiver<TileEvent>> {
        self.pipeline.as_ref().map(FetchPipeline::events)
    }

    pub fn pipeline(&self) -> Option<&FetchPipeline> {
        self.pipeline.as_ref()
    }

    pub fn cache(&self) -> Arc<TileCache> {
        self.slot.current()
    }

    pub fn info(&self) -> MapInfo {
        MapInfo {
            name: self.source.name(),
            title: self.title(),
            active: self.active,
            remote: self.source.is_remote(),
            projection: self.projection,
            tile_size: self.source.tile_size(),
            min_zoom: self.zoom.min_zoom(),
            max_zoom: self.zoom.max_zoom(),
            source_zoom: self.zoom.source_zoom(),
            zoom: self.zoom.zoom(),
            dynamic_scale: self.zoom.dynamic_scale(),
            mpp: self.mpp(),
            cache_capacity: self.slot.current().capacity(),
            bounds: self.source.bounds(),
            load_error: self.load_error.clone(),
        }
    }

    /// Tile at column `x`, row `y` of the current source zoom.
    ///
    /// Tries the cache, then storage, then an ancestor stretched in its
    /// place. Remote sources get a download queued for anything missing or
    /// stale.
    pub fn tile(&self, x: u32, y: u32) -> Option<Tile> {
        let coord = TileCoord::new(x, y, self.zoom.source_zoom());
        if !coord.is_valid() {
            return None;
        }
        let cache = self.slot.current();
        if let Some(tile) = cache.get(coord.key()) {
            return Some(tile);
        }

        let loaded = match self.source.load(coord) {
            Ok(Some(bytes)) => match Tile::decode(coord, &bytes.data) {
                Ok(tile) => Some(tile.with_expired(bytes.expired)),
                Err(e) => {
                    warn!("Undecodable tile {:?}: {}", coord, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Failed to load tile {:?}: {}", coord, e);
                None
            }
        };

        if let Some(tile) = loaded {
            if tile.expired {
                self.request(coord);
            }
            cache.put(tile.clone());
            return Some(tile);
        }

        let generated = PyramidSynthesizer::new(self.source.as_ref(), &cache).synthesize(coord);
        if let Some(tile) = &generated {
            cache.put(tile.clone());
        }
        self.request(coord);
        generated
    }

    fn request(&self, coord: TileCoord) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.request(coord);
        }
    }

    /// Paints the tiles visible in `viewport` onto `canvas`.
    ///
    /// Returns `Ok(true)` when the canvas is completely covered, `Ok(false)`
    /// when the map ends inside it or some tile is not available yet.
    /// `MapError::OutOfMemory` means a tile could not be resampled within the
    /// configured pixel budget; the caller should clear and degrade.
    pub fn draw(&mut self, viewport: &mut Viewport, canvas: &mut dyn Canvas) -> Result<bool> {
        if !self.active {
            return Err(MapError::Inactive);
        }
        if !viewport.center.is_valid() {
            return Err(MapError::InvalidCoordinates(format!(
                "viewport centre {}, {}",
                viewport.center.lat, viewport.center.lng
            )));
        }

        self.reference_latitude = viewport.center.lat;
        self.set_viewport_size(viewport.canvas_width, viewport.canvas_height);
        viewport.center_xy = self.lat_lon_to_pixel(viewport.center.lat, viewport.center.lng);
        let focus = viewport.focus();

        let width = viewport.canvas_width as i64;
        let height = viewport.canvas_height as i64;
        let tile_wh = self.scaled_size();
        let twh = tile_wh.round() as u32;
        let last = (1i64 << self.zoom.source_zoom()) - 1;

        let left = (focus.x - width / 2) as f64;
        let top = (focus.y - height / 2) as f64;
        let mut c_min = (left / tile_wh).floor() as i64;
        let mut c_max = ((left + width as f64 - 1.0) / tile_wh).floor() as i64;
        let mut r_min = (top / tile_wh).floor() as i64;
        let mut r_max = ((top + height as f64 - 1.0) / tile_wh).floor() as i64;

        let mut result = true;
        if c_min < 0 {
            c_min = 0;
            result = false;
        }
        if r_min < 0 {
            r_min = 0;
            result = false;
        }
        if c_max > last {
            c_max = last;
            result = false;
        }
        if r_max > last {
            r_max = last;
            result = false;
        }
        if c_min > c_max || r_min > r_max {
            return Ok(false);
        }

        let center_col = ((focus.x as f64 / tile_wh).floor() as i64).clamp(c_min, c_max);
        let center_row = ((focus.y as f64 / tile_wh).floor() as i64).clamp(r_min, r_max);
        let reach = (center_col - c_min)
            .max(c_max - center_col)
            .max(center_row - r_min)
            .max(r_max - center_row);

        let origin_x = (width / 2 - focus.x) as f64;
        let origin_y = (height / 2 - focus.y) as f64;

        for (dx, dy) in spiral(2 * reach + 1) {
            let (col, row) = (center_col + dx, center_row + dy);
            if col < c_min || col > c_max || row < r_min || row > r_max {
                continue;
            }

            let Some(image) = self.tile(col as u32, row as u32).and_then(|t| t.image) else {
                result = false;
                continue;
            };

            let x = (origin_x + col as f64 * tile_wh).round() as i64;
            let y = (origin_y + row as f64 * tile_wh).round() as i64;

            if image.width() != twh || image.height() != twh {
                let pixels = twh as u64 * twh as u64;
                if pixels > self.config.max_scaled_pixels {
                    return Err(MapError::OutOfMemory(format!(
                        "resampling a tile to {}x{} exceeds {} pixels",
                        twh, twh, self.config.max_scaled_pixels
                    )));
                }
                let scaled = imageops::resize(&*image, twh, twh, FilterType::Triangle);
                canvas.draw_tile(&scaled, x, y);
            } else {
                canvas.draw_tile(&image, x, y);
            }
        }

        Ok(result)
    }
}

impl Drop for TileMap {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Offsets of a `side` x `side` square walked outward from its centre
fn spiral(side: i64) -> impl Iterator<Item = (i64, i64)> {
    let (mut x, mut y, mut dx, mut dy) = (0i64, 0i64, 0i64, -1i64);
    (0..side * side).map(move |_| {
        let position = (x, y);
        if x == y || (x < 0 && x == -y) || (x > 0 && x == 1 - y) {
            let turn = dx;
            dx = -dy;
            dy = turn;
        }
        x += dx;
        y += dy;
        position
    })
}
