//! Configuration for tile sources and the engine
//!
//! Source descriptions are immutable once a source is activated. Engine and
//! fetch settings come with presets in the same spirit as the loader presets,
//! so hosts can pick a profile instead of tuning every knob.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{CACHE_MARGIN, DEFAULT_FETCH_THREADS, TILE_SIZE};
use crate::{MapError, Result};

/// How much detail each log line carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogMode {
    /// Module path and line number prefix every message
    Full,
    /// Bare message
    #[default]
    Light,
    /// Logging disabled
    None,
}

/// Description of a tile provider or tile store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSourceConfig {
    pub name: String,
    /// Short identifier, also the disk cache directory name
    pub code: String,
    /// URL template for remote providers, file or directory path otherwise
    pub uri: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub ellipsoid: bool,
    pub inverse_y: bool,
    /// Download workers for remote providers
    pub threads: usize,
    /// Age after which a disk copy is considered stale
    pub ttl: Option<Duration>,
    /// Mirror hosts substituted for `{$s}`
    pub servers: Vec<String>,
    pub secret: Option<String>,
    /// Locale substituted for `{$l}`; the process locale when unset
    pub locale: Option<String>,
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            code: String::new(),
            uri: String::new(),
            min_zoom: 0,
            max_zoom: 18,
            tile_size: TILE_SIZE,
            ellipsoid: false,
            inverse_y: false,
            threads: DEFAULT_FETCH_THREADS,
            ttl: None,
            servers: Vec::new(),
            secret: None,
            locale: None,
        }
    }
}

impl TileSourceConfig {
    pub fn new(name: impl Into<String>, code: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Parses a provider line:
    ///
    /// `name, code, minzoom, maxzoom, tilesize, uri, server1, server2, server3,
    /// server4, flag, secret, threads, ttl_secs`
    ///
    /// Fields may be double-quoted. `{comma}` in the uri stands for a literal comma.
    pub fn from_provider_line(line: &str) -> Result<Self> {
        let fields = split_csv(line);
        if fields.len() < 6 {
            return Err(MapError::Config(format!(
                "provider line needs at least 6 fields, got {}",
                fields.len()
            )));
        }
        let field = |i: usize| fields.get(i).map(|f| f.as_str()).unwrap_or("");

        if field(0).is_empty() || field(1).is_empty() || field(5).is_empty() {
            return Err(MapError::Config(
                "provider name, code and uri are required".to_string(),
            ));
        }

        let mut config = TileSourceConfig::new(field(0), field(1), field(5).replace("{comma}", ","));
        config.min_zoom = parse_number(field(2), "minzoom")?;
        config.max_zoom = parse_number(field(3), "maxzoom")?;
        if !field(4).is_empty() {
            config.tile_size = parse_number(field(4), "tilesize")?;
        }
        if config.min_zoom > config.max_zoom {
            return Err(MapError::Config(format!(
                "minzoom {} exceeds maxzoom {}",
                config.min_zoom, config.max_zoom
            )));
        }

        config.servers = (6..10)
            .map(field)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        config.inverse_y = field(10) == "yinverse";
        config.ellipsoid = field(10) == "ellipsoid";
        if !field(11).is_empty() {
            config.secret = Some(field(11).to_string());
        }
        if !field(12).is_empty() {
            config.threads = parse_number::<usize>(field(12), "threads")?.max(1);
        }
        if !field(13).is_empty() {
            config.ttl = Some(Duration::from_secs(parse_number(field(13), "ttl_secs")?));
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| MapError::Config(format!("invalid {}: '{}'", what, value)))
}

fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Download settings shared by every remote source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound on workers per source, whatever the source asks for
    pub max_workers: usize,
    pub connect_timeout: Duration,
    /// Overall request timeout; `None` lets a download run indefinitely
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
    /// Tile arrival notifications buffered for the host
    pub event_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(30)),
            user_agent: format!("tilemap/{}", env!("CARGO_PKG_VERSION")),
            event_capacity: 1024,
        }
    }
}

/// Unified configuration presets for FetchConfig
impl FetchConfig {
    pub fn low_resource() -> Self {
        Self {
            max_workers: 2,
            request_timeout: Some(Duration::from_secs(60)),
            event_capacity: 256,
            ..Self::default()
        }
    }

    pub fn high_performance() -> Self {
        Self {
            max_workers: 16,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Some(Duration::from_secs(15)),
            event_capacity: 4096,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_workers: 4,
            connect_timeout: Duration::from_millis(500),
            request_timeout: Some(Duration::from_secs(2)),
            user_agent: "tilemap-test".to_string(),
            event_capacity: 64,
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Extra tiles kept per axis beyond the visible grid
    pub cache_margin: u32,
    /// Largest resampled tile, in pixels, before drawing reports out of memory
    pub max_scaled_pixels: u64,
    pub fetch: FetchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_margin: CACHE_MARGIN,
            max_scaled_pixels: 4096 * 4096,
            fetch: FetchConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn low_resource() -> Self {
        Self {
            cache_margin: 1,
            max_scaled_pixels: 1024 * 1024,
            fetch: FetchConfig::low_resource(),
        }
    }

    pub fn high_performance() -> Self {
        Self {
            cache_margin: 4,
            max_scaled_pixels: 8192 * 8192,
            fetch: FetchConfig::high_performance(),
        }
    }

    pub fn for_testing() -> Self {
        Self {
            fetch: FetchConfig::for_testing(),
            ..Self::default()
        }
    }
}
