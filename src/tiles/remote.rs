//! Remote XYZ/WMTS tile servers with an on-disk cache.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;

use crate::core::config::{FetchConfig, TileSourceConfig};
use crate::core::geo::TileCoord;
use crate::tiles::disk::DiskCache;
use crate::tiles::source::{TileBytes, TileSource};
use crate::{MapError, Result};

/// Process locale in `ll_CC` form, from the usual environment variables
static SYSTEM_LOCALE: Lazy<String> = Lazy::new(|| {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| value.split(['.', '@']).next().unwrap_or("").to_string())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
        .unwrap_or_else(|| "en_US".to_string())
});

/// Trait for HTTP client operations.
///
/// This abstraction allows mock clients to stand in for the network in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking reqwest client
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(MapError::Network(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(response.bytes()?.to_vec())
    }
}

/// Tile server described by a [`TileSourceConfig`]
pub struct RemoteProvider {
    config: TileSourceConfig,
    disk: DiskCache,
    client: Arc<dyn HttpClient>,
    next_server: AtomicUsize,
    threads: usize,
}

impl RemoteProvider {
    /// Provider downloading through reqwest and caching under `cache_root`
    pub fn new(config: TileSourceConfig, cache_root: &Path, fetch: &FetchConfig) -> Result<Self> {
        let client = Arc::new(ReqwestClient::new(fetch)?);
        let mut provider = Self::with_client(config, cache_root, client);
        provider.threads = provider.threads.min(fetch.max_workers.max(1));
        Ok(provider)
    }

    pub fn with_client(
        config: TileSourceConfig,
        cache_root: &Path,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        let disk = DiskCache::new(cache_root, &config.code, config.ttl());
        let threads = config.threads.max(1);
        Self {
            config,
            disk,
            client,
            next_server: AtomicUsize::new(0),
            threads,
        }
    }

    pub fn config(&self) -> &TileSourceConfig {
        &self.config
    }

    pub fn disk_cache(&self) -> &DiskCache {
        &self.disk
    }

    /// Expands the URL template for `coord`.
    ///
    /// Mirrors rotate round-robin on every call. With inverse Y every
    /// row-based token, including the quadkey, uses the flipped row.
    pub fn tile_url(&self, coord: TileCoord) -> String {
        let mut url = self.config.uri.clone();

        if !self.config.servers.is_empty() {
            let index = self.next_server.fetch_add(1, Ordering::Relaxed) % self.config.servers.len();
            url = url.replace("{$s}", &self.config.servers[index]);
        }

        let y = if self.config.inverse_y {
            coord.tms_y()
        } else {
            coord.y
        };
        let locale = self.config.locale.as_deref().unwrap_or(SYSTEM_LOCALE.as_str());

        url = url
            .replace("{$l}", locale)
            .replace("{$z}", &coord.z.to_string())
            .replace("{$x}", &coord.x.to_string())
            .replace("{$y}", &y.to_string());

        if url.contains("{$q}") {
            url = url.replace("{$q}", &TileCoord::new(coord.x, y, coord.z).quadkey());
        }
        if let Some(secret) = self.config.secret.as_deref() {
            if url.contains("{$g}") {
                let len = ((3 * coord.x as u64 + y as u64) & 7) as usize;
                let prefix: String = secret.chars().take(len).collect();
                url = url.replace("{$g}", &prefix);
            }
        }
        url
    }
}

impl TileSource for RemoteProvider {
    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn min_zoom(&self) -> u8 {
        self.config.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.config.max_zoom
    }

    fn tile_size(&self) -> u32 {
        self.config.tile_size
    }

    fn ellipsoid(&self) -> bool {
        self.config.ellipsoid
    }

    fn activate(&self) -> Result<()> {
        fs::create_dir_all(self.disk.root())?;
        info!(
            "Activated provider {} ({} workers, cache {})",
            self.config.name,
            self.threads,
            self.disk.root().display()
        );
        Ok(())
    }

    fn load(&self, coord: TileCoord) -> Result<Option<TileBytes>> {
        self.disk.load(coord)
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn download(&self, coord: TileCoord) -> Result<Vec<u8>> {
        let url = self.tile_url(coord);
        debug!("Fetching tile {:?} from {}", coord, url);
        self.client.get(&url)
    }

    fn store(&self, coord: TileCoord, data: &[u8]) -> Result<()> {
        self.disk.store(coord, data)
    }

    fn worker_count(&self) -> usize {
        self.threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Mock HTTP client recording requested URLs
    pub struct MockHttpClient {
        pub response: std::result::Result<Vec<u8>, String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn ok(body: Vec<u8>) -> Self {
            Self {
                response: Ok(body),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            self.response.clone().map_err(MapError::Network)
        }
    }

    fn provider(config: TileSourceConfig) -> (RemoteProvider, TempDir) {
        let temp = TempDir::new().unwrap();
        let provider =
            RemoteProvider::with_client(config, temp.path(), Arc::new(MockHttpClient::ok(vec![])));
        (provider, temp)
    }

    #[test]
    fn test_basic_tokens() {
        let mut config = TileSourceConfig::new("t", "t", "http://h/{$l}/{$z}/{$x}/{$y}.png");
        config.locale = Some("ru_RU".to_string());
        let (provider, _temp) = provider(config);
        assert_eq!(provider.tile_url(TileCoord::new(3, 5, 4)), "http://h/ru_RU/4/3/5.png");
    }

    #[test]
    fn test_server_rotation() {
        let config = TileSourceConfig::new("t", "t", "http://{$s}.h/{$z}").with_servers(["a", "b", "c"]);
        let (provider, _temp) = provider(config);
        let hosts: Vec<String> = (0..4)
            .map(|_| provider.tile_url(TileCoord::new(0, 0, 1)))
            .collect();
        assert_eq!(hosts, vec!["http://a.h/1", "http://b.h/1", "http://c.h/1", "http://a.h/1"]);
    }

    #[test]
    fn test_inverse_y_and_quadkey() {
        let mut config = TileSourceConfig::new("t", "t", "http://h/{$y}/{$q}");
        config.inverse_y = true;
        let (provider, _temp) = provider(config);
        // Row 2 at zoom 3 flips to 5
        assert_eq!(provider.tile_url(TileCoord::new(3, 2, 3)), "http://h/5/213");
    }

    #[test]
    fn test_secret_prefix() {
        let mut config = TileSourceConfig::new("t", "t", "http://h/{$x}?s={$g}");
        config.secret = Some("Galileo".to_string());
        let (provider, _temp) = provider(config);
        // (3*1 + 2) & 7 = 5
        assert_eq!(provider.tile_url(TileCoord::new(1, 2, 4)), "http://h/1?s=Galil");
        // (3*2 + 2) & 7 = 0
        assert_eq!(provider.tile_url(TileCoord::new(2, 2, 4)), "http://h/2?s=");
    }

    #[test]
    fn test_secret_token_kept_without_secret() {
        let (provider, _temp) = provider(TileSourceConfig::new("t", "t", "http://h/{$g}"));
        assert_eq!(provider.tile_url(TileCoord::new(1, 1, 1)), "http://h/{$g}");
    }

    #[test]
    fn test_download_and_store_round_through_disk() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient::ok(vec![7, 7]));
        let provider = RemoteProvider::with_client(
            TileSourceConfig::new("t", "osm", "http://h/{$z}/{$x}/{$y}"),
            temp.path(),
            client.clone(),
        );
        provider.activate().unwrap();

        let coord = TileCoord::new(1, 0, 1);
        assert_eq!(provider.load(coord).unwrap(), None);
        let data = provider.download(coord).unwrap();
        provider.store(coord, &data).unwrap();

        assert_eq!(provider.load(coord).unwrap(), Some(TileBytes::new(vec![7, 7])));
        assert_eq!(*client.requests.lock().unwrap(), vec!["http://h/1/1/0".to_string()]);
        assert!(temp.path().join("tiles/osm/z1/0/x1/0/y0.png").exists());
    }

    #[test]
    fn test_failed_download_is_network_error() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient {
            response: Err("HTTP 404".to_string()),
            requests: Mutex::new(Vec::new()),
        });
        let provider = RemoteProvider::with_client(
            TileSourceConfig::new("t", "t", "http://h/"),
            temp.path(),
            client,
        );
        assert!(matches!(provider.download(TileCoord::new(0, 0, 0)), Err(MapError::Network(_))));
    }
}
