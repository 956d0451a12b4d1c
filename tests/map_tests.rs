mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::Rgba;
use tempfile::TempDir;
use tilemap::prelude::*;
use tilemap::TileEvent;

use common::{png, tile_color, write_pyramid, MockHttpClient, SlowHttpClient};

/// End-to-end drawing through the map facade
#[cfg(test)]
mod map_tests {
    use super::*;

    fn local_map(root: &std::path::Path, min_zoom: u8, max_zoom: u8) -> TileMap {
        let pyramid = LocalPyramid::new("local", root, ".png", min_zoom, max_zoom);
        TileMap::new(Arc::new(pyramid), EngineConfig::for_testing())
    }

    #[test]
    fn test_local_pyramid_draws_four_tiles() {
        let temp = TempDir::new().unwrap();
        write_pyramid(temp.path(), 0..=2, 256);

        let mut map = local_map(temp.path(), 0, 2);
        map.activate(256, 256, 1.0).unwrap();
        assert!(map.events().is_none());

        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        assert!(map.draw(&mut viewport, &mut canvas).unwrap());

        let image = canvas.image();
        for (px, py, x, y) in [(10, 10, 1, 1), (200, 10, 2, 1), (10, 200, 1, 2), (200, 200, 2, 2)] {
            assert_eq!(*image.get_pixel(px, py), tile_color(TileCoord::new(x, y, 2)));
        }
    }

    #[test]
    fn test_missing_levels_are_synthesized() {
        let temp = TempDir::new().unwrap();
        write_pyramid(temp.path(), 0..=0, 256);

        let mut map = local_map(temp.path(), 0, 2);
        map.activate(256, 256, 1.0).unwrap();

        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        assert!(map.draw(&mut viewport, &mut canvas).unwrap());

        let root_color = tile_color(TileCoord::new(0, 0, 0));
        assert!(canvas.image().pixels().all(|p| *p == root_color));

        let tile = map.tile(1, 1).unwrap();
        assert!(tile.generated);
        assert_eq!(tile.width(), 256);
    }

    #[test]
    fn test_nothing_to_draw_reports_incomplete() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("z1")).unwrap();

        let mut map = local_map(temp.path(), 0, 2);
        map.activate(256, 256, 1.0).unwrap();

        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        assert!(!map.draw(&mut viewport, &mut canvas).unwrap());
        assert!(map.cache().is_empty());
    }

    #[test]
    fn test_look_ahead_shifts_the_view() {
        let temp = TempDir::new().unwrap();
        write_pyramid(temp.path(), 0..=2, 256);

        let mut map = local_map(temp.path(), 0, 2);
        map.activate(256, 256, 1.0).unwrap();

        // Focus moves 128 px left and up, onto the centre of tile (1, 1)
        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256).with_look_ahead(128, 128);
        let mut canvas = ImageCanvas::new(256, 256);
        map.draw(&mut viewport, &mut canvas).unwrap();

        let expected = tile_color(TileCoord::new(1, 1, 2));
        assert!(canvas.image().pixels().all(|p| *p == expected));
    }

    #[test]
    fn test_activation_failure_is_recorded() {
        let mut map = local_map(std::path::Path::new("/nonexistent/tilemap"), 0, 2);
        assert!(map.activate(256, 256, 1.0).is_err());
        assert!(!map.is_active());
        assert!(map.load_error().is_some());
    }

    #[test]
    fn test_remote_tiles_arrive_in_background() {
        println!("[TEST] remote provider through the fetch pipeline");
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient::serving(png(256, Rgba([9, 99, 199, 255]))));
        let config = TileSourceConfig::new("Mock", "mock", "http://tiles.test/{$z}/{$x}/{$y}.png")
            .with_zoom_range(0, 2);
        let provider = RemoteProvider::with_client(config, temp.path(), client.clone());

        let mut map = TileMap::new(Arc::new(provider), EngineConfig::for_testing());
        map.activate(256, 256, 1.0).unwrap();
        let events = map.events().unwrap();

        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        assert!(!map.draw(&mut viewport, &mut canvas).unwrap());

        let mut loaded = HashSet::default();
        while loaded.len() < 4 {
            match events.recv_timeout(Duration::from_secs(5)).unwrap() {
                TileEvent::Loaded(coord) => {
                    loaded.insert(coord);
                }
                TileEvent::Failed { coord, error } => panic!("{:?} failed: {}", coord, error),
            }
        }

        assert!(map.draw(&mut viewport, &mut canvas).unwrap());
        assert!(canvas.image().pixels().all(|p| *p == Rgba([9, 99, 199, 255])));
        assert_eq!(client.request_count(), 4);
        assert!(temp.path().join("tiles/mock/z2/0/x1/0/y1.png").exists());

        map.deactivate();
        assert!(map.events().is_none());
    }

    #[test]
    fn test_failed_downloads_stay_absent() {
        let temp = TempDir::new().unwrap();
        let config = TileSourceConfig::new("Down", "down", "http://tiles.test/{$z}/{$x}/{$y}.png")
            .with_zoom_range(0, 1);
        let provider = RemoteProvider::with_client(config, temp.path(), Arc::new(MockHttpClient::failing()));

        let mut map = TileMap::new(Arc::new(provider), EngineConfig::for_testing());
        map.activate(256, 256, 1.0).unwrap();
        let events = map.events().unwrap();

        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        assert!(!map.draw(&mut viewport, &mut canvas).unwrap());

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, TileEvent::Failed { .. }));
        assert!(map.tile(0, 0).is_none());
    }

    #[test]
    fn test_expired_copy_is_served_then_refreshed() {
        let temp = TempDir::new().unwrap();
        let stale = Rgba([50, 50, 50, 255]);
        let fresh = Rgba([0, 200, 0, 255]);
        let client = Arc::new(MockHttpClient::serving(png(256, fresh)));
        let config = TileSourceConfig::new("Aging", "aging", "http://tiles.test/{$z}/{$x}/{$y}.png")
            .with_zoom_range(0, 1)
            .with_ttl(Duration::from_millis(1));
        let provider = RemoteProvider::with_client(config, temp.path(), client.clone());

        let coord = TileCoord::new(0, 0, 1);
        provider.store(coord, &png(256, stale)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let mut map = TileMap::new(Arc::new(provider), EngineConfig::for_testing());
        map.activate(256, 256, 1.0).unwrap();
        let events = map.events().unwrap();

        let served = map.tile(0, 0).unwrap();
        assert!(served.expired);
        assert!(!served.generated);
        assert_eq!(*served.image.unwrap().get_pixel(0, 0), stale);

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, TileEvent::Loaded(coord));
        assert_eq!(map.pipeline().unwrap().dispatched_count(), 1);
        assert_eq!(client.request_count(), 1);

        let refreshed = map.cache().get(coord.key()).unwrap();
        assert!(!refreshed.expired);
        assert_eq!(*refreshed.image.unwrap().get_pixel(0, 0), fresh);
    }

    #[test]
    fn test_deactivate_does_not_wait_for_downloads() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(SlowHttpClient {
            delay: Duration::from_secs(3),
            body: png(256, Rgba([1, 1, 1, 255])),
        });
        let config = TileSourceConfig::new("Slow", "slow", "http://tiles.test/{$z}/{$x}/{$y}.png")
            .with_zoom_range(0, 1);
        let provider = RemoteProvider::with_client(config, temp.path(), client);

        let mut map = TileMap::new(Arc::new(provider), EngineConfig::for_testing());
        map.activate(256, 256, 1.0).unwrap();
        let mut viewport = Viewport::new(LatLng::new(0.0, 0.0), 256, 256);
        let mut canvas = ImageCanvas::new(256, 256);
        map.draw(&mut viewport, &mut canvas).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        map.deactivate();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!map.is_active());
        assert!(map.cache().is_destroyed());
    }
}
