//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use image::{ImageOutputFormat, Rgba, RgbaImage};
use tilemap::tiles::disk::shard_path;
use tilemap::{HttpClient, MapError, Result, TileCoord};

/// Solid PNG tile
pub fn png(size: u32, color: Rgba<u8>) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    RgbaImage::from_pixel(size, size, color)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Colour identifying a tile address in rendered output
pub fn tile_color(coord: TileCoord) -> Rgba<u8> {
    Rgba([
        (coord.x as u8).wrapping_mul(50).wrapping_add(20),
        (coord.y as u8).wrapping_mul(50).wrapping_add(20),
        coord.z.wrapping_mul(30).wrapping_add(5),
        255,
    ])
}

/// Writes every tile of zoom levels `levels` into a sharded tree
pub fn write_pyramid(root: &Path, levels: std::ops::RangeInclusive<u8>, size: u32) {
    for z in levels {
        let n = 1u32 << z;
        for x in 0..n {
            for y in 0..n {
                let path = shard_path(root, z, x, y, ".png");
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, png(size, tile_color(TileCoord::new(x, y, z)))).unwrap();
            }
        }
    }
}

/// HTTP client answering every request with the same body
pub struct MockHttpClient {
    pub body: Option<Vec<u8>>,
    pub requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.body
            .clone()
            .ok_or_else(|| MapError::Network(format!("HTTP 404 from {}", url)))
    }
}

/// HTTP client that takes `delay` to answer
pub struct SlowHttpClient {
    pub delay: Duration,
    pub body: Vec<u8>,
}

impl HttpClient for SlowHttpClient {
    fn get(&self, _url: &str) -> Result<Vec<u8>> {
        std::thread::sleep(self.delay);
        Ok(self.body.clone())
    }
}
