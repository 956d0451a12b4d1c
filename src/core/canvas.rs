use image::{imageops, Rgba, RgbaImage};

/// Drawing surface the map paints tiles onto
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Paints `tile` with its top-left corner at (`x`, `y`); may be partly
    /// or entirely off-canvas.
    fn draw_tile(&mut self, tile: &RgbaImage, x: i64, y: i64);

    /// Fills the whole surface, used to degrade after an out-of-memory draw
    fn clear(&mut self, color: Rgba<u8>);
}

/// Canvas backed by an in-memory RGBA image
#[derive(Debug, Clone)]
pub struct ImageCanvas {
    image: RgbaImage,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

impl Canvas for ImageCanvas {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn draw_tile(&mut self, tile: &RgbaImage, x: i64, y: i64) {
        imageops::replace(&mut self.image, tile, x, y);
    }

    fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_tile_clips_at_edges() {
        let mut canvas = ImageCanvas::new(4, 4);
        let tile = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]));

        canvas.draw_tile(&tile, -1, 2);
        assert_eq!(canvas.image().get_pixel(0, 2), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.image().get_pixel(1, 3), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.image().get_pixel(2, 2), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.image().get_pixel(0, 1), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_clear() {
        let mut canvas = ImageCanvas::new(2, 2);
        canvas.clear(Rgba([1, 2, 3, 255]));
        assert!(canvas.image().pixels().all(|p| *p == Rgba([1, 2, 3, 255])));
    }
}
