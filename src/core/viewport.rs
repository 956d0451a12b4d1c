use crate::core::geo::{LatLng, PixelPoint};
use serde::{Deserialize, Serialize};

/// Describes what the caller wants painted on a single draw call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// Projection of `center` in map pixels, filled in by the map
    pub center_xy: PixelPoint,
    /// Pixel bias toward the direction of travel
    pub look_ahead: (i32, i32),
    /// The size of the canvas in pixels
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Heading in degrees, informational for the host
    pub heading: f32,
}

impl Viewport {
    pub fn new(center: LatLng, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            center,
            center_xy: PixelPoint::default(),
            look_ahead: (0, 0),
            canvas_width,
            canvas_height,
            heading: 0.0,
        }
    }

    pub fn with_look_ahead(mut self, dx: i32, dy: i32) -> Self {
        self.look_ahead = (dx, dy);
        self
    }

    /// Map pixel drawn at the middle of the canvas
    pub fn focus(&self) -> PixelPoint {
        self.center_xy
            .offset(-(self.look_ahead.0 as i64), -(self.look_ahead.1 as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_applies_look_ahead() {
        let mut viewport = Viewport::new(LatLng::new(10.0, 20.0), 300, 200).with_look_ahead(15, -5);
        viewport.center_xy = PixelPoint::new(1000, 2000);
        assert_eq!(viewport.focus(), PixelPoint::new(985, 2005));
    }
}
