pub mod label;
pub mod report;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in YOLO convention: centre form, normalized 0..1 against
/// the source image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub class: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Expand back to pixel corners `[x1, y1, x2, y2]` for an image of the given size.
    pub fn to_pixel_corners(&self, img_w: u32, img_h: u32) -> [f32; 4] {
        let (w, h) = (img_w as f32, img_h as f32);
        let half_w = self.width * w / 2.0;
        let half_h = self.height * h / 2.0;
        let cx = self.x * w;
        let cy = self.y * h;
        [cx - half_w, cy - half_h, cx + half_w, cy + half_h]
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}
