use std::fmt::Debug;

use tiny_skia::Rect;

// Simple width/height surface extent. Sizes render targets and the base frame clip.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Viewport {{ width: {}, height: {} }}", self.width, self.height)
    }
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Device bounds of the surface. `None` for a zero-sized viewport.
    pub fn bounds(&self) -> Option<Rect> {
        Rect::from_xywh(0.0, 0.0, self.width as f32, self.height as f32)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800, 600)
    }
}
