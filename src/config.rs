use tiny_skia::Color;

use crate::viewport::Viewport;

#[derive(Debug, Clone)]
pub struct CanvasConfig {
    pub viewport: Viewport,
    /// Color written when `prepare`/`prepare_dirty` clears a non-opaque target.
    pub clear_color: Color,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(800, 600),
            clear_color: Color::TRANSPARENT,
        }
    }
}
