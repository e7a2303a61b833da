//! Display list: the recorded-command buffer.
//!
//! This module defines [`DisplayList`], the flat, ordered sequence of
//! [`DisplayCommand`]s produced by the recording backend and replayed onto
//! any other canvas through `draw_display_list`. The buffer is opaque to
//! the caller: commands pass through unmodified and are only interpreted at
//! replay time, by the replaying backend's own semantics.
//!
//! # Example
//!
//! ```rust
//! use render_canvas::canvas::backends::null::NullCanvas;
//! use render_canvas::canvas::Canvas;
//! use render_canvas::display_list::{DisplayCommand, DisplayList};
//! use render_canvas::paint::Paint;
//! use tiny_skia::{Color, Rect};
//!
//! let mut list = DisplayList::new();
//! list.push(DisplayCommand::DrawRect {
//!     rect: Rect::from_xywh(10.0, 10.0, 50.0, 50.0).unwrap(),
//!     paint: Paint::fill(Color::BLACK),
//! });
//!
//! let mut canvas = NullCanvas::new(100, 100).unwrap();
//! canvas.prepare(false).unwrap();
//! let result = canvas.draw_display_list(&list);
//! assert!(result.is_drawn());
//! canvas.finish().unwrap();
//! ```

use std::sync::Arc;

use tiny_skia::{BlendMode, Color, Path, Point, Rect, Transform};

use crate::canvas::{Bitmap, Canvas, DrawOpMode, DrawResult, RegionOp, SaveFlags};
use crate::geometry::Region;
use crate::paint::Paint;
use crate::text::GlyphRun;

/// One recorded canvas operation.
///
/// State commands mirror the save/clip/transform surface; draw commands
/// carry their style by value so later paint mutation cannot reach into a
/// recorded frame.
#[derive(Clone, Debug)]
pub enum DisplayCommand {
    Save { flags: SaveFlags },
    Restore,
    /// Depth relative to the recording base frame (depth 1).
    RestoreToCount { count: usize },
    SaveLayer { bounds: Rect, alpha: u8, blend_mode: BlendMode, flags: SaveFlags },

    SetMatrix { matrix: Transform },
    ConcatMatrix { matrix: Transform },
    Translate { dx: f32, dy: f32 },
    Rotate { degrees: f32 },
    Scale { sx: f32, sy: f32 },
    Skew { sx: f32, sy: f32 },

    ClipRect { rect: Rect, op: RegionOp },
    ClipPath { path: Path, op: RegionOp },
    ClipRegion { region: Region, op: RegionOp },

    DrawColor { color: Color, mode: BlendMode },
    DrawRect { rect: Rect, paint: Paint },
    DrawRects { rects: Vec<Rect>, paint: Paint },
    DrawRoundRect { rect: Rect, rx: f32, ry: f32, paint: Paint },
    DrawCircle { cx: f32, cy: f32, radius: f32, paint: Paint },
    DrawOval { oval: Rect, paint: Paint },
    DrawArc { oval: Rect, start_angle: f32, sweep_angle: f32, use_center: bool, paint: Paint },
    DrawPath { path: Path, paint: Paint },
    DrawLines { points: Vec<Point>, paint: Paint },
    DrawPoints { points: Vec<Point>, paint: Paint },

    DrawBitmap { bitmap: Bitmap, left: f32, top: f32, paint: Option<Paint> },
    DrawBitmapMatrix { bitmap: Bitmap, matrix: Transform, paint: Option<Paint> },
    DrawBitmapRect { bitmap: Bitmap, src: Rect, dst: Rect, paint: Option<Paint> },

    DrawGlyphs { run: GlyphRun, paint: Paint, mode: DrawOpMode },

    /// Nested pass-through of another recorded buffer.
    DrawDisplayList { list: Arc<DisplayList> },
}

/// An ordered sequence of recorded canvas commands.
#[derive(Clone, Debug, Default)]
pub struct DisplayList {
    commands: Vec<DisplayCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: DisplayCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DisplayCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Replays every command onto `canvas` in recorded order.
    ///
    /// The replay is bracketed: the caller's save depth is captured first
    /// and restored afterwards, so an unbalanced list cannot pop the
    /// caller's frames. Returns `Drawn` when any replayed draw took effect,
    /// `NoOp` for a list whose draws were all rejected or absent.
    pub fn replay(&self, canvas: &mut dyn Canvas) -> DrawResult {
        use crate::canvas::state::Lifecycle;
        if !matches!(canvas.lifecycle(), Lifecycle::Active | Lifecycle::Interrupted { .. }) {
            return DrawResult::InvalidState;
        }

        let base = canvas.save_count();
        let mut drawn = false;
        for command in &self.commands {
            let result = match command {
                DisplayCommand::Save { flags } => {
                    canvas.save(*flags);
                    None
                }
                DisplayCommand::Restore => {
                    // Never escape the replay bracket.
                    if canvas.save_count() > base {
                        canvas.restore();
                    }
                    None
                }
                DisplayCommand::RestoreToCount { count } => {
                    canvas.restore_to_count(base + (*count).max(1) - 1);
                    None
                }
                DisplayCommand::SaveLayer { bounds, alpha, blend_mode, flags } => {
                    canvas.save_layer(*bounds, *alpha, *blend_mode, *flags);
                    None
                }
                DisplayCommand::SetMatrix { matrix } => {
                    canvas.set_matrix(*matrix);
                    None
                }
                DisplayCommand::ConcatMatrix { matrix } => {
                    canvas.concat_matrix(*matrix);
                    None
                }
                DisplayCommand::Translate { dx, dy } => {
                    canvas.translate(*dx, *dy);
                    None
                }
                DisplayCommand::Rotate { degrees } => {
                    canvas.rotate(*degrees);
                    None
                }
                DisplayCommand::Scale { sx, sy } => {
                    canvas.scale(*sx, *sy);
                    None
                }
                DisplayCommand::Skew { sx, sy } => {
                    canvas.skew(*sx, *sy);
                    None
                }
                DisplayCommand::ClipRect { rect, op } => {
                    canvas.clip_rect(*rect, *op);
                    None
                }
                DisplayCommand::ClipPath { path, op } => {
                    canvas.clip_path(path, *op);
                    None
                }
                DisplayCommand::ClipRegion { region, op } => {
                    canvas.clip_region(region, *op);
                    None
                }
                DisplayCommand::DrawColor { color, mode } => Some(canvas.draw_color(*color, *mode)),
                DisplayCommand::DrawRect { rect, paint } => Some(canvas.draw_rect(*rect, paint)),
                DisplayCommand::DrawRects { rects, paint } => Some(canvas.draw_rects(rects, paint)),
                DisplayCommand::DrawRoundRect { rect, rx, ry, paint } => {
                    Some(canvas.draw_round_rect(*rect, *rx, *ry, paint))
                }
                DisplayCommand::DrawCircle { cx, cy, radius, paint } => {
                    Some(canvas.draw_circle(*cx, *cy, *radius, paint))
                }
                DisplayCommand::DrawOval { oval, paint } => Some(canvas.draw_oval(*oval, paint)),
                DisplayCommand::DrawArc { oval, start_angle, sweep_angle, use_center, paint } => {
                    Some(canvas.draw_arc(*oval, *start_angle, *sweep_angle, *use_center, paint))
                }
                DisplayCommand::DrawPath { path, paint } => Some(canvas.draw_path(path, paint)),
                DisplayCommand::DrawLines { points, paint } => Some(canvas.draw_lines(points, paint)),
                DisplayCommand::DrawPoints { points, paint } => Some(canvas.draw_points(points, paint)),
                DisplayCommand::DrawBitmap { bitmap, left, top, paint } => {
                    Some(canvas.draw_bitmap(bitmap, *left, *top, paint.as_ref()))
                }
                DisplayCommand::DrawBitmapMatrix { bitmap, matrix, paint } => {
                    Some(canvas.draw_bitmap_matrix(bitmap, *matrix, paint.as_ref()))
                }
                DisplayCommand::DrawBitmapRect { bitmap, src, dst, paint } => {
                    Some(canvas.draw_bitmap_rect(bitmap, *src, *dst, paint.as_ref()))
                }
                DisplayCommand::DrawGlyphs { run, paint, mode } => {
                    Some(canvas.draw_glyphs(run, paint, *mode))
                }
                DisplayCommand::DrawDisplayList { list } => Some(list.replay(canvas)),
            };
            if let Some(DrawResult::Drawn) = result {
                drawn = true;
            }
        }
        canvas.restore_to_count(base);

        if drawn {
            DrawResult::Drawn
        } else {
            DrawResult::NoOp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_collects_commands_in_order() {
        let mut list = DisplayList::new();
        assert!(list.is_empty());
        list.push(DisplayCommand::Save { flags: SaveFlags::empty() });
        list.push(DisplayCommand::Restore);
        assert_eq!(list.len(), 2);
        assert!(matches!(list.commands()[0], DisplayCommand::Save { .. }));
        assert!(matches!(list.commands()[1], DisplayCommand::Restore));
    }
}
