//! Null backend: full contract semantics, no pixels.
//!
//! Runs the shared state machine and the same trivial-rejection decisions
//! as the real backends but never touches a target. Useful for exercising
//! caller logic in tests and for headless setups, and the reference answer
//! for "which calls does the contract accept".

use anyhow::Result;
use tiny_skia::{BlendMode, Color, Path, Point, Rect, Transform};

use crate::canvas::state::{FrameStack, LayerSpec, Lifecycle};
use crate::canvas::{
    Bitmap, Canvas, DrawCallback, DrawOpMode, DrawResult, RegionOp, SaveFlags,
};
use crate::display_list::DisplayList;
use crate::errors::CanvasError;
use crate::geometry::{map_rect_aabb, Bounds, Region};
use crate::paint::Paint;
use crate::text::GlyphRun;
use crate::viewport::Viewport;

/// Canvas that accepts the full operation surface without rendering.
pub struct NullCanvas {
    stack: FrameStack,
    name: String,
}

impl NullCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            stack: FrameStack::new(Viewport::new(width, height)),
            name: String::new(),
        })
    }

    /// Shared gate for geometry draws: lifecycle check plus clip rejection.
    fn draw_geometry(&self, local_bounds: Option<Rect>, pad: f32) -> DrawResult {
        match self.stack.draw_check(local_bounds, pad) {
            Some(result) => result,
            None => DrawResult::Drawn,
        }
    }

    /// `NoOp` for degenerate input, unless the lifecycle already rules.
    fn noop_if_active(&self) -> DrawResult {
        match self.stack.draw_check(None, 0.0) {
            Some(result) => result,
            None => DrawResult::NoOp,
        }
    }

    fn points_bounds(points: &[Point]) -> Option<Rect> {
        let mut bounds = Bounds::EMPTY;
        for point in points {
            // A point has no area; give it one so the union is non-empty.
            bounds = bounds.union(&Bounds::from_ltrb(
                point.x - 0.5,
                point.y - 0.5,
                point.x + 0.5,
                point.y + 0.5,
            ));
        }
        bounds.to_rect()
    }
}

impl Canvas for NullCanvas {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.stack.set_viewport(width, height);
    }

    fn viewport(&self) -> Viewport {
        self.stack.viewport()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.stack.lifecycle()
    }

    fn prepare(&mut self, _opaque: bool) -> Result<(), CanvasError> {
        self.stack.begin_frame(None)
    }

    fn prepare_dirty(&mut self, dirty: Rect, _opaque: bool) -> Result<(), CanvasError> {
        self.stack.begin_frame(Some(dirty))
    }

    fn finish(&mut self) -> Result<(), CanvasError> {
        match self.stack.lifecycle() {
            Lifecycle::Active => {}
            Lifecycle::Interrupted { .. } => return Err(CanvasError::FinishWhileInterrupted),
            _ => return Err(CanvasError::NoFrameInProgress),
        }
        self.stack.restore_to_count(1);
        self.stack.end_frame()
    }

    fn interrupt(&mut self) -> Result<(), CanvasError> {
        self.stack.interrupt()
    }

    fn resume(&mut self) -> Result<(), CanvasError> {
        self.stack.resume()
    }

    fn save_count(&self) -> usize {
        self.stack.save_count()
    }

    fn save(&mut self, flags: SaveFlags) -> usize {
        self.stack.save(flags)
    }

    fn restore(&mut self) {
        let _ = self.stack.restore();
    }

    fn restore_to_count(&mut self, count: usize) {
        let _ = self.stack.restore_to_count(count);
    }

    fn save_layer(&mut self, bounds: Rect, alpha: u8, blend_mode: BlendMode, flags: SaveFlags) -> usize {
        self.stack.save_layer(LayerSpec { bounds, alpha, blend_mode, flags })
    }

    fn matrix(&self) -> Transform {
        self.stack.matrix()
    }

    fn set_matrix(&mut self, matrix: Transform) {
        self.stack.set_matrix(matrix);
    }

    fn concat_matrix(&mut self, matrix: Transform) {
        self.stack.concat_matrix(matrix);
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.stack.translate(dx, dy);
    }

    fn rotate(&mut self, degrees: f32) {
        self.stack.rotate(degrees);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.stack.scale(sx, sy);
    }

    fn skew(&mut self, sx: f32, sy: f32) {
        self.stack.skew(sx, sy);
    }

    fn clip_bounds(&self) -> Option<Rect> {
        self.stack.clip_bounds()
    }

    fn quick_reject(&self, rect: Rect) -> bool {
        self.stack.quick_reject(rect)
    }

    fn clip_rect(&mut self, rect: Rect, op: RegionOp) -> bool {
        self.stack.clip_rect(rect, op)
    }

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        self.stack.clip_path(path, op)
    }

    fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool {
        self.stack.clip_region(region, op)
    }

    fn draw_color(&mut self, _color: Color, _mode: BlendMode) -> DrawResult {
        self.draw_geometry(None, 0.0)
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) -> DrawResult {
        self.draw_geometry(Some(rect), paint.coverage_pad())
    }

    fn draw_rects(&mut self, rects: &[Rect], paint: &Paint) -> DrawResult {
        let mut bounds = Bounds::EMPTY;
        for rect in rects {
            bounds = bounds.union(&Bounds::from_rect(*rect));
        }
        match bounds.to_rect() {
            Some(rect) => self.draw_geometry(Some(rect), paint.coverage_pad()),
            None => self.noop_if_active(),
        }
    }

    fn draw_round_rect(&mut self, rect: Rect, _rx: f32, _ry: f32, paint: &Paint) -> DrawResult {
        self.draw_geometry(Some(rect), paint.coverage_pad())
    }

    fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) -> DrawResult {
        if radius <= 0.0 {
            return self.noop_if_active();
        }
        match Rect::from_xywh(cx - radius, cy - radius, radius * 2.0, radius * 2.0) {
            Some(rect) => self.draw_geometry(Some(rect), paint.coverage_pad()),
            None => self.noop_if_active(),
        }
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) -> DrawResult {
        self.draw_geometry(Some(oval), paint.coverage_pad())
    }

    fn draw_arc(
        &mut self,
        oval: Rect,
        _start_angle: f32,
        sweep_angle: f32,
        _use_center: bool,
        paint: &Paint,
    ) -> DrawResult {
        if sweep_angle == 0.0 {
            return self.noop_if_active();
        }
        self.draw_geometry(Some(oval), paint.coverage_pad())
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawResult {
        self.draw_geometry(Some(path.bounds()), paint.coverage_pad())
    }

    fn draw_lines(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.len() < 2 {
            return self.noop_if_active();
        }
        match Self::points_bounds(points) {
            Some(rect) => self.draw_geometry(Some(rect), paint.coverage_pad().max(0.5)),
            None => self.noop_if_active(),
        }
    }

    fn draw_points(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.is_empty() {
            return self.noop_if_active();
        }
        match Self::points_bounds(points) {
            Some(rect) => self.draw_geometry(Some(rect), paint.stroke_width().max(1.0)),
            None => self.noop_if_active(),
        }
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, _paint: Option<&Paint>) -> DrawResult {
        let bounds = Rect::from_xywh(left, top, bitmap.width() as f32, bitmap.height() as f32);
        match bounds {
            Some(rect) => self.draw_geometry(Some(rect), 0.0),
            None => DrawResult::NoOp,
        }
    }

    fn draw_bitmap_matrix(&mut self, bitmap: &Bitmap, matrix: Transform, _paint: Option<&Paint>) -> DrawResult {
        let local = Rect::from_xywh(0.0, 0.0, bitmap.width() as f32, bitmap.height() as f32);
        let mapped = local.map(|rect| map_rect_aabb(rect, matrix)).and_then(|b| b.to_rect());
        match mapped {
            Some(rect) => self.draw_geometry(Some(rect), 0.0),
            None => DrawResult::NoOp,
        }
    }

    fn draw_bitmap_rect(&mut self, _bitmap: &Bitmap, src: Rect, dst: Rect, _paint: Option<&Paint>) -> DrawResult {
        if src.width() <= 0.0 || src.height() <= 0.0 {
            return self.noop_if_active();
        }
        self.draw_geometry(Some(dst), 0.0)
    }

    fn draw_glyphs(&mut self, run: &GlyphRun, paint: &Paint, _mode: DrawOpMode) -> DrawResult {
        // No deferral machinery here; Defer and Flush behave as Immediate.
        if run.is_empty() {
            return self.noop_if_active();
        }
        self.draw_geometry(Some(run.bounds), paint.coverage_pad())
    }

    fn draw_display_list(&mut self, list: &DisplayList) -> DrawResult {
        list.replay(self)
    }

    fn call_draw_callback(&mut self, callback: &mut dyn DrawCallback) -> DrawResult {
        if self.stack.lifecycle() != Lifecycle::Active {
            return DrawResult::InvalidState;
        }
        if self.stack.interrupt().is_err() {
            return DrawResult::InvalidState;
        }
        callback.draw(self.stack.viewport());
        if self.stack.resume().is_err() {
            return DrawResult::InvalidState;
        }
        DrawResult::Drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_xywh(x, y, w, h).unwrap()
    }

    fn active_canvas() -> NullCanvas {
        let mut canvas = NullCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        canvas
    }

    #[test]
    fn name_defaults_to_empty_and_round_trips() {
        let mut canvas = NullCanvas::new(10, 10).unwrap();
        assert_eq!(canvas.name(), "");
        canvas.set_name("software");
        assert_eq!(canvas.name(), "software");
        canvas.set_name("");
        assert_eq!(canvas.name(), "");
    }

    #[test]
    fn draw_while_idle_is_invalid_state() {
        let mut canvas = NullCanvas::new(100, 100).unwrap();
        let paint = Paint::default();
        assert_eq!(canvas.draw_rect(rect(0.0, 0.0, 10.0, 10.0), &paint), DrawResult::InvalidState);
        assert_eq!(canvas.draw_color(Color::BLACK, BlendMode::SourceOver), DrawResult::InvalidState);
    }

    #[test]
    fn clipped_out_draw_is_noop() {
        let mut canvas = active_canvas();
        assert!(canvas.clip_rect(rect(0.0, 0.0, 20.0, 20.0), RegionOp::Intersect));
        let paint = Paint::default();
        assert_eq!(canvas.draw_rect(rect(50.0, 50.0, 10.0, 10.0), &paint), DrawResult::NoOp);
        assert_eq!(canvas.draw_rect(rect(5.0, 5.0, 10.0, 10.0), &paint), DrawResult::Drawn);
        canvas.finish().unwrap();
    }

    #[test]
    fn degenerate_geometry_is_noop() {
        let mut canvas = active_canvas();
        let paint = Paint::default();
        assert_eq!(canvas.draw_circle(10.0, 10.0, 0.0, &paint), DrawResult::NoOp);
        assert_eq!(canvas.draw_lines(&[Point::from_xy(1.0, 1.0)], &paint), DrawResult::NoOp);
        assert_eq!(canvas.draw_points(&[], &paint), DrawResult::NoOp);
        assert_eq!(canvas.draw_arc(rect(0.0, 0.0, 10.0, 10.0), 0.0, 0.0, false, &paint), DrawResult::NoOp);
        canvas.finish().unwrap();
    }

    #[test]
    fn callback_brackets_interrupt_resume() {
        struct Probe {
            seen: Option<Viewport>,
        }
        impl DrawCallback for Probe {
            fn draw(&mut self, viewport: Viewport) {
                self.seen = Some(viewport);
            }
        }

        let mut canvas = active_canvas();
        let mut probe = Probe { seen: None };
        assert_eq!(canvas.call_draw_callback(&mut probe), DrawResult::Drawn);
        assert_eq!(probe.seen, Some(Viewport::new(100, 100)));
        assert_eq!(canvas.lifecycle(), Lifecycle::Active);
        canvas.finish().unwrap();
    }

    #[test]
    fn callback_refused_outside_active() {
        struct Nop;
        impl DrawCallback for Nop {
            fn draw(&mut self, _viewport: Viewport) {}
        }

        let mut canvas = NullCanvas::new(10, 10).unwrap();
        assert_eq!(canvas.call_draw_callback(&mut Nop), DrawResult::InvalidState);

        canvas.prepare(false).unwrap();
        canvas.interrupt().unwrap();
        // Nesting through the helper is refused; brackets are explicit.
        assert_eq!(canvas.call_draw_callback(&mut Nop), DrawResult::InvalidState);
        canvas.resume().unwrap();
        canvas.finish().unwrap();
    }

    #[test]
    fn save_layer_with_clip_flag_narrows_clip() {
        let mut canvas = active_canvas();
        let depth = canvas.save_layer(rect(10.0, 10.0, 30.0, 30.0), 128, BlendMode::SourceOver, SaveFlags::CLIP_TO_LAYER);
        assert_eq!(depth, 2);
        assert_eq!(canvas.clip_bounds(), Some(rect(10.0, 10.0, 30.0, 30.0)));
        canvas.restore();
        assert_eq!(canvas.clip_bounds(), Some(rect(0.0, 0.0, 100.0, 100.0)));
        canvas.finish().unwrap();
    }
}
