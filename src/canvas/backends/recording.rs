//! Recording backend: validates and records instead of rasterizing.
//!
//! Runs the same shared state machine as the immediate backends, so clip
//! tracking, trivial rejection and lifecycle enforcement behave
//! identically, but accepted operations are appended to a [`DisplayList`]
//! for later playback instead of touching pixels. Replaying the list onto
//! an immediate canvas with the same viewport reproduces the drawing.
//!
//! Draw-op modes are recorded verbatim: deferral is a property of the
//! replaying backend, not of the recording.

use std::sync::Arc;

use anyhow::Result;
use tiny_skia::{BlendMode, Color, Path, Point, Rect, Transform};

use crate::canvas::state::{FrameStack, LayerSpec, Lifecycle};
use crate::canvas::{
    Bitmap, Canvas, DrawCallback, DrawOpMode, DrawResult, RegionOp, SaveFlags,
};
use crate::display_list::{DisplayCommand, DisplayList};
use crate::errors::CanvasError;
use crate::geometry::{map_rect_aabb, Bounds, Region};
use crate::paint::Paint;
use crate::text::GlyphRun;
use crate::viewport::Viewport;

/// Canvas that records accepted operations into a display list.
pub struct RecordingCanvas {
    stack: FrameStack,
    name: String,
    list: DisplayList,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            stack: FrameStack::new(Viewport::new(width, height)),
            name: String::new(),
            list: DisplayList::new(),
        })
    }

    /// Takes the recorded commands, leaving the recorder empty. Usually
    /// called after `finish`.
    pub fn take_display_list(&mut self) -> DisplayList {
        std::mem::take(&mut self.list)
    }

    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    fn noop_if_active(&self) -> DrawResult {
        match self.stack.draw_check(None, 0.0) {
            Some(result) => result,
            None => DrawResult::NoOp,
        }
    }

    /// Gate shared by all draw records: reject exactly like an immediate
    /// backend would, then record.
    fn record_draw(&mut self, local_bounds: Option<Rect>, pad: f32, command: DisplayCommand) -> DrawResult {
        if let Some(result) = self.stack.draw_check(local_bounds, pad) {
            return result;
        }
        self.list.push(command);
        DrawResult::Drawn
    }

    fn points_bounds(points: &[Point]) -> Option<Rect> {
        let mut bounds = Bounds::EMPTY;
        for point in points {
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

impl Canvas for RecordingCanvas {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_recording(&self) -> bool {
        true
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
        self.stack.begin_frame(None)?;
        self.list = DisplayList::new();
        Ok(())
    }

    fn prepare_dirty(&mut self, dirty: Rect, _opaque: bool) -> Result<(), CanvasError> {
        self.stack.begin_frame(Some(dirty))?;
        self.list = DisplayList::new();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CanvasError> {
        match self.stack.lifecycle() {
            Lifecycle::Active => {}
            Lifecycle::Interrupted { .. } => return Err(CanvasError::FinishWhileInterrupted),
            _ => return Err(CanvasError::NoFrameInProgress),
        }
        self.restore_to_count(1);
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
        let before = self.stack.save_count();
        let depth = self.stack.save(flags);
        if depth > before {
            self.list.push(DisplayCommand::Save { flags });
        }
        depth
    }

    fn restore(&mut self) {
        if self.stack.restore().is_some() {
            self.list.push(DisplayCommand::Restore);
        }
    }

    fn restore_to_count(&mut self, count: usize) {
        let popped = self.stack.restore_to_count(count);
        if !popped.is_empty() {
            self.list.push(DisplayCommand::RestoreToCount { count: self.stack.save_count() });
        }
    }

    fn save_layer(&mut self, bounds: Rect, alpha: u8, blend_mode: BlendMode, flags: SaveFlags) -> usize {
        let before = self.stack.save_count();
        let depth = self.stack.save_layer(LayerSpec { bounds, alpha, blend_mode, flags });
        if depth > before {
            self.list.push(DisplayCommand::SaveLayer { bounds, alpha, blend_mode, flags });
        }
        depth
    }

    fn matrix(&self) -> Transform {
        self.stack.matrix()
    }

    fn set_matrix(&mut self, matrix: Transform) {
        if self.stack.in_frame() {
            self.stack.set_matrix(matrix);
            self.list.push(DisplayCommand::SetMatrix { matrix });
        }
    }

    fn concat_matrix(&mut self, matrix: Transform) {
        if self.stack.in_frame() {
            self.stack.concat_matrix(matrix);
            self.list.push(DisplayCommand::ConcatMatrix { matrix });
        }
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        if self.stack.in_frame() {
            self.stack.translate(dx, dy);
            self.list.push(DisplayCommand::Translate { dx, dy });
        }
    }

    fn rotate(&mut self, degrees: f32) {
        if self.stack.in_frame() {
            self.stack.rotate(degrees);
            self.list.push(DisplayCommand::Rotate { degrees });
        }
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        if self.stack.in_frame() {
            self.stack.scale(sx, sy);
            self.list.push(DisplayCommand::Scale { sx, sy });
        }
    }

    fn skew(&mut self, sx: f32, sy: f32) {
        if self.stack.in_frame() {
            self.stack.skew(sx, sy);
            self.list.push(DisplayCommand::Skew { sx, sy });
        }
    }

    fn clip_bounds(&self) -> Option<Rect> {
        self.stack.clip_bounds()
    }

    fn quick_reject(&self, rect: Rect) -> bool {
        self.stack.quick_reject(rect)
    }

    fn clip_rect(&mut self, rect: Rect, op: RegionOp) -> bool {
        if !self.stack.in_frame() {
            return self.stack.clip_rect(rect, op);
        }
        let non_empty = self.stack.clip_rect(rect, op);
        self.list.push(DisplayCommand::ClipRect { rect, op });
        non_empty
    }

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        if !self.stack.in_frame() {
            return self.stack.clip_path(path, op);
        }
        let non_empty = self.stack.clip_path(path, op);
        self.list.push(DisplayCommand::ClipPath { path: path.clone(), op });
        non_empty
    }

    fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool {
        if !self.stack.in_frame() {
            return self.stack.clip_region(region, op);
        }
        let non_empty = self.stack.clip_region(region, op);
        self.list.push(DisplayCommand::ClipRegion { region: region.clone(), op });
        non_empty
    }

    fn draw_color(&mut self, color: Color, mode: BlendMode) -> DrawResult {
        self.record_draw(None, 0.0, DisplayCommand::DrawColor { color, mode })
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) -> DrawResult {
        self.record_draw(
            Some(rect),
            paint.coverage_pad(),
            DisplayCommand::DrawRect { rect, paint: paint.clone() },
        )
    }

    fn draw_rects(&mut self, rects: &[Rect], paint: &Paint) -> DrawResult {
        let mut bounds = Bounds::EMPTY;
        for rect in rects {
            bounds = bounds.union(&Bounds::from_rect(*rect));
        }
        let Some(aabb) = bounds.to_rect() else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(aabb),
            paint.coverage_pad(),
            DisplayCommand::DrawRects { rects: rects.to_vec(), paint: paint.clone() },
        )
    }

    fn draw_round_rect(&mut self, rect: Rect, rx: f32, ry: f32, paint: &Paint) -> DrawResult {
        self.record_draw(
            Some(rect),
            paint.coverage_pad(),
            DisplayCommand::DrawRoundRect { rect, rx, ry, paint: paint.clone() },
        )
    }

    fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) -> DrawResult {
        if radius <= 0.0 {
            return self.noop_if_active();
        }
        let Some(bounds) = Rect::from_xywh(cx - radius, cy - radius, radius * 2.0, radius * 2.0) else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(bounds),
            paint.coverage_pad(),
            DisplayCommand::DrawCircle { cx, cy, radius, paint: paint.clone() },
        )
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) -> DrawResult {
        self.record_draw(
            Some(oval),
            paint.coverage_pad(),
            DisplayCommand::DrawOval { oval, paint: paint.clone() },
        )
    }

    fn draw_arc(
        &mut self,
        oval: Rect,
        start_angle: f32,
        sweep_angle: f32,
        use_center: bool,
        paint: &Paint,
    ) -> DrawResult {
        if sweep_angle == 0.0 {
            return self.noop_if_active();
        }
        self.record_draw(
            Some(oval),
            paint.coverage_pad(),
            DisplayCommand::DrawArc {
                oval,
                start_angle,
                sweep_angle,
                use_center,
                paint: paint.clone(),
            },
        )
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawResult {
        self.record_draw(
            Some(path.bounds()),
            paint.coverage_pad(),
            DisplayCommand::DrawPath { path: path.clone(), paint: paint.clone() },
        )
    }

    fn draw_lines(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.len() < 2 {
            return self.noop_if_active();
        }
        let Some(bounds) = Self::points_bounds(points) else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(bounds),
            paint.coverage_pad().max(0.5),
            DisplayCommand::DrawLines { points: points.to_vec(), paint: paint.clone() },
        )
    }

    fn draw_points(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.is_empty() {
            return self.noop_if_active();
        }
        let Some(bounds) = Self::points_bounds(points) else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(bounds),
            paint.stroke_width().max(1.0),
            DisplayCommand::DrawPoints { points: points.to_vec(), paint: paint.clone() },
        )
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>) -> DrawResult {
        let Some(bounds) = Rect::from_xywh(left, top, bitmap.width() as f32, bitmap.height() as f32) else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(bounds),
            0.0,
            DisplayCommand::DrawBitmap {
                bitmap: Arc::clone(bitmap),
                left,
                top,
                paint: paint.cloned(),
            },
        )
    }

    fn draw_bitmap_matrix(&mut self, bitmap: &Bitmap, matrix: Transform, paint: Option<&Paint>) -> DrawResult {
        let Some(local) = Rect::from_xywh(0.0, 0.0, bitmap.width() as f32, bitmap.height() as f32) else {
            return self.noop_if_active();
        };
        let Some(mapped) = map_rect_aabb(local, matrix).to_rect() else {
            return self.noop_if_active();
        };
        self.record_draw(
            Some(mapped),
            0.0,
            DisplayCommand::DrawBitmapMatrix {
                bitmap: Arc::clone(bitmap),
                matrix,
                paint: paint.cloned(),
            },
        )
    }

    fn draw_bitmap_rect(&mut self, bitmap: &Bitmap, src: Rect, dst: Rect, paint: Option<&Paint>) -> DrawResult {
        if src.width() <= 0.0 || src.height() <= 0.0 {
            return self.noop_if_active();
        }
        self.record_draw(
            Some(dst),
            0.0,
            DisplayCommand::DrawBitmapRect {
                bitmap: Arc::clone(bitmap),
                src,
                dst,
                paint: paint.cloned(),
            },
        )
    }

    fn draw_glyphs(&mut self, run: &GlyphRun, paint: &Paint, mode: DrawOpMode) -> DrawResult {
        if run.is_empty() {
            return self.noop_if_active();
        }
        self.record_draw(
            Some(run.bounds),
            paint.coverage_pad(),
            DisplayCommand::DrawGlyphs { run: run.clone(), paint: paint.clone(), mode },
        )
    }

    fn draw_display_list(&mut self, list: &DisplayList) -> DrawResult {
        if !self.stack.in_frame() {
            return DrawResult::InvalidState;
        }
        // Pass-through, unmodified and uninspected.
        self.list.push(DisplayCommand::DrawDisplayList { list: Arc::new(list.clone()) });
        if list.is_empty() {
            DrawResult::NoOp
        } else {
            DrawResult::Drawn
        }
    }

    /// Interrupt brackets are not recordable; a display list replays on a
    /// different canvas at a different time, where the captured callback
    /// reference would be meaningless.
    fn call_draw_callback(&mut self, _callback: &mut dyn DrawCallback) -> DrawResult {
        DrawResult::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::backends::raster::RasterCanvas;
    use tiny_skia::PathBuilder;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_xywh(x, y, w, h).unwrap()
    }

    fn red() -> Paint {
        Paint::fill(Color::from_rgba8(255, 0, 0, 255))
    }

    fn blue() -> Paint {
        Paint::fill(Color::from_rgba8(0, 0, 255, 255))
    }

    /// Drives one drawing sequence against any canvas.
    fn scripted_frame(canvas: &mut dyn Canvas) {
        canvas.prepare(false).unwrap();
        let _ = canvas.draw_rect(rect(5.0, 5.0, 40.0, 40.0), &red());

        canvas.save(SaveFlags::empty());
        canvas.translate(20.0, 20.0);
        canvas.clip_rect(rect(0.0, 0.0, 30.0, 30.0), RegionOp::Intersect);
        let _ = canvas.draw_rect(rect(0.0, 0.0, 60.0, 60.0), &blue());
        canvas.restore();

        let mut pb = PathBuilder::new();
        pb.push_circle(70.0, 30.0, 12.0);
        let _ = canvas.draw_path(&pb.finish().unwrap(), &red());
        canvas.finish().unwrap();
    }

    #[test]
    fn recorder_reports_recording() {
        let canvas = RecordingCanvas::new(10, 10).unwrap();
        assert!(canvas.is_recording());
    }

    #[test]
    fn replay_matches_direct_rasterization() {
        let mut direct = RasterCanvas::new(100, 100).unwrap();
        scripted_frame(&mut direct);

        let mut recorder = RecordingCanvas::new(100, 100).unwrap();
        scripted_frame(&mut recorder);
        let list = recorder.take_display_list();

        let mut replayed = RasterCanvas::new(100, 100).unwrap();
        replayed.prepare(false).unwrap();
        assert!(replayed.draw_display_list(&list).is_drawn());
        replayed.finish().unwrap();

        assert_eq!(direct.pixmap().data(), replayed.pixmap().data());
    }

    #[test]
    fn rejected_draws_are_not_recorded() {
        let mut recorder = RecordingCanvas::new(100, 100).unwrap();

        // Not in a frame: nothing may record.
        assert_eq!(recorder.draw_rect(rect(0.0, 0.0, 10.0, 10.0), &red()), DrawResult::InvalidState);
        assert!(recorder.display_list().is_empty());

        recorder.prepare(false).unwrap();
        recorder.clip_rect(rect(0.0, 0.0, 10.0, 10.0), RegionOp::Intersect);
        let commands_before = recorder.display_list().len();
        assert_eq!(recorder.draw_rect(rect(50.0, 50.0, 10.0, 10.0), &red()), DrawResult::NoOp);
        assert_eq!(recorder.display_list().len(), commands_before);
        recorder.finish().unwrap();
    }

    #[test]
    fn state_tracking_matches_contract_while_recording() {
        let mut recorder = RecordingCanvas::new(100, 100).unwrap();
        recorder.prepare(false).unwrap();
        let depth = recorder.save(SaveFlags::empty());
        recorder.clip_rect(rect(10.0, 10.0, 20.0, 20.0), RegionOp::Intersect);
        assert_eq!(recorder.clip_bounds(), Some(rect(10.0, 10.0, 20.0, 20.0)));
        assert!(recorder.quick_reject(rect(50.0, 50.0, 5.0, 5.0)));
        recorder.restore_to_count(depth - 1);
        assert_eq!(recorder.clip_bounds(), Some(rect(0.0, 0.0, 100.0, 100.0)));
        recorder.finish().unwrap();
    }

    #[test]
    fn nested_display_list_passes_through() {
        let mut inner_rec = RecordingCanvas::new(100, 100).unwrap();
        inner_rec.prepare(false).unwrap();
        let _ = inner_rec.draw_rect(rect(10.0, 10.0, 10.0, 10.0), &red());
        inner_rec.finish().unwrap();
        let inner = inner_rec.take_display_list();

        let mut outer_rec = RecordingCanvas::new(100, 100).unwrap();
        outer_rec.prepare(false).unwrap();
        assert!(outer_rec.draw_display_list(&inner).is_drawn());
        outer_rec.finish().unwrap();
        let outer = outer_rec.take_display_list();

        let mut target = RasterCanvas::new(100, 100).unwrap();
        target.prepare(false).unwrap();
        assert!(target.draw_display_list(&outer).is_drawn());
        target.finish().unwrap();
        let pixel = target.pixmap().pixel(15, 15).unwrap();
        assert_eq!(pixel.red(), 255);
    }

    #[test]
    fn callback_is_unsupported_when_recording() {
        struct Nop;
        impl DrawCallback for Nop {
            fn draw(&mut self, _viewport: Viewport) {}
        }
        let mut recorder = RecordingCanvas::new(10, 10).unwrap();
        recorder.prepare(false).unwrap();
        assert_eq!(recorder.call_draw_callback(&mut Nop), DrawResult::Unsupported);
        recorder.finish().unwrap();
    }
}
