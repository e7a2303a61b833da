//! The backend-agnostic canvas contract.
//!
//! [`Canvas`] is the single interface every renderer satisfies: the frame
//! lifecycle, the nested save/restore stack with transform and clip
//! tracking, layer compositing and the uniform draw entry points. Backends
//! differ in execution strategy (draw now, record for later) but share the
//! state machine in [`state`], so a caller observes identical behavior from
//! any of them.

pub mod clip;
pub mod state;

/// Rendering backends implementing the canvas contract.
pub mod backends {
    pub mod null;
    pub mod raster;
    pub mod recording;
}

use std::sync::Arc;

use tiny_skia::{BlendMode, Color, Path, Pixmap, Point, Rect, Transform};

use crate::display_list::DisplayList;
use crate::errors::CanvasError;
use crate::geometry::Region;
use crate::paint::Paint;
use crate::text::GlyphRun;
use crate::viewport::Viewport;

use self::state::Lifecycle;

/// Shared-ownership pixel buffer for image draws. Recording backends keep a
/// reference instead of copying pixels.
pub type Bitmap = Arc<Pixmap>;

/// Outcome of a draw operation.
///
/// Contract violations and missing capabilities are reported here, never by
/// panicking, and a rejected call leaves the canvas state untouched.
#[must_use]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrawResult {
    /// The operation took effect on the target.
    Drawn,
    /// Fully clipped out, degenerate geometry or a transparent layer.
    NoOp,
    /// Lifecycle contract violated, e.g. a draw while no frame is open.
    InvalidState,
    /// The backend does not implement this capability.
    Unsupported,
}

impl DrawResult {
    pub fn is_drawn(self) -> bool {
        self == Self::Drawn
    }
}

/// Execution mode for text draws. Orthogonal to the save stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrawOpMode {
    /// Execute synchronously.
    Immediate,
    /// Record the operation; no pixel effect until a flush or frame end.
    Defer,
    /// Execute all deferred operations in call order, then this call.
    Flush,
}

/// Boolean combine mode for clip operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionOp {
    Intersect,
    Union,
    Difference,
    ReverseDifference,
    Replace,
}

bitflags::bitflags! {
    /// Flags accepted by `save` and `save_layer`.
    ///
    /// Matrix and clip are always restored in full on `restore`; `MATRIX`
    /// and `CLIP` are accepted for source compatibility. `CLIP_TO_LAYER`
    /// sizes the offscreen target to the layer bounds and clips content to
    /// them, otherwise the layer spans the whole surface.
    #[derive(Default)]
    pub struct SaveFlags: u32 {
        const MATRIX = 0x01;
        const CLIP = 0x02;
        const MATRIX_CLIP = 0x03;
        const HAS_ALPHA_LAYER = 0x04;
        const FULL_COLOR_LAYER = 0x08;
        const CLIP_TO_LAYER = 0x10;
    }
}

/// Externally supplied drawing code, invoked only inside an
/// interrupt/resume bracket. The callback is not bound by the canvas
/// contract; the bracket exists so the canvas can fence its own state.
pub trait DrawCallback {
    fn draw(&mut self, viewport: Viewport);
}

/// The stateful 2D drawing surface contract.
///
/// Call order within one frame: `prepare`/`prepare_dirty`, any number of
/// save/clip/transform/draw calls, balanced restores, then `finish`.
/// Violations are observable through return values and never corrupt the
/// stack.
pub trait Canvas {
    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Sets the optional renderer name. Debugging only, no semantic effect.
    fn set_name(&mut self, name: &str);

    /// The renderer name; empty when never set.
    fn name(&self) -> &str;

    /// Whether this backend records commands for later playback.
    fn is_recording(&self) -> bool {
        false
    }

    // ------------------------------------------------------------------
    // Frame lifecycle
    // ------------------------------------------------------------------

    /// Resizes the underlying surface. Must be called outside a frame,
    /// and at least once whenever the drawing surface changes size.
    fn set_viewport(&mut self, width: u32, height: u32);

    fn viewport(&self) -> Viewport;

    fn lifecycle(&self) -> Lifecycle;

    /// Begins a frame assuming the whole surface is redrawn. Clears the
    /// target unless `opaque`.
    fn prepare(&mut self, opaque: bool) -> Result<(), CanvasError>;

    /// Begins a frame with only `dirty` assumed damaged; the base clip is
    /// set to it. Clears the dirty area unless `opaque`.
    fn prepare_dirty(&mut self, dirty: Rect, opaque: bool) -> Result<(), CanvasError>;

    /// Ends the frame. Outstanding saves are unwound, deferred operations
    /// execute. Exactly one `finish` per `prepare`.
    fn finish(&mut self) -> Result<(), CanvasError>;

    /// Must precede handing control to external drawing code.
    fn interrupt(&mut self) -> Result<(), CanvasError>;

    /// Reverses one `interrupt`. Brackets must balance exactly.
    fn resume(&mut self) -> Result<(), CanvasError>;

    // ------------------------------------------------------------------
    // Save stack
    // ------------------------------------------------------------------

    /// Current stack depth, at least 1.
    fn save_count(&self) -> usize;

    /// Pushes a frame duplicating the current transform and clip. Returns
    /// the new depth.
    fn save(&mut self, flags: SaveFlags) -> usize;

    /// Pops one frame. Popping the base frame is refused.
    fn restore(&mut self);

    /// Pops frames until the depth equals `count`. Values below 1 clamp to
    /// 1; values at or above the current depth are a no-op.
    fn restore_to_count(&mut self, count: usize);

    /// Pushes a frame bound to a fresh offscreen target. `alpha` and
    /// `blend_mode` are captured now and used when the matching restore
    /// composites the layer into its parent.
    fn save_layer(&mut self, bounds: Rect, alpha: u8, blend_mode: BlendMode, flags: SaveFlags) -> usize;

    /// `save_layer` with the blend mode fixed to source-over.
    fn save_layer_alpha(&mut self, bounds: Rect, alpha: u8, flags: SaveFlags) -> usize {
        self.save_layer(bounds, alpha, BlendMode::SourceOver, flags)
    }

    /// `save_layer` taking alpha and blend mode from a paint, defaulting to
    /// opaque source-over without one.
    fn save_layer_paint(&mut self, bounds: Rect, paint: Option<&Paint>, flags: SaveFlags) -> usize {
        match paint {
            Some(paint) => self.save_layer(bounds, paint.alpha8(), paint.blend_mode, flags),
            None => self.save_layer(bounds, 255, BlendMode::SourceOver, flags),
        }
    }

    // ------------------------------------------------------------------
    // Transform
    // ------------------------------------------------------------------

    /// Snapshot of the effective transform. Never a live alias.
    fn matrix(&self) -> Transform;

    fn set_matrix(&mut self, matrix: Transform);

    fn concat_matrix(&mut self, matrix: Transform);

    fn translate(&mut self, dx: f32, dy: f32);

    /// Rotation in degrees, clockwise in the y-down device space.
    fn rotate(&mut self, degrees: f32);

    fn scale(&mut self, sx: f32, sy: f32);

    fn skew(&mut self, sx: f32, sy: f32);

    // ------------------------------------------------------------------
    // Clip
    // ------------------------------------------------------------------

    /// Bounding box of the resolved clip in device space, `None` when the
    /// clip is provably empty.
    fn clip_bounds(&self) -> Option<Rect>;

    /// True only when `rect`, mapped through the current transform, is
    /// provably disjoint from the clip. Conservative: false negatives are
    /// fine, false positives never happen.
    fn quick_reject(&self, rect: Rect) -> bool;

    /// Combines `rect` into the clip. Returns whether the resulting clip
    /// is non-empty.
    fn clip_rect(&mut self, rect: Rect, op: RegionOp) -> bool;

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool;

    fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool;

    // ------------------------------------------------------------------
    // Draw dispatch
    // ------------------------------------------------------------------

    /// Fills the clip with `color` using `mode`.
    fn draw_color(&mut self, color: Color, mode: BlendMode) -> DrawResult;

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) -> DrawResult;

    fn draw_rects(&mut self, rects: &[Rect], paint: &Paint) -> DrawResult;

    fn draw_round_rect(&mut self, rect: Rect, rx: f32, ry: f32, paint: &Paint) -> DrawResult;

    fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) -> DrawResult;

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) -> DrawResult;

    /// Arc along `oval` from `start_angle` sweeping `sweep_angle`, both in
    /// degrees; `use_center` closes a wedge through the oval center.
    fn draw_arc(
        &mut self,
        oval: Rect,
        start_angle: f32,
        sweep_angle: f32,
        use_center: bool,
        paint: &Paint,
    ) -> DrawResult;

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawResult;

    /// Stroke independent segments: points are consumed pairwise.
    fn draw_lines(&mut self, points: &[Point], paint: &Paint) -> DrawResult;

    fn draw_points(&mut self, points: &[Point], paint: &Paint) -> DrawResult;

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>) -> DrawResult;

    fn draw_bitmap_matrix(&mut self, bitmap: &Bitmap, matrix: Transform, paint: Option<&Paint>) -> DrawResult;

    /// Draws the `src` portion of `bitmap` scaled into `dst`.
    fn draw_bitmap_rect(&mut self, bitmap: &Bitmap, src: Rect, dst: Rect, paint: Option<&Paint>) -> DrawResult;

    /// Draws a positioned glyph run. `mode` selects immediate, deferred or
    /// flushing execution; backends without deferral treat `Defer` and
    /// `Flush` as `Immediate`.
    fn draw_glyphs(&mut self, run: &GlyphRun, paint: &Paint, mode: DrawOpMode) -> DrawResult;

    /// Replays a recorded command buffer. The buffer passes through
    /// unmodified; save/restore inside it are balanced around the replay.
    fn draw_display_list(&mut self, list: &DisplayList) -> DrawResult;

    /// Runs external drawing code inside an interrupt/resume bracket.
    fn call_draw_callback(&mut self, callback: &mut dyn DrawCallback) -> DrawResult;
}
