//! Shared canvas state machine.
//!
//! [`FrameStack`] owns everything the contract calls observable state: the
//! frame lifecycle, the save stack with per-frame transform and clip
//! snapshots, and layer bindings. Every backend embeds one and routes all
//! state operations through it, which is what keeps independently
//! implemented backends in lockstep: the pixels differ in how they are
//! produced, never in which calls were accepted or rejected.
//!
//! Misuse never corrupts the stack. A refused call logs a warning and
//! leaves every frame exactly as it was.

use log::{debug, warn};
use tiny_skia::{BlendMode, Path, Rect, Transform};

use crate::canvas::clip::{ClipShape, ClipState};
use crate::canvas::{DrawResult, RegionOp, SaveFlags};
use crate::errors::CanvasError;
use crate::geometry::{map_rect_aabb, Bounds, Region};
use crate::viewport::Viewport;

/// Frame lifecycle. `Preparing` and `Finished` are transient: the
/// synchronous `prepare`/`finish` calls pass through them and settle on
/// `Active`/`Idle` before returning.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    Idle,
    Preparing,
    Active,
    Interrupted { depth: u32 },
    Finished,
}

/// Layer parameters captured at `save_layer` time. Immutable afterwards;
/// compositing at the matching restore uses exactly these values.
#[derive(Clone, Copy, Debug)]
pub struct LayerSpec {
    pub bounds: Rect,
    pub alpha: u8,
    pub blend_mode: BlendMode,
    pub flags: SaveFlags,
}

/// One save/restore level: transform and clip snapshots plus the layer
/// introduced at this depth, if any.
#[derive(Clone, Debug)]
pub struct Frame {
    pub transform: Transform,
    pub clip: ClipState,
    pub layer: Option<LayerSpec>,
    pub flags: SaveFlags,
}

/// The nested save/restore stack with lifecycle tracking.
///
/// Frames are stored contiguously and indexed by depth; `restore_to_count`
/// is a truncation. The stack always holds at least the base frame, even
/// while idle, so accessors stay total.
#[derive(Debug)]
pub struct FrameStack {
    viewport: Viewport,
    lifecycle: Lifecycle,
    frames: Vec<Frame>,
}

impl FrameStack {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            lifecycle: Lifecycle::Idle,
            frames: vec![Self::base_frame(viewport, None)],
        }
    }

    fn base_frame(viewport: Viewport, dirty: Option<Rect>) -> Frame {
        let surface = viewport
            .bounds()
            .map(Bounds::from_rect)
            .unwrap_or(Bounds::EMPTY);
        let clip = match dirty {
            Some(rect) => Bounds::from_rect(rect).intersect(&surface),
            None => surface,
        };
        Frame {
            transform: Transform::identity(),
            clip: ClipState::base(clip),
            layer: None,
            flags: SaveFlags::empty(),
        }
    }

    fn top(&self) -> &Frame {
        // The stack is never empty; the base frame survives even while idle.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether state-mutating and draw calls are currently legal: an active
    /// frame, including inside an interrupt bracket.
    pub fn in_frame(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active | Lifecycle::Interrupted { .. })
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if self.in_frame() {
            warn!("set_viewport({width}, {height}) during a frame ignored");
            return;
        }
        self.viewport.resize(width, height);
        self.frames.clear();
        self.frames.push(Self::base_frame(self.viewport, None));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Idle -> Active. Resets the stack to a single base frame whose clip is
    /// the full surface, or `dirty` clamped to it.
    pub fn begin_frame(&mut self, dirty: Option<Rect>) -> Result<(), CanvasError> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(CanvasError::FrameInProgress);
        }
        self.lifecycle = Lifecycle::Preparing;
        self.frames.clear();
        self.frames.push(Self::base_frame(self.viewport, dirty));
        self.lifecycle = Lifecycle::Active;
        debug!("frame begun, base clip {:?}", self.top().clip.bounds());
        Ok(())
    }

    /// Active -> Idle. The backend unwinds outstanding saves before calling
    /// this; leftovers are dropped with a warning rather than leaking.
    pub fn end_frame(&mut self) -> Result<(), CanvasError> {
        match self.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Interrupted { .. } => return Err(CanvasError::FinishWhileInterrupted),
            _ => return Err(CanvasError::NoFrameInProgress),
        }
        self.lifecycle = Lifecycle::Finished;
        if self.frames.len() > 1 {
            warn!("finish with {} unbalanced save(s)", self.frames.len() - 1);
            self.frames.truncate(1);
        }
        self.lifecycle = Lifecycle::Idle;
        debug!("frame finished");
        Ok(())
    }

    pub fn interrupt(&mut self) -> Result<(), CanvasError> {
        match self.lifecycle {
            Lifecycle::Active => {
                self.lifecycle = Lifecycle::Interrupted { depth: 1 };
                Ok(())
            }
            Lifecycle::Interrupted { depth } => {
                self.lifecycle = Lifecycle::Interrupted { depth: depth + 1 };
                Ok(())
            }
            other => Err(CanvasError::InterruptOutsideFrame(other)),
        }
    }

    pub fn resume(&mut self) -> Result<(), CanvasError> {
        match self.lifecycle {
            Lifecycle::Interrupted { depth: 1 } => {
                self.lifecycle = Lifecycle::Active;
                Ok(())
            }
            Lifecycle::Interrupted { depth } => {
                self.lifecycle = Lifecycle::Interrupted { depth: depth - 1 };
                Ok(())
            }
            other => Err(CanvasError::UnbalancedResume(other)),
        }
    }

    // ------------------------------------------------------------------
    // Save stack
    // ------------------------------------------------------------------

    pub fn save_count(&self) -> usize {
        self.frames.len()
    }

    pub fn save(&mut self, flags: SaveFlags) -> usize {
        if !self.in_frame() {
            warn!("save outside a frame ignored");
            return self.frames.len();
        }
        let top = self.top();
        let frame = Frame {
            transform: top.transform,
            clip: top.clip.child(),
            layer: None,
            flags,
        };
        self.frames.push(frame);
        self.frames.len()
    }

    /// Pushes a frame bound to a new layer. When `CLIP_TO_LAYER` is set the
    /// child clip is additionally intersected with the layer bounds.
    pub fn save_layer(&mut self, spec: LayerSpec) -> usize {
        if !self.in_frame() {
            warn!("save_layer outside a frame ignored");
            return self.frames.len();
        }
        let top = self.top();
        let mut clip = top.clip.child();
        if spec.flags.contains(SaveFlags::CLIP_TO_LAYER) {
            clip.apply(ClipShape::from_rect(spec.bounds, top.transform), RegionOp::Intersect);
        }
        let frame = Frame {
            transform: top.transform,
            clip,
            layer: Some(spec),
            flags: spec.flags,
        };
        self.frames.push(frame);
        self.frames.len()
    }

    /// Pops one frame and returns it so the backend can composite any layer
    /// it introduced. Refuses to pop the base frame.
    pub fn restore(&mut self) -> Option<Frame> {
        if !self.in_frame() {
            warn!("restore outside a frame ignored");
            return None;
        }
        if self.frames.len() == 1 {
            warn!("restore at base frame ignored");
            return None;
        }
        self.frames.pop()
    }

    /// Pops frames until the depth equals `count`, returning them innermost
    /// first. `count` below 1 clamps to 1; at or above the current depth
    /// this is a no-op.
    pub fn restore_to_count(&mut self, count: usize) -> Vec<Frame> {
        if !self.in_frame() {
            warn!("restore_to_count outside a frame ignored");
            return Vec::new();
        }
        let target = count.max(1);
        let mut popped = Vec::new();
        while self.frames.len() > target {
            if let Some(frame) = self.frames.pop() {
                popped.push(frame);
            }
        }
        popped
    }

    // ------------------------------------------------------------------
    // Transform
    // ------------------------------------------------------------------

    /// Effective transform of the current frame, as a value snapshot.
    pub fn matrix(&self) -> Transform {
        self.top().transform
    }

    pub fn set_matrix(&mut self, matrix: Transform) {
        if !self.in_frame() {
            warn!("set_matrix outside a frame ignored");
            return;
        }
        self.top_mut().transform = matrix;
    }

    pub fn concat_matrix(&mut self, matrix: Transform) {
        if !self.in_frame() {
            warn!("concat_matrix outside a frame ignored");
            return;
        }
        let top = self.top_mut();
        top.transform = top.transform.pre_concat(matrix);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.concat_matrix(Transform::from_translate(dx, dy));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.concat_matrix(Transform::from_rotate(degrees));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.concat_matrix(Transform::from_scale(sx, sy));
    }

    pub fn skew(&mut self, sx: f32, sy: f32) {
        self.concat_matrix(Transform::from_skew(sx, sy));
    }

    // ------------------------------------------------------------------
    // Clip
    // ------------------------------------------------------------------

    pub fn clip_rect(&mut self, rect: Rect, op: RegionOp) -> bool {
        self.clip_shape(ClipShape::from_rect(rect, self.matrix()), op)
    }

    pub fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        self.clip_shape(ClipShape::from_path(path, self.matrix()), op)
    }

    pub fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool {
        self.clip_shape(ClipShape::from_region(region, self.matrix()), op)
    }

    fn clip_shape(&mut self, shape: ClipShape, op: RegionOp) -> bool {
        if !self.in_frame() {
            warn!("clip op outside a frame ignored");
            return !self.top().clip.is_empty();
        }
        self.top_mut().clip.apply(shape, op)
    }

    /// Device-space bounding box of the resolved clip.
    pub fn clip_device_bounds(&self) -> Bounds {
        self.top().clip.bounds()
    }

    pub fn clip_bounds(&self) -> Option<Rect> {
        self.top().clip.bounds().to_rect()
    }

    /// True only when `rect` mapped through the current transform is
    /// provably disjoint from the clip.
    pub fn quick_reject(&self, rect: Rect) -> bool {
        let clip = &self.top().clip;
        if clip.is_empty() {
            return true;
        }
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return true;
        }
        !map_rect_aabb(rect, self.top().transform).intersects(&clip.bounds())
    }

    // ------------------------------------------------------------------
    // Draw gating
    // ------------------------------------------------------------------

    /// Common front half of every draw: lifecycle check, then trivial
    /// rejection of `local_bounds` (outset by `pad` for stroke or shadow
    /// reach) against the clip. `None` means the draw should proceed.
    pub fn draw_check(&self, local_bounds: Option<Rect>, pad: f32) -> Option<DrawResult> {
        if !self.in_frame() {
            warn!("draw outside a frame rejected");
            return Some(DrawResult::InvalidState);
        }
        let clip = &self.top().clip;
        if clip.is_empty() {
            return Some(DrawResult::NoOp);
        }
        if let Some(rect) = local_bounds {
            let local = Bounds::from_rect(rect).outset(pad.max(0.0));
            let device = match local.to_rect() {
                Some(rect) => map_rect_aabb(rect, self.top().transform),
                // Degenerate geometry that no stroke pad widened.
                None => return Some(DrawResult::NoOp),
            };
            if !device.intersects(&clip.bounds()) {
                return Some(DrawResult::NoOp);
            }
        }
        None
    }

    /// Base clip in device space, used by backends to clear the dirty area.
    pub fn base_device_bounds(&self) -> Bounds {
        self.frames[0].clip.bounds()
    }
}
