//! Immediate-mode software rasterizer over `tiny_skia`.
//!
//! Draws execute synchronously into a [`Pixmap`]. The shared [`FrameStack`]
//! carries the observable state; this backend adds the pixel-level
//! machinery: per-frame alpha masks realizing the clip, offscreen layer
//! targets swapped in on `save_layer` and composited back on the matching
//! restore, and the deferred text queue behind `DrawOpMode`.
//!
//! Coordinate spaces: the frame stack tracks everything in base surface
//! device space. While a bounded layer is active the pixel target is a
//! smaller pixmap at `origin`; draw transforms are shifted by `-origin` and
//! masks live in the layer's local space.

use anyhow::{anyhow, Result};
use log::warn;
use tiny_skia::{
    BlendMode, Color, FillRule, FilterQuality, IntRect, LineCap, LinearGradient, Mask, MaskType,
    Path, PathBuilder, Pixmap, PixmapPaint, Point, RadialGradient, Rect, Transform,
};
use tiny_skia::Paint as SkiaPaint;

use crate::canvas::state::{Frame, FrameStack, LayerSpec, Lifecycle};
use crate::canvas::{
    Bitmap, Canvas, DrawCallback, DrawOpMode, DrawResult, RegionOp, SaveFlags,
};
use crate::config::CanvasConfig;
use crate::display_list::DisplayList;
use crate::errors::CanvasError;
use crate::geometry::{map_rect_aabb, Bounds, Region};
use crate::paint::{Paint, PaintFlags, PaintStyle, ShaderSpec};
use crate::text::{GlyphRun, GlyphSource};
use crate::viewport::Viewport;

/// Cubic control distance for a quarter circle, 4/3 * tan(pi/8).
const KAPPA: f32 = 0.552_284_8;

/// Per-frame pixel clip. `current == None` means full coverage of the
/// frame's target; `limit` is the coverage at frame entry, the clamp for
/// widening clip ops.
#[derive(Debug)]
struct MaskFrame {
    current: Option<Mask>,
    limit: Option<Mask>,
}

impl MaskFrame {
    fn child(&self) -> Self {
        Self {
            current: self.current.clone(),
            limit: self.current.clone(),
        }
    }
}

/// An offscreen layer target. The parent pixmap is parked here while the
/// layer is live and swapped back at restore.
struct LayerRecord {
    parent: Pixmap,
    /// Target origin in base surface device space.
    origin: (i32, i32),
    alpha: u8,
    blend_mode: BlendMode,
    /// Set by the first draw that lands; an untouched layer composites as
    /// a true no-op.
    dirty: bool,
}

struct DeferredGlyphs {
    run: GlyphRun,
    paint: Paint,
    transform: Transform,
    mask: Option<Mask>,
}

enum MaskSel<'a> {
    Current,
    Stored(Option<&'a Mask>),
}

/// Software canvas drawing into a `tiny_skia::Pixmap`.
pub struct RasterCanvas {
    stack: FrameStack,
    name: String,
    config: CanvasConfig,
    /// Current pixel target: the base surface or the innermost layer.
    pixmap: Pixmap,
    /// Parallel to the frame stack, one entry per frame.
    masks: Vec<MaskFrame>,
    layers: Vec<LayerRecord>,
    deferred: Vec<DeferredGlyphs>,
    glyphs: Option<Box<dyn GlyphSource>>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_config(CanvasConfig {
            viewport: Viewport::new(width, height),
            ..CanvasConfig::default()
        })
    }

    pub fn with_config(config: CanvasConfig) -> Result<Self> {
        let viewport = config.viewport;
        if viewport.is_empty() {
            return Err(anyhow!(CanvasError::EmptySurface));
        }
        let pixmap = Pixmap::new(viewport.width, viewport.height).ok_or_else(|| {
            anyhow!(CanvasError::Allocation(format!(
                "{}x{} surface",
                viewport.width, viewport.height
            )))
        })?;
        Ok(Self {
            stack: FrameStack::new(viewport),
            name: String::new(),
            config,
            pixmap,
            masks: vec![MaskFrame { current: None, limit: None }],
            layers: Vec::new(),
            deferred: Vec::new(),
            glyphs: None,
        })
    }

    /// Installs the external glyph outline source used by text draws.
    /// Without one, text operations report `Unsupported`.
    pub fn set_glyph_source(&mut self, source: Box<dyn GlyphSource>) {
        self.glyphs = Some(source);
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    // ------------------------------------------------------------------
    // Target plumbing
    // ------------------------------------------------------------------

    fn current_origin(&self) -> (i32, i32) {
        self.layers.last().map(|layer| layer.origin).unwrap_or((0, 0))
    }

    /// Draw transform for the current target: the stack matrix shifted by
    /// the active layer origin.
    fn device_transform(&self) -> Transform {
        let (ox, oy) = self.current_origin();
        self.stack.matrix().post_translate(-(ox as f32), -(oy as f32))
    }

    fn mark_dirty(&mut self) {
        if let Some(layer) = self.layers.last_mut() {
            layer.dirty = true;
        }
    }

    fn noop_if_active(&self) -> DrawResult {
        match self.stack.draw_check(None, 0.0) {
            Some(result) => result,
            None => DrawResult::NoOp,
        }
    }

    // ------------------------------------------------------------------
    // Clip masks
    // ------------------------------------------------------------------

    /// Rasterizes a shape's coverage into a target-sized alpha mask.
    fn shape_mask<F>(&self, build: F) -> Option<Mask>
    where
        F: FnOnce(&mut Pixmap, &SkiaPaint<'_>, Transform),
    {
        let mut pixmap = Pixmap::new(self.pixmap.width(), self.pixmap.height())?;
        let mut paint = SkiaPaint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        paint.anti_alias = true;
        build(&mut pixmap, &paint, self.device_transform());
        Some(Mask::from_pixmap(pixmap.as_ref(), MaskType::Alpha))
    }

    fn rect_shape_mask(&self, rect: Rect) -> Option<Mask> {
        self.shape_mask(|pixmap, paint, ts| {
            pixmap.fill_rect(rect, paint, ts, None);
        })
    }

    fn path_shape_mask(&self, path: &Path) -> Option<Mask> {
        self.shape_mask(|pixmap, paint, ts| {
            pixmap.fill_path(path, paint, FillRule::Winding, ts, None);
        })
    }

    fn region_shape_mask(&self, region: &Region) -> Option<Mask> {
        self.shape_mask(|pixmap, paint, ts| {
            for rect in region.rects() {
                pixmap.fill_rect(*rect, paint, ts, None);
            }
        })
    }

    /// Folds a shape's coverage into the top frame's pixel clip, mirroring
    /// the bounds-level op applied to the frame stack.
    fn combine_clip_mask(&mut self, shape: Option<Mask>, op: RegionOp) {
        let Some(frame) = self.masks.last_mut() else {
            return;
        };
        let Some(shape) = shape else {
            // Allocation failure: drop to an empty pixel clip for shrink
            // ops, leave widen ops alone. Stays consistent with the
            // conservative bounds in the frame stack.
            if matches!(op, RegionOp::Intersect | RegionOp::Replace) {
                if let Some(mask) = frame.current.as_mut() {
                    mask_clear(mask);
                }
            }
            return;
        };

        let next = match op {
            RegionOp::Intersect => match frame.current.take() {
                Some(mut mask) => {
                    mask_min(&mut mask, &shape);
                    Some(mask)
                }
                None => Some(shape),
            },
            RegionOp::Union => match frame.current.take() {
                Some(mut mask) => {
                    mask_max(&mut mask, &shape);
                    if let Some(limit) = &frame.limit {
                        mask_min(&mut mask, limit);
                    }
                    Some(mask)
                }
                // Full coverage cannot grow.
                None => None,
            },
            RegionOp::Difference => match frame.current.take() {
                Some(mut mask) => {
                    mask_subtract(&mut mask, &shape);
                    Some(mask)
                }
                None => {
                    let mut inverted = shape;
                    mask_invert(&mut inverted);
                    Some(inverted)
                }
            },
            RegionOp::ReverseDifference => {
                let mut mask = shape;
                match frame.current.take() {
                    Some(current) => mask_subtract(&mut mask, &current),
                    // Shape minus full coverage is empty.
                    None => mask_clear(&mut mask),
                }
                if let Some(limit) = &frame.limit {
                    mask_min(&mut mask, limit);
                }
                Some(mask)
            }
            RegionOp::Replace => {
                let mut mask = shape;
                if let Some(limit) = &frame.limit {
                    mask_min(&mut mask, limit);
                }
                Some(mask)
            }
        };
        frame.current = next;
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    /// Device box a bounded layer occupies: the layer bounds through the
    /// current transform, clamped to the clip and the surface.
    fn layer_device_box(&self, bounds: Rect) -> (i32, i32, u32, u32) {
        let surface = self
            .stack
            .viewport()
            .bounds()
            .map(Bounds::from_rect)
            .unwrap_or(Bounds::EMPTY);
        let device = map_rect_aabb(bounds, self.stack.matrix())
            .intersect(&self.stack.clip_device_bounds())
            .intersect(&surface);
        let (x0, y0, x1, y1) = device.round_out();
        let width = (x1 - x0).max(0) as u32;
        let height = (y1 - y0).max(0) as u32;
        (x0, y0, width, height)
    }

    fn push_layer_target(&mut self, spec: &LayerSpec) {
        let (ox, oy, width, height) = if spec.flags.contains(SaveFlags::CLIP_TO_LAYER) {
            self.layer_device_box(spec.bounds)
        } else {
            let viewport = self.stack.viewport();
            (0, 0, viewport.width, viewport.height)
        };

        // A degenerate box still gets a target so the stack discipline is
        // uniform; it can never become dirty.
        let target = Pixmap::new(width.max(1), height.max(1));
        let Some(target) = target else {
            warn!("layer allocation failed, drawing continues on the parent target");
            let frame = self.masks.last().map(MaskFrame::child).unwrap_or(MaskFrame {
                current: None,
                limit: None,
            });
            self.masks.push(frame);
            return;
        };

        // The child frame's masks move into layer-local space.
        let (pox, poy) = self.current_origin();
        let parent_mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        let local = parent_mask.and_then(|mask| {
            crop_mask(
                mask,
                (ox - pox).max(0) as u32,
                (oy - poy).max(0) as u32,
                width.max(1),
                height.max(1),
            )
        });
        self.masks.push(MaskFrame {
            current: local.clone(),
            limit: local,
        });

        let parent = std::mem::replace(&mut self.pixmap, target);
        self.layers.push(LayerRecord {
            parent,
            origin: (ox, oy),
            alpha: spec.alpha,
            blend_mode: spec.blend_mode,
            dirty: false,
        });
    }

    /// Re-parents after a frame pop; composites the frame's layer if it
    /// introduced one and anything was drawn into it.
    fn apply_restored_frame(&mut self, frame: Frame) {
        self.masks.pop();
        if frame.layer.is_none() {
            return;
        }
        let Some(record) = self.layers.pop() else {
            warn!("layer stack out of sync with frame stack");
            return;
        };
        let layer_pixmap = std::mem::replace(&mut self.pixmap, record.parent);
        if !record.dirty || record.alpha == 0 {
            return;
        }

        let mut paint = PixmapPaint::default();
        paint.opacity = record.alpha as f32 / 255.0;
        paint.blend_mode = record.blend_mode;
        paint.quality = FilterQuality::Nearest;

        let (pox, poy) = self.current_origin();
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        self.pixmap.draw_pixmap(
            record.origin.0 - pox,
            record.origin.1 - poy,
            layer_pixmap.as_ref(),
            &paint,
            Transform::identity(),
            mask,
        );
        self.mark_dirty();
    }

    // ------------------------------------------------------------------
    // Draw execution
    // ------------------------------------------------------------------

    /// Fills or strokes `path` with `paint`, shadow first when present.
    fn paint_path(&mut self, path: &Path, paint: &Paint) {
        let ts = self.device_transform();
        if let Some(shadow) = paint.shadow {
            let mut sk = SkiaPaint::default();
            sk.set_color(shadow.color);
            sk.anti_alias = paint.anti_alias();
            sk.blend_mode = BlendMode::SourceOver;
            // Offset silhouette; the software pass does not blur.
            let shadow_ts = ts.pre_translate(shadow.dx, shadow.dy);
            self.stroke_or_fill(path, &sk, paint, shadow_ts);
        }
        let sk = resolve_paint(paint);
        self.stroke_or_fill(path, &sk, paint, ts);
        self.mark_dirty();
    }

    fn stroke_or_fill(&mut self, path: &Path, sk: &SkiaPaint<'_>, paint: &Paint, ts: Transform) {
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        match paint.style {
            PaintStyle::Fill => {
                self.pixmap.fill_path(path, sk, paint.fill_rule, ts, mask);
            }
            PaintStyle::Stroke(params) => {
                let stroke = tiny_skia::Stroke {
                    width: params.width,
                    miter_limit: params.miter_limit,
                    line_cap: params.line_cap,
                    line_join: params.line_join,
                    dash: None,
                };
                self.pixmap.stroke_path(path, sk, &stroke, ts, mask);
            }
        }
    }

    fn draw_path_op(&mut self, path: &Path, paint: &Paint) -> DrawResult {
        if let Some(result) = self.stack.draw_check(Some(path.bounds()), paint.coverage_pad()) {
            return result;
        }
        self.paint_path(path, paint);
        DrawResult::Drawn
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    fn blit_run(&mut self, run: &GlyphRun, paint: &Paint, ts: Transform, sel: MaskSel<'_>) {
        let Some(source) = self.glyphs.as_deref() else {
            return;
        };
        let sk = resolve_paint(paint);
        let mask = match sel {
            MaskSel::Current => self.masks.last().and_then(|frame| frame.current.as_ref()),
            MaskSel::Stored(mask) => mask,
        };
        // A mask captured against a target that is gone by flush time
        // cannot be applied; skip rather than draw unclipped.
        if let Some(mask) = mask {
            if mask.width() != self.pixmap.width() || mask.height() != self.pixmap.height() {
                warn!("deferred text dropped, its clip target no longer exists");
                return;
            }
        }
        let mut drew = false;
        for glyph in &run.glyphs {
            let Some(outline) = source.glyph_path(glyph.id) else {
                continue;
            };
            let glyph_ts = ts
                .pre_translate(glyph.x, glyph.y)
                .pre_scale(run.font_size, run.font_size);
            match paint.style {
                PaintStyle::Fill => {
                    self.pixmap.fill_path(&outline, &sk, paint.fill_rule, glyph_ts, mask);
                }
                PaintStyle::Stroke(params) => {
                    let stroke = tiny_skia::Stroke {
                        width: params.width,
                        miter_limit: params.miter_limit,
                        line_cap: params.line_cap,
                        line_join: params.line_join,
                        dash: None,
                    };
                    self.pixmap.stroke_path(&outline, &sk, &stroke, glyph_ts, mask);
                }
            }
            drew = true;
        }
        if drew {
            if let Some(layer) = self.layers.last_mut() {
                layer.dirty = true;
            }
        }
    }

    /// Executes every deferred text op in original call order.
    fn flush_deferred(&mut self) {
        let pending = std::mem::take(&mut self.deferred);
        for item in pending {
            self.blit_run(&item.run, &item.paint, item.transform, MaskSel::Stored(item.mask.as_ref()));
        }
    }

    fn draw_run_gated(&mut self, run: &GlyphRun, paint: &Paint) -> DrawResult {
        if run.is_empty() {
            return self.noop_if_active();
        }
        if let Some(result) = self.stack.draw_check(Some(run.bounds), paint.coverage_pad()) {
            return result;
        }
        let ts = self.device_transform();
        self.blit_run(run, paint, ts, MaskSel::Current);
        DrawResult::Drawn
    }
}

impl Canvas for RasterCanvas {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if self.stack.in_frame() {
            warn!("set_viewport during a frame ignored");
            return;
        }
        self.stack.set_viewport(width, height);
        match Pixmap::new(width.max(1), height.max(1)) {
            Some(pixmap) => {
                self.pixmap = pixmap;
                self.masks.clear();
                self.masks.push(MaskFrame { current: None, limit: None });
            }
            None => warn!("surface reallocation to {width}x{height} failed"),
        }
    }

    fn viewport(&self) -> Viewport {
        self.stack.viewport()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.stack.lifecycle()
    }

    fn prepare(&mut self, opaque: bool) -> Result<(), CanvasError> {
        self.stack.begin_frame(None)?;
        self.deferred.clear();
        self.masks.clear();
        self.masks.push(MaskFrame { current: None, limit: None });
        if !opaque {
            self.pixmap.fill(self.config.clear_color);
        }
        Ok(())
    }

    fn prepare_dirty(&mut self, dirty: Rect, opaque: bool) -> Result<(), CanvasError> {
        self.stack.begin_frame(Some(dirty))?;
        self.deferred.clear();
        self.masks.clear();
        let base = self.stack.base_device_bounds();
        // The dirty rect is the base pixel clip when it does not cover the
        // whole surface.
        let surface = self
            .stack
            .viewport()
            .bounds()
            .map(Bounds::from_rect)
            .unwrap_or(Bounds::EMPTY);
        let base_mask = if base == surface {
            None
        } else {
            base.to_rect().and_then(|rect| {
                let mut pixmap = Pixmap::new(self.pixmap.width(), self.pixmap.height())?;
                let mut paint = SkiaPaint::default();
                paint.set_color_rgba8(255, 255, 255, 255);
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                Some(Mask::from_pixmap(pixmap.as_ref(), MaskType::Alpha))
            })
        };
        self.masks.push(MaskFrame {
            current: base_mask.clone(),
            limit: base_mask,
        });

        if !opaque {
            if let Some(rect) = base.to_rect() {
                let mut clear = SkiaPaint::default();
                clear.set_color(self.config.clear_color);
                clear.blend_mode = BlendMode::Source;
                clear.anti_alias = false;
                self.pixmap.fill_rect(rect, &clear, Transform::identity(), None);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CanvasError> {
        match self.stack.lifecycle() {
            Lifecycle::Active => {}
            Lifecycle::Interrupted { .. } => return Err(CanvasError::FinishWhileInterrupted),
            _ => return Err(CanvasError::NoFrameInProgress),
        }
        // Frame end executes the remaining deferred batch, then unwinds
        // leftover saves so orphaned layers still composite.
        self.flush_deferred();
        let popped = self.stack.restore_to_count(1);
        for frame in popped {
            self.apply_restored_frame(frame);
        }
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
            let frame = self.masks.last().map(MaskFrame::child).unwrap_or(MaskFrame {
                current: None,
                limit: None,
            });
            self.masks.push(frame);
        }
        depth
    }

    fn restore(&mut self) {
        if let Some(frame) = self.stack.restore() {
            self.apply_restored_frame(frame);
        }
    }

    fn restore_to_count(&mut self, count: usize) {
        let popped = self.stack.restore_to_count(count);
        for frame in popped {
            self.apply_restored_frame(frame);
        }
    }

    fn save_layer(&mut self, bounds: Rect, alpha: u8, blend_mode: BlendMode, flags: SaveFlags) -> usize {
        let spec = LayerSpec { bounds, alpha, blend_mode, flags };
        let before = self.stack.save_count();
        let depth = self.stack.save_layer(spec);
        if depth > before {
            self.push_layer_target(&spec);
        }
        depth
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
        if !self.stack.in_frame() {
            return self.stack.clip_rect(rect, op);
        }
        let non_empty = self.stack.clip_rect(rect, op);
        let shape = self.rect_shape_mask(rect);
        self.combine_clip_mask(shape, op);
        non_empty
    }

    fn clip_path(&mut self, path: &Path, op: RegionOp) -> bool {
        if !self.stack.in_frame() {
            return self.stack.clip_path(path, op);
        }
        let non_empty = self.stack.clip_path(path, op);
        let shape = self.path_shape_mask(path);
        self.combine_clip_mask(shape, op);
        non_empty
    }

    fn clip_region(&mut self, region: &Region, op: RegionOp) -> bool {
        if !self.stack.in_frame() {
            return self.stack.clip_region(region, op);
        }
        let non_empty = self.stack.clip_region(region, op);
        let shape = self.region_shape_mask(region);
        self.combine_clip_mask(shape, op);
        non_empty
    }

    fn draw_color(&mut self, color: Color, mode: BlendMode) -> DrawResult {
        if let Some(result) = self.stack.draw_check(None, 0.0) {
            return result;
        }
        let (ox, oy) = self.current_origin();
        let device = self
            .stack
            .clip_device_bounds()
            .translate(-(ox as f32), -(oy as f32));
        let Some(rect) = device.to_rect() else {
            return DrawResult::NoOp;
        };
        let mut sk = SkiaPaint::default();
        sk.set_color(color);
        sk.blend_mode = mode;
        sk.anti_alias = false;
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        self.pixmap.fill_rect(rect, &sk, Transform::identity(), mask);
        self.mark_dirty();
        DrawResult::Drawn
    }

    fn draw_rect(&mut self, rect: Rect, paint: &Paint) -> DrawResult {
        if let Some(result) = self.stack.draw_check(Some(rect), paint.coverage_pad()) {
            return result;
        }
        let path = PathBuilder::from_rect(rect);
        self.paint_path(&path, paint);
        DrawResult::Drawn
    }

    fn draw_rects(&mut self, rects: &[Rect], paint: &Paint) -> DrawResult {
        let mut bounds = Bounds::EMPTY;
        for rect in rects {
            bounds = bounds.union(&Bounds::from_rect(*rect));
        }
        let Some(aabb) = bounds.to_rect() else {
            return self.noop_if_active();
        };
        if let Some(result) = self.stack.draw_check(Some(aabb), paint.coverage_pad()) {
            return result;
        }
        let mut builder = PathBuilder::new();
        for rect in rects {
            if rect.width() > 0.0 && rect.height() > 0.0 {
                builder.push_rect(*rect);
            }
        }
        match builder.finish() {
            Some(path) => {
                self.paint_path(&path, paint);
                DrawResult::Drawn
            }
            None => DrawResult::NoOp,
        }
    }

    fn draw_round_rect(&mut self, rect: Rect, rx: f32, ry: f32, paint: &Paint) -> DrawResult {
        if rx <= 0.0 || ry <= 0.0 {
            return self.draw_rect(rect, paint);
        }
        if let Some(result) = self.stack.draw_check(Some(rect), paint.coverage_pad()) {
            return result;
        }
        match round_rect_path(rect, rx, ry) {
            Some(path) => {
                self.paint_path(&path, paint);
                DrawResult::Drawn
            }
            None => DrawResult::NoOp,
        }
    }

    fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) -> DrawResult {
        if radius <= 0.0 {
            return self.noop_if_active();
        }
        let Some(bounds) = Rect::from_xywh(cx - radius, cy - radius, radius * 2.0, radius * 2.0) else {
            return self.noop_if_active();
        };
        if let Some(result) = self.stack.draw_check(Some(bounds), paint.coverage_pad()) {
            return result;
        }
        let mut builder = PathBuilder::new();
        builder.push_circle(cx, cy, radius);
        match builder.finish() {
            Some(path) => {
                self.paint_path(&path, paint);
                DrawResult::Drawn
            }
            None => DrawResult::NoOp,
        }
    }

    fn draw_oval(&mut self, oval: Rect, paint: &Paint) -> DrawResult {
        if let Some(result) = self.stack.draw_check(Some(oval), paint.coverage_pad()) {
            return result;
        }
        let mut builder = PathBuilder::new();
        builder.push_oval(oval);
        match builder.finish() {
            Some(path) => {
                self.paint_path(&path, paint);
                DrawResult::Drawn
            }
            None => DrawResult::NoOp,
        }
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
        if let Some(result) = self.stack.draw_check(Some(oval), paint.coverage_pad()) {
            return result;
        }
        match arc_path(oval, start_angle, sweep_angle, use_center) {
            Some(path) => {
                self.paint_path(&path, paint);
                DrawResult::Drawn
            }
            None => DrawResult::NoOp,
        }
    }

    fn draw_path(&mut self, path: &Path, paint: &Paint) -> DrawResult {
        self.draw_path_op(path, paint)
    }

    fn draw_lines(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.len() < 2 {
            return self.noop_if_active();
        }
        let mut builder = PathBuilder::new();
        for pair in points.chunks_exact(2) {
            builder.move_to(pair[0].x, pair[0].y);
            builder.line_to(pair[1].x, pair[1].y);
        }
        let Some(path) = builder.finish() else {
            return self.noop_if_active();
        };
        // Lines are stroke geometry regardless of paint style.
        let line_paint = match paint.style {
            PaintStyle::Stroke(_) => paint.clone(),
            PaintStyle::Fill => Paint {
                style: PaintStyle::Stroke(Default::default()),
                ..paint.clone()
            },
        };
        self.draw_path_op(&path, &line_paint)
    }

    fn draw_points(&mut self, points: &[Point], paint: &Paint) -> DrawResult {
        if points.is_empty() {
            return self.noop_if_active();
        }
        let size = paint.stroke_width().max(1.0);
        let half = size * 0.5;
        let round = matches!(
            paint.style,
            PaintStyle::Stroke(params) if params.line_cap == LineCap::Round
        );
        let mut builder = PathBuilder::new();
        for point in points {
            if round {
                builder.push_circle(point.x, point.y, half);
            } else if let Some(rect) = Rect::from_xywh(point.x - half, point.y - half, size, size) {
                builder.push_rect(rect);
            }
        }
        let Some(path) = builder.finish() else {
            return self.noop_if_active();
        };
        let fill_paint = Paint {
            style: PaintStyle::Fill,
            ..paint.clone()
        };
        self.draw_path_op(&path, &fill_paint)
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, left: f32, top: f32, paint: Option<&Paint>) -> DrawResult {
        let Some(bounds) = Rect::from_xywh(left, top, bitmap.width() as f32, bitmap.height() as f32) else {
            return self.noop_if_active();
        };
        if let Some(result) = self.stack.draw_check(Some(bounds), 0.0) {
            return result;
        }
        let ts = self.device_transform().pre_translate(left, top);
        let pp = pixmap_paint(paint);
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        self.pixmap.draw_pixmap(0, 0, Pixmap::as_ref(bitmap), &pp, ts, mask);
        self.mark_dirty();
        DrawResult::Drawn
    }

    fn draw_bitmap_matrix(&mut self, bitmap: &Bitmap, matrix: Transform, paint: Option<&Paint>) -> DrawResult {
        let Some(local) = Rect::from_xywh(0.0, 0.0, bitmap.width() as f32, bitmap.height() as f32) else {
            return self.noop_if_active();
        };
        let Some(mapped) = map_rect_aabb(local, matrix).to_rect() else {
            return self.noop_if_active();
        };
        if let Some(result) = self.stack.draw_check(Some(mapped), 0.0) {
            return result;
        }
        let ts = self.device_transform().pre_concat(matrix);
        let pp = pixmap_paint(paint);
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        self.pixmap.draw_pixmap(0, 0, Pixmap::as_ref(bitmap), &pp, ts, mask);
        self.mark_dirty();
        DrawResult::Drawn
    }

    fn draw_bitmap_rect(&mut self, bitmap: &Bitmap, src: Rect, dst: Rect, paint: Option<&Paint>) -> DrawResult {
        if src.width() <= 0.0 || src.height() <= 0.0 {
            return self.noop_if_active();
        }
        if let Some(result) = self.stack.draw_check(Some(dst), 0.0) {
            return result;
        }
        let Some(src_int) = IntRect::from_ltrb(
            src.left().floor() as i32,
            src.top().floor() as i32,
            src.right().ceil() as i32,
            src.bottom().ceil() as i32,
        ) else {
            return DrawResult::NoOp;
        };
        let Some(cropped) = bitmap.clone_rect(src_int) else {
            return DrawResult::NoOp;
        };
        let sx = dst.width() / cropped.width() as f32;
        let sy = dst.height() / cropped.height() as f32;
        let ts = self
            .device_transform()
            .pre_translate(dst.left(), dst.top())
            .pre_scale(sx, sy);
        let pp = pixmap_paint(paint);
        let mask = self.masks.last().and_then(|frame| frame.current.as_ref());
        self.pixmap.draw_pixmap(0, 0, cropped.as_ref(), &pp, ts, mask);
        self.mark_dirty();
        DrawResult::Drawn
    }

    fn draw_glyphs(&mut self, run: &GlyphRun, paint: &Paint, mode: DrawOpMode) -> DrawResult {
        if !self.stack.in_frame() {
            warn!("draw_glyphs outside a frame rejected");
            return DrawResult::InvalidState;
        }
        if self.glyphs.is_none() {
            return DrawResult::Unsupported;
        }
        match mode {
            DrawOpMode::Immediate => self.draw_run_gated(run, paint),
            DrawOpMode::Defer => {
                if run.is_empty() {
                    return DrawResult::NoOp;
                }
                if let Some(result) = self.stack.draw_check(Some(run.bounds), paint.coverage_pad()) {
                    return result;
                }
                // Capture the state the op must replay under; no pixels
                // change until a flush or frame end.
                let transform = self.device_transform();
                let mask = self.masks.last().and_then(|frame| frame.current.clone());
                self.deferred.push(DeferredGlyphs {
                    run: run.clone(),
                    paint: paint.clone(),
                    transform,
                    mask,
                });
                DrawResult::Drawn
            }
            DrawOpMode::Flush => {
                self.flush_deferred();
                self.draw_run_gated(run, paint)
            }
        }
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
        self.mark_dirty();
        DrawResult::Drawn
    }
}

// ----------------------------------------------------------------------
// Paint and geometry helpers
// ----------------------------------------------------------------------

fn resolve_paint(paint: &Paint) -> SkiaPaint<'static> {
    let mut sk = SkiaPaint::default();
    sk.anti_alias = paint.anti_alias();
    sk.blend_mode = paint.blend_mode;
    let color = match &paint.color_filter {
        Some(filter) => filter.apply(paint.color),
        None => paint.color,
    };
    match &paint.shader {
        Some(ShaderSpec::LinearGradient { start, end, stops, spread }) => {
            match LinearGradient::new(*start, *end, stops.clone(), *spread, Transform::identity()) {
                Some(shader) => sk.shader = shader,
                None => sk.set_color(color),
            }
        }
        Some(ShaderSpec::RadialGradient { center, radius, stops, spread }) => {
            match RadialGradient::new(*center, *center, *radius, stops.clone(), *spread, Transform::identity()) {
                Some(shader) => sk.shader = shader,
                None => sk.set_color(color),
            }
        }
        None => sk.set_color(color),
    }
    sk
}

fn pixmap_paint(paint: Option<&Paint>) -> PixmapPaint {
    let mut pp = PixmapPaint::default();
    if let Some(paint) = paint {
        pp.opacity = paint.color.alpha();
        pp.blend_mode = paint.blend_mode;
        pp.quality = if paint.flags.contains(PaintFlags::FILTER_BITMAP) {
            FilterQuality::Bilinear
        } else {
            FilterQuality::Nearest
        };
    }
    pp
}

fn round_rect_path(rect: Rect, rx: f32, ry: f32) -> Option<Path> {
    let rx = rx.min(rect.width() * 0.5);
    let ry = ry.min(rect.height() * 0.5);
    let (l, t, r, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);

    let mut pb = PathBuilder::new();
    pb.move_to(l + rx, t);
    pb.line_to(r - rx, t);
    pb.cubic_to(r - rx + kx, t, r, t + ry - ky, r, t + ry);
    pb.line_to(r, b - ry);
    pb.cubic_to(r, b - ry + ky, r - rx + kx, b, r - rx, b);
    pb.line_to(l + rx, b);
    pb.cubic_to(l + rx - kx, b, l, b - ry + ky, l, b - ry);
    pb.line_to(l, t + ry);
    pb.cubic_to(l, t + ry - ky, l + rx - kx, t, l + rx, t);
    pb.close();
    pb.finish()
}

/// Arc along `oval` from `start` sweeping `sweep` degrees, split into
/// cubic segments of at most a quarter turn.
fn arc_path(oval: Rect, start: f32, sweep: f32, use_center: bool) -> Option<Path> {
    let cx = (oval.left() + oval.right()) * 0.5;
    let cy = (oval.top() + oval.bottom()) * 0.5;
    let rx = oval.width() * 0.5;
    let ry = oval.height() * 0.5;
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    let sweep = sweep.clamp(-360.0, 360.0);

    let point_at = |deg: f32| {
        let rad = deg.to_radians();
        (cx + rx * rad.cos(), cy + ry * rad.sin())
    };

    let segments = (sweep.abs() / 90.0).ceil().max(1.0) as u32;
    let step = sweep / segments as f32;

    let mut pb = PathBuilder::new();
    let (sx, sy) = point_at(start);
    if use_center {
        pb.move_to(cx, cy);
        pb.line_to(sx, sy);
    } else {
        pb.move_to(sx, sy);
    }

    let mut angle = start;
    for _ in 0..segments {
        let next = angle + step;
        let rad0 = angle.to_radians();
        let rad1 = next.to_radians();
        // Control handle length for a cubic approximating this arc span.
        let k = 4.0 / 3.0 * ((rad1 - rad0) / 4.0).tan();

        let (x0, y0) = point_at(angle);
        let (x1, y1) = point_at(next);
        let c0 = (x0 - k * rx * rad0.sin(), y0 + k * ry * rad0.cos());
        let c1 = (x1 + k * rx * rad1.sin(), y1 - k * ry * rad1.cos());
        pb.cubic_to(c0.0, c0.1, c1.0, c1.1, x1, y1);
        angle = next;
    }

    if use_center {
        pb.close();
    }
    pb.finish()
}

// ----------------------------------------------------------------------
// Mask algebra
// ----------------------------------------------------------------------

fn mask_min(into: &mut Mask, other: &Mask) {
    if into.width() != other.width() || into.height() != other.height() {
        return;
    }
    for (dst, src) in into.data_mut().iter_mut().zip(other.data().iter()) {
        let multiplied = (*dst as u16 * *src as u16 + 127) / 255;
        *dst = multiplied as u8;
    }
}

fn mask_max(into: &mut Mask, other: &Mask) {
    if into.width() != other.width() || into.height() != other.height() {
        return;
    }
    for (dst, src) in into.data_mut().iter_mut().zip(other.data().iter()) {
        *dst = (*dst).max(*src);
    }
}

fn mask_subtract(into: &mut Mask, other: &Mask) {
    if into.width() != other.width() || into.height() != other.height() {
        return;
    }
    for (dst, src) in into.data_mut().iter_mut().zip(other.data().iter()) {
        let kept = (*dst as u16 * (255 - *src) as u16 + 127) / 255;
        *dst = kept as u8;
    }
}

fn mask_invert(mask: &mut Mask) {
    for value in mask.data_mut().iter_mut() {
        *value = 255 - *value;
    }
}

fn mask_clear(mask: &mut Mask) {
    for value in mask.data_mut().iter_mut() {
        *value = 0;
    }
}

/// Copies the `origin`/`size` window of `mask` into a new mask. Goes
/// through an alpha pixmap so only `Mask::from_pixmap` is needed to build
/// the result; rows outside the source stay at zero coverage.
fn crop_mask(mask: &Mask, origin_x: u32, origin_y: u32, width: u32, height: u32) -> Option<Mask> {
    if width == 0 || height == 0 || origin_x >= mask.width() || origin_y >= mask.height() {
        return None;
    }
    let mut pixmap = Pixmap::new(width, height)?;
    let copy_w = width.min(mask.width() - origin_x) as usize;
    let copy_h = height.min(mask.height() - origin_y) as usize;
    let src_stride = mask.width() as usize;
    let dst_stride = width as usize * 4;
    let src = mask.data();
    let dst = pixmap.data_mut();
    for row in 0..copy_h {
        let src_idx = (origin_y as usize + row) * src_stride + origin_x as usize;
        let dst_idx = row * dst_stride;
        for col in 0..copy_w {
            dst[dst_idx + col * 4 + 3] = src[src_idx + col];
        }
    }
    Some(Mask::from_pixmap(pixmap.as_ref(), MaskType::Alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::PositionedGlyph;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_xywh(x, y, w, h).unwrap()
    }

    fn ltrb(l: f32, t: f32, r: f32, b: f32) -> Rect {
        Rect::from_ltrb(l, t, r, b).unwrap()
    }

    fn red() -> Paint {
        Paint::fill(Color::from_rgba8(255, 0, 0, 255))
    }

    fn blue() -> Paint {
        Paint::fill(Color::from_rgba8(0, 0, 255, 255))
    }

    fn px(canvas: &RasterCanvas, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let pixel = canvas.pixmap().pixel(x, y).unwrap();
        (pixel.red(), pixel.green(), pixel.blue(), pixel.alpha())
    }

    /// Every glyph is a unit square below the baseline; enough to observe
    /// coverage and paint order without a font stack.
    struct SquareGlyphs;

    impl GlyphSource for SquareGlyphs {
        fn glyph_path(&self, _glyph: u32) -> Option<Path> {
            Some(PathBuilder::from_rect(Rect::from_xywh(0.0, 0.0, 1.0, 1.0)?))
        }
    }

    fn square_run(x: f32, y: f32, size: f32) -> GlyphRun {
        GlyphRun::new(
            vec![PositionedGlyph { id: 1, x, y }],
            size,
            rect(x, y, size, size),
        )
    }

    #[test]
    fn dirty_prepare_clip_draw_scenario() {
        init_logging();
        let mut canvas = RasterCanvas::new(200, 200).unwrap();
        canvas.prepare_dirty(ltrb(0.0, 0.0, 100.0, 100.0), true).unwrap();

        canvas.save(SaveFlags::empty());
        assert!(canvas.clip_rect(ltrb(10.0, 10.0, 50.0, 50.0), RegionOp::Intersect));
        assert_eq!(canvas.clip_bounds(), Some(ltrb(10.0, 10.0, 50.0, 50.0)));

        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());

        canvas.restore();
        assert_eq!(canvas.clip_bounds(), Some(ltrb(0.0, 0.0, 100.0, 100.0)));
        canvas.finish().unwrap();

        // Only the clipped sub-rectangle received content.
        assert_eq!(px(&canvas, 30, 30), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 5, 5).3, 0);
        assert_eq!(px(&canvas, 60, 60).3, 0);
        assert_eq!(px(&canvas, 150, 150).3, 0);
    }

    #[test]
    fn dirty_rect_bounds_all_drawing() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare_dirty(rect(20.0, 20.0, 30.0, 30.0), false).unwrap();
        let _ = canvas.draw_color(Color::from_rgba8(255, 0, 0, 255), BlendMode::SourceOver);
        canvas.finish().unwrap();
        assert_eq!(px(&canvas, 25, 25), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 10, 10).3, 0);
        assert_eq!(px(&canvas, 60, 60).3, 0);
    }

    #[test]
    fn transform_moves_drawn_geometry() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        canvas.translate(50.0, 50.0);
        assert!(canvas.draw_rect(rect(0.0, 0.0, 10.0, 10.0), &red()).is_drawn());
        canvas.finish().unwrap();
        assert_eq!(px(&canvas, 55, 55), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 5, 5).3, 0);
    }

    #[test]
    fn transparent_layer_with_no_draws_is_a_true_noop() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        let before = canvas.pixmap().data().to_vec();

        // Alpha 0, nothing drawn inside.
        canvas.save_layer_alpha(rect(0.0, 0.0, 100.0, 100.0), 0, SaveFlags::empty());
        canvas.restore();
        assert_eq!(canvas.pixmap().data(), &before[..]);

        // Alpha 0, content drawn inside; still a no-op on the parent.
        canvas.save_layer_alpha(rect(0.0, 0.0, 100.0, 100.0), 0, SaveFlags::empty());
        let _ = canvas.draw_rect(rect(10.0, 10.0, 30.0, 30.0), &blue());
        canvas.restore();
        assert_eq!(canvas.pixmap().data(), &before[..]);

        // Untouched opaque layer composites nothing either.
        canvas.save_layer_alpha(rect(0.0, 0.0, 100.0, 100.0), 255, SaveFlags::empty());
        canvas.restore();
        assert_eq!(canvas.pixmap().data(), &before[..]);
        canvas.finish().unwrap();
    }

    #[test]
    fn layer_alpha_captured_at_creation_composites_translucently() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        let white = Paint::fill(Color::WHITE);
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &white).is_drawn());

        canvas.save_layer_alpha(rect(0.0, 0.0, 100.0, 100.0), 128, SaveFlags::empty());
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        canvas.restore();
        canvas.finish().unwrap();

        // Half-strength red over white.
        let (r, g, b, a) = px(&canvas, 50, 50);
        assert_eq!((r, a), (255, 255));
        assert!((120..=135).contains(&g), "green {g}");
        assert!((120..=135).contains(&b), "blue {b}");
    }

    #[test]
    fn bounded_layer_clips_its_content() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        canvas.save_layer(rect(10.0, 10.0, 20.0, 20.0), 255, BlendMode::SourceOver, SaveFlags::CLIP_TO_LAYER);
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        canvas.restore();
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 15, 15), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 5, 5).3, 0);
        assert_eq!(px(&canvas, 35, 35).3, 0);
    }

    #[test]
    fn finish_unwinds_outstanding_layers() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        canvas.save(SaveFlags::empty());
        canvas.save_layer_alpha(rect(0.0, 0.0, 100.0, 100.0), 255, SaveFlags::empty());
        assert!(canvas.draw_rect(rect(10.0, 10.0, 10.0, 10.0), &red()).is_drawn());
        // No restores; finish must composite the orphaned layer.
        canvas.finish().unwrap();
        assert_eq!(px(&canvas, 15, 15), (255, 0, 0, 255));
        assert_eq!(canvas.save_count(), 1);
    }

    #[test]
    fn union_clip_stays_inside_parent_bound() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        assert!(canvas.clip_rect(rect(0.0, 0.0, 50.0, 50.0), RegionOp::Intersect));
        canvas.save(SaveFlags::empty());
        assert!(canvas.clip_rect(rect(10.0, 10.0, 10.0, 10.0), RegionOp::Intersect));
        assert!(canvas.clip_rect(rect(0.0, 0.0, 100.0, 100.0), RegionOp::Union));
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        canvas.restore();
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 30, 30), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 45, 45), (255, 0, 0, 255));
        // Outside the ancestor bound stays untouched.
        assert_eq!(px(&canvas, 60, 60).3, 0);
        assert_eq!(px(&canvas, 75, 30).3, 0);
    }

    #[test]
    fn path_clip_masks_pixels() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        let mut pb = PathBuilder::new();
        pb.push_circle(50.0, 50.0, 20.0);
        let circle = pb.finish().unwrap();
        assert!(canvas.clip_path(&circle, RegionOp::Intersect));
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 50, 50), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 10, 10).3, 0);
        assert_eq!(px(&canvas, 75, 75).3, 0);
    }

    #[test]
    fn difference_clip_punches_a_hole() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        assert!(canvas.clip_rect(rect(40.0, 40.0, 20.0, 20.0), RegionOp::Difference));
        assert!(canvas.draw_rect(rect(0.0, 0.0, 100.0, 100.0), &red()).is_drawn());
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 50, 50).3, 0);
        assert_eq!(px(&canvas, 10, 10), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 80, 80), (255, 0, 0, 255));
    }

    #[test]
    fn deferred_text_has_no_effect_until_flush_and_keeps_order() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.set_glyph_source(Box::new(SquareGlyphs));
        canvas.prepare(false).unwrap();

        let run = square_run(10.0, 10.0, 20.0);
        assert!(canvas.draw_glyphs(&run, &red(), DrawOpMode::Defer).is_drawn());
        // Recorded, not rasterized.
        assert_eq!(px(&canvas, 15, 15).3, 0);

        // The flushing call executes the deferred batch first, then itself;
        // with an opaque overlap the later blue ends up on top.
        assert!(canvas.draw_glyphs(&run, &blue(), DrawOpMode::Flush).is_drawn());
        assert_eq!(px(&canvas, 15, 15), (0, 0, 255, 255));
        canvas.finish().unwrap();
    }

    #[test]
    fn deferred_text_executes_at_frame_end() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.set_glyph_source(Box::new(SquareGlyphs));
        canvas.prepare(false).unwrap();
        let run = square_run(40.0, 40.0, 10.0);
        assert!(canvas.draw_glyphs(&run, &red(), DrawOpMode::Defer).is_drawn());
        assert_eq!(px(&canvas, 44, 44).3, 0);
        canvas.finish().unwrap();
        assert_eq!(px(&canvas, 44, 44), (255, 0, 0, 255));
    }

    #[test]
    fn deferred_text_replays_with_recorded_state() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.set_glyph_source(Box::new(SquareGlyphs));
        canvas.prepare(false).unwrap();

        canvas.save(SaveFlags::empty());
        canvas.translate(30.0, 30.0);
        assert!(canvas.draw_glyphs(&square_run(0.0, 0.0, 10.0), &red(), DrawOpMode::Defer).is_drawn());
        canvas.restore();

        // Flushed after the translate was restored; the op still lands
        // where it was recorded.
        assert!(canvas.draw_glyphs(&square_run(60.0, 60.0, 10.0), &blue(), DrawOpMode::Flush).is_drawn());
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 33, 33), (255, 0, 0, 255));
        assert_eq!(px(&canvas, 3, 3).3, 0);
        assert_eq!(px(&canvas, 63, 63), (0, 0, 255, 255));
    }

    #[test]
    fn text_without_glyph_source_is_unsupported() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        let run = square_run(10.0, 10.0, 10.0);
        assert_eq!(canvas.draw_glyphs(&run, &red(), DrawOpMode::Immediate), DrawResult::Unsupported);
        assert_eq!(canvas.draw_glyphs(&run, &red(), DrawOpMode::Defer), DrawResult::Unsupported);
        canvas.finish().unwrap();
    }

    #[test]
    fn draws_permitted_inside_interrupt_bracket() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();
        canvas.interrupt().unwrap();
        assert!(canvas.draw_rect(rect(10.0, 10.0, 10.0, 10.0), &red()).is_drawn());
        canvas.resume().unwrap();
        canvas.finish().unwrap();
        assert_eq!(px(&canvas, 15, 15), (255, 0, 0, 255));
    }

    #[test]
    fn bitmap_draws_place_pixels() {
        let mut canvas = RasterCanvas::new(100, 100).unwrap();
        canvas.prepare(false).unwrap();

        let mut source = Pixmap::new(2, 2).unwrap();
        source.fill(Color::from_rgba8(0, 255, 0, 255));
        let bitmap: Bitmap = std::sync::Arc::new(source);

        assert!(canvas.draw_bitmap(&bitmap, 10.0, 10.0, None).is_drawn());
        assert!(canvas
            .draw_bitmap_rect(&bitmap, rect(0.0, 0.0, 2.0, 2.0), rect(50.0, 50.0, 8.0, 8.0), None)
            .is_drawn());
        canvas.finish().unwrap();

        assert_eq!(px(&canvas, 11, 11), (0, 255, 0, 255));
        assert_eq!(px(&canvas, 13, 13).3, 0);
        // Scaled copy covers the 8x8 destination.
        assert_eq!(px(&canvas, 53, 53), (0, 255, 0, 255));
        assert_eq!(px(&canvas, 57, 53), (0, 255, 0, 255));
    }

    #[test]
    fn set_viewport_resizes_between_frames() {
        let mut canvas = RasterCanvas::new(50, 50).unwrap();
        canvas.set_viewport(120, 80);
        assert_eq!(canvas.viewport(), Viewport::new(120, 80));
        canvas.prepare(false).unwrap();
        assert_eq!(canvas.clip_bounds(), Some(rect(0.0, 0.0, 120.0, 80.0)));
        // Mid-frame resizes are refused.
        canvas.set_viewport(10, 10);
        assert_eq!(canvas.viewport(), Viewport::new(120, 80));
        canvas.finish().unwrap();
    }

    #[test]
    fn zero_sized_surface_is_rejected_at_construction() {
        assert!(RasterCanvas::new(0, 10).is_err());
        assert!(RasterCanvas::new(10, 0).is_err());
    }
}
