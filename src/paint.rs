//! Style descriptor for draw operations.
//!
//! A [`Paint`] captures everything about *how* geometry is rendered: fill or
//! stroke, color, blend mode, optional shader, color filter and drop shadow,
//! plus paint flag bits. Paints are plain values; a backend reads a paint at
//! call time and captured copies (layers, recorded commands) are immune to
//! later mutation of the original.

use tiny_skia::{BlendMode, Color, FillRule, GradientStop, LineCap, LineJoin, Point, SpreadMode};

bitflags::bitflags! {
    /// Paint flag bits. `DITHER` is accepted for compatibility and has no
    /// effect on the software rasterizer.
    pub struct PaintFlags: u32 {
        const ANTI_ALIAS = 0x01;
        const DITHER = 0x04;
        const FILTER_BITMAP = 0x02;
    }
}

impl Default for PaintFlags {
    fn default() -> Self {
        Self::ANTI_ALIAS
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeParams {
    pub width: f32,
    pub miter_limit: f32,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
}

impl Default for StrokeParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            miter_limit: 4.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaintStyle {
    Fill,
    Stroke(StrokeParams),
}

/// Gradient shaders resolvable by any backend. Stored as plain data so
/// recorded commands can carry them.
#[derive(Clone, Debug)]
pub enum ShaderSpec {
    LinearGradient {
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
        spread: SpreadMode,
    },
    RadialGradient {
        center: Point,
        radius: f32,
        stops: Vec<GradientStop>,
        spread: SpreadMode,
    },
}

/// Color filter applied to the source color before blending.
#[derive(Clone, Copy, Debug)]
pub enum ColorFilter {
    /// Componentwise multiply with the given color.
    Multiply(Color),
}

impl ColorFilter {
    pub fn apply(&self, color: Color) -> Color {
        match self {
            Self::Multiply(by) => Color::from_rgba(
                color.red() * by.red(),
                color.green() * by.green(),
                color.blue() * by.blue(),
                color.alpha() * by.alpha(),
            )
            .unwrap_or(color),
        }
    }
}

/// Drop shadow parameters. The software rasterizer renders the shadow as an
/// offset silhouette; `radius` is kept for backends that can blur.
#[derive(Clone, Copy, Debug)]
pub struct DropShadow {
    pub radius: f32,
    pub dx: f32,
    pub dy: f32,
    pub color: Color,
}

#[derive(Clone, Debug)]
pub struct Paint {
    pub color: Color,
    pub style: PaintStyle,
    pub blend_mode: BlendMode,
    pub fill_rule: FillRule,
    pub flags: PaintFlags,
    pub shader: Option<ShaderSpec>,
    pub color_filter: Option<ColorFilter>,
    pub shadow: Option<DropShadow>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            style: PaintStyle::Fill,
            blend_mode: BlendMode::SourceOver,
            fill_rule: FillRule::Winding,
            flags: PaintFlags::default(),
            shader: None,
            color_filter: None,
            shadow: None,
        }
    }
}

impl Paint {
    pub fn fill(color: Color) -> Self {
        Self { color, ..Self::default() }
    }

    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke(StrokeParams { width, ..StrokeParams::default() }),
            ..Self::default()
        }
    }

    /// Source alpha in `0..=255` after the color filter.
    pub fn alpha8(&self) -> u8 {
        let color = match &self.color_filter {
            Some(filter) => filter.apply(self.color),
            None => self.color,
        };
        (color.alpha() * 255.0 + 0.5) as u8
    }

    pub fn stroke_width(&self) -> f32 {
        match self.style {
            PaintStyle::Fill => 0.0,
            PaintStyle::Stroke(params) => params.width,
        }
    }

    pub fn anti_alias(&self) -> bool {
        self.flags.contains(PaintFlags::ANTI_ALIAS)
    }

    /// Local-space outset by which this paint can push coverage past the
    /// raw geometry: stroke reach plus shadow offset and blur. Used for
    /// conservative clip rejection, so it may overestimate.
    pub fn coverage_pad(&self) -> f32 {
        let stroke = self.stroke_width() * 0.5;
        let shadow = match self.shadow {
            Some(shadow) => shadow.dx.abs().max(shadow.dy.abs()) + shadow.radius.max(0.0),
            None => 0.0,
        };
        stroke + shadow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paint_is_opaque_black_fill() {
        let paint = Paint::default();
        assert_eq!(paint.alpha8(), 255);
        assert_eq!(paint.stroke_width(), 0.0);
        assert!(paint.anti_alias());
    }

    #[test]
    fn multiply_filter_scales_channels() {
        let filter = ColorFilter::Multiply(Color::from_rgba(1.0, 0.5, 0.0, 0.5).unwrap());
        let out = filter.apply(Color::from_rgba(1.0, 1.0, 1.0, 1.0).unwrap());
        assert_eq!(out.green(), 0.5);
        assert_eq!(out.blue(), 0.0);
        assert_eq!(out.alpha(), 0.5);

        let paint = Paint {
            color_filter: Some(filter),
            ..Paint::fill(Color::WHITE)
        };
        assert_eq!(paint.alpha8(), 128);
    }

    #[test]
    fn stroke_helper_sets_width() {
        let paint = Paint::stroke(Color::BLACK, 4.0);
        assert_eq!(paint.stroke_width(), 4.0);
    }
}
