//! Positioned glyph runs and the glyph outline source.
//!
//! Shaping and layout happen outside this crate. Callers hand the canvas a
//! [`GlyphRun`] with glyph ids already positioned in local coordinates; the
//! only thing a backend ever asks back is the outline of a glyph, through
//! [`GlyphSource`].

use tiny_skia::{Path, Rect};

pub type GlyphId = u32;

/// One glyph at its baseline position, in local (pre-transform) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionedGlyph {
    pub id: GlyphId,
    pub x: f32,
    pub y: f32,
}

/// A positioned run of glyphs. `bounds` is the caller-computed ink box of
/// the whole run in local coordinates, used for trivial clip rejection.
#[derive(Clone, Debug)]
pub struct GlyphRun {
    pub glyphs: Vec<PositionedGlyph>,
    pub font_size: f32,
    pub bounds: Rect,
}

impl GlyphRun {
    pub fn new(glyphs: Vec<PositionedGlyph>, font_size: f32, bounds: Rect) -> Self {
        Self { glyphs, font_size, bounds }
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Narrow interface to the external font stack.
///
/// Outlines are expressed in a unit em box, y-down, origin on the baseline;
/// the backend scales by `GlyphRun::font_size` and translates to the glyph
/// position. Returning `None` means the glyph has no visible outline
/// (whitespace, missing glyph) and is skipped.
pub trait GlyphSource {
    fn glyph_path(&self, glyph: GlyphId) -> Option<Path>;
}
