//! Device-space geometry helpers.
//!
//! `tiny_skia::Rect` is always finite and non-negative in size, which makes it
//! awkward as an accumulator for clip algebra where regions routinely become
//! empty. [`Bounds`] fills that gap: an axis-aligned device-space box with an
//! explicit empty state and the boolean-op building blocks the clip engine
//! needs. [`Region`] is the multi-rect primitive accepted by `clip_region`.

use tiny_skia::{Rect, Transform};

/// Extent used when a transform produces non-finite coordinates. Large enough
/// to contain any practical surface, so the result stays conservative.
const HUGE: f32 = 1.0e9;

/// Axis-aligned box in device space. May be empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl Bounds {
    pub const EMPTY: Self = Self {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    /// Normalizing constructor. Anything degenerate or non-finite collapses
    /// to the canonical empty value.
    pub fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        if left.is_finite() && top.is_finite() && right > left && bottom > top {
            Self { left, top, right, bottom }
        } else {
            Self::EMPTY
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::from_ltrb(rect.left(), rect.top(), rect.right(), rect.bottom())
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn to_rect(&self) -> Option<Rect> {
        if self.is_empty() {
            return None;
        }
        Rect::from_ltrb(self.left, self.top, self.right, self.bottom)
    }

    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        Self::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// True when `other` lies fully inside `self`. The empty box is contained
    /// in everything.
    pub fn contains(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        !self.is_empty() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        Self::from_ltrb(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Outward-rounded integer box, for sizing pixel targets.
    pub fn round_out(&self) -> (i32, i32, i32, i32) {
        if self.is_empty() {
            return (0, 0, 0, 0);
        }
        (
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }

    /// Grows the box by `amount` on every side. No-op on the empty box.
    pub fn outset(&self, amount: f32) -> Self {
        if self.is_empty() || !amount.is_finite() {
            return *self;
        }
        Self::from_ltrb(
            self.left - amount,
            self.top - amount,
            self.right + amount,
            self.bottom + amount,
        )
    }
}

pub(crate) fn transform_point(ts: Transform, x: f32, y: f32) -> (f32, f32) {
    (
        x * ts.sx + y * ts.kx + ts.tx,
        x * ts.ky + y * ts.sy + ts.ty,
    )
}

/// Axis-aligned bounding box of `rect` mapped through `ts`. The result always
/// contains the true mapped shape; non-finite transforms degrade to a huge
/// box rather than an unsound small one.
pub fn map_rect_aabb(rect: Rect, ts: Transform) -> Bounds {
    let (x0, y0) = transform_point(ts, rect.left(), rect.top());
    let (x1, y1) = transform_point(ts, rect.right(), rect.top());
    let (x2, y2) = transform_point(ts, rect.left(), rect.bottom());
    let (x3, y3) = transform_point(ts, rect.right(), rect.bottom());

    let left = x0.min(x1).min(x2).min(x3);
    let top = y0.min(y1).min(y2).min(y3);
    let right = x0.max(x1).max(x2).max(x3);
    let bottom = y0.max(y1).max(y2).max(y3);

    if left.is_finite() && top.is_finite() && right.is_finite() && bottom.is_finite() {
        Bounds::from_ltrb(left, top, right, bottom)
    } else {
        Bounds::from_ltrb(-HUGE, -HUGE, HUGE, HUGE)
    }
}

/// True when `ts` maps axis-aligned rects to axis-aligned rects, so a rect
/// mapped through it is exactly its own bounding box.
pub fn is_axis_aligned(ts: Transform) -> bool {
    ts.kx == 0.0 && ts.ky == 0.0 && ts.sx.is_finite() && ts.sy.is_finite() && ts.tx.is_finite() && ts.ty.is_finite()
}

/// Multi-rect region primitive. Opaque value input to `clip_region`; the
/// clip engine only consumes its rect list and bounding box.
#[derive(Clone, Debug, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self { rects: vec![rect] }
    }

    pub fn push(&mut self, rect: Rect) {
        self.rects.push(rect);
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Bounding box over all member rects.
    pub fn bounds(&self) -> Option<Rect> {
        let mut acc = Bounds::EMPTY;
        for rect in &self.rects {
            acc = acc.union(&Bounds::from_rect(*rect));
        }
        acc.to_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_xywh(x, y, w, h).unwrap()
    }

    #[test]
    fn empty_bounds_absorb_and_identity() {
        let a = Bounds::from_ltrb(10.0, 10.0, 20.0, 20.0);
        assert!(Bounds::EMPTY.is_empty());
        assert!(a.intersect(&Bounds::EMPTY).is_empty());
        assert_eq!(a.union(&Bounds::EMPTY), a);
        assert!(a.contains(&Bounds::EMPTY));
        assert!(!Bounds::EMPTY.contains(&a));
    }

    #[test]
    fn intersect_shrinks_union_grows() {
        let a = Bounds::from_ltrb(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::from_ltrb(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersect(&b), Bounds::from_ltrb(5.0, 5.0, 10.0, 10.0));
        assert_eq!(a.union(&b), Bounds::from_ltrb(0.0, 0.0, 15.0, 15.0));
        assert!(a.union(&b).contains(&a));
        assert!(a.contains(&a.intersect(&b)));
    }

    #[test]
    fn disjoint_boxes_intersect_to_empty() {
        let a = Bounds::from_ltrb(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::from_ltrb(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersect(&b).is_empty());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn aabb_of_rotated_rect_contains_corners() {
        let ts = Transform::from_rotate(45.0);
        let aabb = map_rect_aabb(rect(0.0, 0.0, 10.0, 10.0), ts);
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)] {
            let (mx, my) = transform_point(ts, x, y);
            // Points on the far edges sit on the AABB boundary.
            assert!(mx >= aabb.left() - 1.0e-3 && mx <= aabb.right() + 1.0e-3);
            assert!(my >= aabb.top() - 1.0e-3 && my <= aabb.bottom() + 1.0e-3);
        }
    }

    #[test]
    fn axis_aligned_detection() {
        assert!(is_axis_aligned(Transform::identity()));
        assert!(is_axis_aligned(Transform::from_scale(2.0, -3.0)));
        assert!(!is_axis_aligned(Transform::from_rotate(30.0)));
        assert!(!is_axis_aligned(Transform::from_skew(0.5, 0.0)));
    }

    #[test]
    fn region_bounds_cover_members() {
        let mut region = Region::new();
        assert!(region.bounds().is_none());
        region.push(rect(0.0, 0.0, 10.0, 10.0));
        region.push(rect(40.0, 5.0, 10.0, 10.0));
        let bounds = region.bounds().unwrap();
        assert_eq!(bounds.left(), 0.0);
        assert_eq!(bounds.right(), 50.0);
        assert_eq!(bounds.bottom(), 15.0);
    }
}
