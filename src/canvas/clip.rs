//! Per-frame resolved clip tracking.
//!
//! The clip engine tracks, for every frame on the save stack, a device-space
//! bounding box of the resolved clip region together with an exactness flag.
//! Two invariants hold at all times:
//!
//! * the tracked bounds contain the true resolved region, so trivial
//!   rejection against them is always sound;
//! * no operation widens the clip past the parent frame's bounds at the time
//!   the frame was pushed. `Union`, `ReverseDifference` and `Replace` are
//!   clamped to that limit, so the clip can only shrink across the stack.

use tiny_skia::{Path, Rect, Transform};

use crate::canvas::RegionOp;
use crate::geometry::{is_axis_aligned, map_rect_aabb, Bounds, Region};

/// Device-space footprint of a shape handed to a clip operation.
///
/// `exact` means the bounds are the shape: an axis-aligned rect. Paths and
/// rotated rects only contribute their bounding box and taint exactness.
#[derive(Clone, Copy, Debug)]
pub struct ClipShape {
    pub bounds: Bounds,
    pub exact: bool,
}

impl ClipShape {
    pub fn from_rect(rect: Rect, ts: Transform) -> Self {
        Self {
            bounds: map_rect_aabb(rect, ts),
            exact: is_axis_aligned(ts),
        }
    }

    pub fn from_path(path: &Path, ts: Transform) -> Self {
        Self {
            bounds: map_rect_aabb(path.bounds(), ts),
            exact: false,
        }
    }

    pub fn from_region(region: &Region, ts: Transform) -> Self {
        let mut bounds = Bounds::EMPTY;
        for rect in region.rects() {
            bounds = bounds.union(&map_rect_aabb(*rect, ts));
        }
        Self {
            bounds,
            exact: region.rects().len() == 1 && is_axis_aligned(ts),
        }
    }
}

/// Resolved clip of one frame.
#[derive(Clone, Debug)]
pub struct ClipState {
    /// Bounding box of the resolved region; contains the true region.
    bounds: Bounds,
    /// Bounds equal the region exactly (the region is that rect).
    exact: bool,
    /// Parent frame's bounds at push time; the widening clamp.
    limit: Bounds,
    limit_exact: bool,
}

impl ClipState {
    /// Base-frame clip: the full surface, or the dirty rect of a partial
    /// prepare.
    pub fn base(bounds: Bounds) -> Self {
        Self {
            bounds,
            exact: true,
            limit: bounds,
            limit_exact: true,
        }
    }

    /// Clip for a newly pushed frame. Copies the parent state and pins the
    /// widening limit to the parent's current bounds.
    pub fn child(&self) -> Self {
        Self {
            bounds: self.bounds,
            exact: self.exact,
            limit: self.bounds,
            limit_exact: self.exact,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Combines `shape` into the clip. Returns whether the resulting clip
    /// is non-empty.
    pub fn apply(&mut self, shape: ClipShape, op: RegionOp) -> bool {
        match op {
            RegionOp::Intersect => {
                self.bounds = self.bounds.intersect(&shape.bounds);
                self.exact = self.exact && shape.exact;
            }
            RegionOp::Union => {
                if self.exact && self.bounds.contains(&shape.bounds) {
                    // Nothing new; keeps exactness.
                } else if self.bounds.is_empty() {
                    self.bounds = shape.bounds.intersect(&self.limit);
                    self.exact = shape.exact && self.limit_exact;
                } else {
                    self.bounds = self.bounds.union(&shape.bounds).intersect(&self.limit);
                    self.exact = false;
                }
            }
            RegionOp::Difference => self.difference(shape),
            RegionOp::ReverseDifference => {
                if self.bounds.is_empty() {
                    self.bounds = shape.bounds.intersect(&self.limit);
                    self.exact = shape.exact && self.limit_exact;
                } else {
                    self.bounds = shape.bounds.intersect(&self.limit);
                    self.exact = false;
                }
            }
            RegionOp::Replace => {
                self.bounds = shape.bounds.intersect(&self.limit);
                self.exact = shape.exact && self.limit_exact;
            }
        }
        if self.bounds.is_empty() {
            // Canonical empty is exact.
            self.bounds = Bounds::EMPTY;
            self.exact = true;
        }
        !self.bounds.is_empty()
    }

    /// Subtracts `shape`. Only an exact shape can prove emptiness or trim a
    /// full-width/full-height slab; everything else leaves the bounds
    /// untouched and taints exactness.
    fn difference(&mut self, shape: ClipShape) {
        if !shape.bounds.intersects(&self.bounds) {
            return;
        }
        if !shape.exact {
            self.exact = false;
            return;
        }
        if shape.bounds.contains(&self.bounds) {
            self.bounds = Bounds::EMPTY;
            self.exact = true;
            return;
        }
        if !self.exact {
            return;
        }

        let b = self.bounds;
        let s = shape.bounds;
        let full_width = s.left() <= b.left() && s.right() >= b.right();
        let full_height = s.top() <= b.top() && s.bottom() >= b.bottom();
        if full_width && s.top() <= b.top() {
            self.bounds = Bounds::from_ltrb(b.left(), s.bottom().max(b.top()), b.right(), b.bottom());
        } else if full_width && s.bottom() >= b.bottom() {
            self.bounds = Bounds::from_ltrb(b.left(), b.top(), b.right(), s.top().min(b.bottom()));
        } else if full_height && s.left() <= b.left() {
            self.bounds = Bounds::from_ltrb(s.right().max(b.left()), b.top(), b.right(), b.bottom());
        } else if full_height && s.right() >= b.right() {
            self.bounds = Bounds::from_ltrb(b.left(), b.top(), s.left().min(b.right()), b.bottom());
        } else {
            // Cuts a hole or a middle band; the region is no longer a rect.
            self.exact = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_xywh(x, y, w, h).unwrap()
    }

    fn exact_shape(x: f32, y: f32, w: f32, h: f32) -> ClipShape {
        ClipShape::from_rect(rect(x, y, w, h), Transform::identity())
    }

    fn base_0_100() -> ClipState {
        ClipState::base(Bounds::from_ltrb(0.0, 0.0, 100.0, 100.0))
    }

    #[test]
    fn intersect_monotonically_shrinks() {
        let mut clip = base_0_100();
        let before = clip.bounds();
        assert!(clip.apply(exact_shape(10.0, 10.0, 50.0, 50.0), RegionOp::Intersect));
        assert!(before.contains(&clip.bounds()));
        assert_eq!(clip.bounds(), Bounds::from_ltrb(10.0, 10.0, 60.0, 60.0));
        assert!(clip.is_exact());
    }

    #[test]
    fn disjoint_intersect_empties_clip() {
        let mut clip = base_0_100();
        assert!(!clip.apply(exact_shape(200.0, 200.0, 10.0, 10.0), RegionOp::Intersect));
        assert!(clip.is_empty());
    }

    #[test]
    fn union_cannot_widen_past_parent_limit() {
        let parent = base_0_100();
        let mut clip = parent.child();
        assert!(clip.apply(exact_shape(10.0, 10.0, 20.0, 20.0), RegionOp::Intersect));
        assert!(clip.apply(exact_shape(-50.0, -50.0, 400.0, 400.0), RegionOp::Union));
        // Clamped to the parent's 0..100 box.
        assert!(parent.bounds().contains(&clip.bounds()));
    }

    #[test]
    fn replace_is_clamped_to_limit() {
        let mut clip = base_0_100().child();
        assert!(clip.apply(exact_shape(-50.0, -50.0, 75.0, 75.0), RegionOp::Replace));
        assert_eq!(clip.bounds(), Bounds::from_ltrb(0.0, 0.0, 25.0, 25.0));
        assert!(clip.is_exact());
    }

    #[test]
    fn difference_covering_everything_empties() {
        let mut clip = base_0_100();
        assert!(!clip.apply(exact_shape(-10.0, -10.0, 200.0, 200.0), RegionOp::Difference));
        assert!(clip.is_empty());
    }

    #[test]
    fn difference_trims_a_top_slab() {
        let mut clip = base_0_100();
        assert!(clip.apply(exact_shape(-10.0, -10.0, 200.0, 40.0), RegionOp::Difference));
        assert_eq!(clip.bounds(), Bounds::from_ltrb(0.0, 30.0, 100.0, 100.0));
        assert!(clip.is_exact());
    }

    #[test]
    fn difference_hole_keeps_bounds_taints_exactness() {
        let mut clip = base_0_100();
        assert!(clip.apply(exact_shape(40.0, 40.0, 20.0, 20.0), RegionOp::Difference));
        assert_eq!(clip.bounds(), Bounds::from_ltrb(0.0, 0.0, 100.0, 100.0));
        assert!(!clip.is_exact());
    }

    #[test]
    fn rotated_rect_taints_exactness() {
        let mut clip = base_0_100();
        let shape = ClipShape::from_rect(rect(10.0, 10.0, 50.0, 50.0), Transform::from_rotate(30.0));
        assert!(clip.apply(shape, RegionOp::Intersect));
        assert!(!clip.is_exact());
    }

    #[test]
    fn reverse_difference_of_empty_clip_takes_shape() {
        let mut clip = base_0_100();
        assert!(!clip.apply(exact_shape(200.0, 0.0, 10.0, 10.0), RegionOp::Intersect));
        assert!(clip.apply(exact_shape(20.0, 20.0, 30.0, 30.0), RegionOp::ReverseDifference));
        assert_eq!(clip.bounds(), Bounds::from_ltrb(20.0, 20.0, 50.0, 50.0));
    }
}
