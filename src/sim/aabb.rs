//! Axis-aligned bounding boxes
//!
//! Every collision shape in the game is an AABB in screen space:
//! - x grows to the right, y grows downward
//! - `min` is the top-left corner, `max` the bottom-right
//! - intersection is inclusive, so touching edges count as overlap

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Integer grid cell coordinate
pub type CellKey = (i32, i32);

/// An axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Build from a top-left position and a size
    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self {
            min: pos,
            max: pos + size,
        }
    }

    #[inline]
    pub fn left(&self) -> f32 {
        self.min.x
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.max.x
    }

    #[inline]
    pub fn top(&self) -> f32 {
        self.min.y
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.max.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Inclusive overlap test
    pub fn intersects(&self, other: &Aabb) -> bool {
        !(self.right() < other.left()
            || self.left() > other.right()
            || self.bottom() < other.top()
            || self.top() > other.bottom())
    }

    /// Inclusive point containment
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// True when `other` lies completely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
    }

    /// Grow the box by `amount` on every side
    pub fn inflate(&self, amount: f32) -> Aabb {
        Aabb {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// Slab-method segment test.
    ///
    /// Returns the entry parameter `t` in `[0, 1]` along `start -> end`, or
    /// `None` when the segment misses the box. A segment starting inside the
    /// box reports `t = 0`.
    pub fn segment_entry(&self, start: Vec2, end: Vec2) -> Option<f32> {
        let d = end - start;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;

        for axis in 0..2 {
            let (origin, delta, lo, hi) = if axis == 0 {
                (start.x, d.x, self.min.x, self.max.x)
            } else {
                (start.y, d.y, self.min.y, self.max.y)
            };

            if delta.abs() < f32::EPSILON {
                // Parallel to this slab: must already be inside it
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / delta;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// True when the segment touches the box anywhere
    pub fn intersects_segment(&self, start: Vec2, end: Vec2) -> bool {
        self.segment_entry(start, end).is_some()
    }

    /// Range of grid cells overlapped by this box, inclusive on both ends
    pub fn cell_range(&self, cell_size: f32) -> (CellKey, CellKey) {
        let start = cell_of(self.min, cell_size);
        let end = cell_of(self.max, cell_size);
        (start, end)
    }
}

/// Quantize a point to its grid cell
#[inline]
pub fn cell_of(p: Vec2, cell_size: f32) -> CellKey {
    (
        (p.x / cell_size).floor() as i32,
        (p.y / cell_size).floor() as i32,
    )
}
