// THEORY:
// The `geometry` module provides the integer pixel primitives used by the spatial
// summariser: a 2D vector and an axis-aligned bounding box. Bucket cells, padded
// waypoint boxes and the bounds of a travel shaft are all `Aabb`s, so the
// overlap test here is the first filter every bucket goes through.

use crate::core_modules::waypoint::Waypoint;
use serde::{Deserialize, Serialize};

/// A 2D integer vector or point, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean length of the vector.
    pub fn length(&self) -> f64 {
        let x = f64::from(self.x);
        let y = f64::from(self.y);
        (x * x + y * y).sqrt()
    }
}

/// Axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aabb {
    /// The minimum extents of the bounding box.
    pub min: Vec2,
    /// The maximum extents of the bounding box.
    pub max: Vec2,
}

impl Aabb {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// The box covering grid cell `(i, j)` for cells of `i_width` by `j_width` pixels.
    pub fn from_index(i: i32, j: i32, i_width: i32, j_width: i32) -> Self {
        let min = Vec2::new(i * i_width, j * j_width);
        Self::new(min, Vec2::new(min.x + i_width, min.y + j_width))
    }

    /// The padded box of a single waypoint, clipped to the frame.
    pub fn from_waypoint(a: &Waypoint, max_w: i32, max_h: i32) -> Self {
        Self::new(
            Vec2::new((a.x - a.half_width).max(0), (a.y - a.half_height).max(0)),
            Vec2::new(
                (a.x + a.half_width).min(max_w),
                (a.y + a.half_height).min(max_h),
            ),
        )
    }

    /// The union of two waypoints' padded boxes, clipped to the frame.
    pub fn from_waypoints(a: &Waypoint, b: &Waypoint, max_w: i32, max_h: i32) -> Self {
        let min_x = (a.x - a.half_width).min(b.x - b.half_width).max(0);
        let min_y = (a.y - a.half_height).min(b.y - b.half_height).max(0);
        let max_x = (a.x + a.half_width).max(b.x + b.half_width).min(max_w);
        let max_y = (a.y + a.half_height).max(b.y + b.half_height).min(max_h);

        Self::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y))
    }

    /// True when the two boxes overlap. Touching edges count as overlapping.
    pub fn intersects(&self, other: &Aabb) -> bool {
        other.max.x >= self.min.x
            && other.min.x <= self.max.x
            && other.max.y >= self.min.y
            && other.min.y <= self.max.y
    }
}
