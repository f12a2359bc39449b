// THEORY:
// A `Shaft` approximates the footprint swept by a bounding box as it travels
// from one waypoint to the next. It is a quadrilateral corridor: the bounding
// `Aabb` of both padded boxes, trimmed by two edge lines ("planes") that run
// along either side of the direction of travel.
//
// The edge lines are built from diagonal corners of the two padded boxes. Which
// diagonal depends on the quadrant `b` lies in relative to `a`, so the corridor
// always hugs the correct side of the movement. Both directions of travel
// between the same two waypoints produce the same shaft.

use crate::core_modules::geometry::{Aabb, Vec2};
use crate::core_modules::waypoint::Waypoint;

/// A directed line segment, first point to second point.
pub type Line = [Vec2; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shaft {
    /// Bounding box of both padded waypoints, clipped to the frame.
    pub bounds: Aabb,
    /// The corridor edge that bounds the shaft from the "min" side.
    pub min_plane: Line,
    /// The corridor edge that bounds the shaft from the "max" side.
    pub max_plane: Line,
}

impl Shaft {
    pub fn from_waypoints(a: &Waypoint, b: &Waypoint, max_w: i32, max_h: i32) -> Self {
        let bounds = Aabb::from_waypoints(a, b, max_w, max_h);

        let corner = |w: &Waypoint, sx: i32, sy: i32| {
            Vec2::new(w.x + sx * w.half_width, w.y + sy * w.half_height)
        };

        let (min_plane, max_plane) = match (a.x < b.x, a.y < b.y) {
            // b is right of a, with a larger y.
            (true, true) => (
                [corner(a, -1, 1), corner(b, -1, 1)],
                [corner(a, 1, -1), corner(b, 1, -1)],
            ),
            // b is right of a, with an equal or smaller y.
            (true, false) => (
                [corner(b, -1, -1), corner(a, -1, -1)],
                [corner(b, 1, 1), corner(a, 1, 1)],
            ),
            // b is left of (or level with) a, with a larger y.
            (false, true) => (
                [corner(a, -1, -1), corner(b, -1, -1)],
                [corner(a, 1, 1), corner(b, 1, 1)],
            ),
            // b is left of (or level with) a, with an equal or smaller y.
            (false, false) => (
                [corner(b, -1, 1), corner(a, -1, 1)],
                [corner(b, 1, -1), corner(a, 1, -1)],
            ),
        };

        Self {
            bounds,
            min_plane,
            max_plane,
        }
    }

    /// True when `bucket` overlaps the corridor.
    pub fn intersects(&self, bucket: &Aabb) -> bool {
        if !bucket.intersects(&self.bounds) {
            return false;
        }

        // Wholly outside the min edge.
        if is_left(&self.min_plane, Vec2::new(bucket.max.x, bucket.min.y))
            && is_left(&self.min_plane, Vec2::new(bucket.max.x, bucket.max.y))
        {
            return false;
        }

        // Wholly outside the max edge.
        if !is_left(&self.max_plane, Vec2::new(bucket.min.x, bucket.min.y))
            && !is_left(&self.max_plane, Vec2::new(bucket.min.x, bucket.max.y))
        {
            return false;
        }

        true
    }
}

/// True when `p` lies strictly to the left of `line` (positive 2D cross product).
pub fn is_left(line: &Line, p: Vec2) -> bool {
    let [start, end] = *line;
    let cross = i64::from(end.x - start.x) * i64::from(p.y - start.y)
        - i64::from(end.y - start.y) * i64::from(p.x - start.x);

    cross > 0
}
