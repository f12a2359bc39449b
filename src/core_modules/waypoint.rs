// THEORY:
// The `waypoint` module holds the smallest unit of the tracking layer: a single
// detected box, positioned in pixels and stamped with the time since its owning
// interaction began.
//
// Key architectural principles:
// 1.  **Stateless Data Container**: A `Waypoint` knows nothing about the path it
//     belongs to. The `Interaction` stamps its `t` field when the waypoint is
//     appended; until then `t` is zero.
// 2.  **Cheap Ranking**: `distance_sq` never takes a square root. It is only ever
//     used to compare candidates against each other, so the squared value ranks
//     identically and stays in exact integer arithmetic.
// 3.  **Degenerate Input Is Defined**: `perpendicular_distance` is used by the
//     path simplifier, which can hand it a closed loop (first point == last
//     point). A zero-length line collapses to a point-to-point distance instead
//     of dividing by zero.

use serde::{Deserialize, Serialize};

/// Timing jitter tolerated by [`Waypoint::matches`], in seconds.
pub const TIME_TOLERANCE: f32 = 0.007;

/// A raw detection produced by the perception collaborator for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// x-coordinate of the bounding box centroid in pixels.
    pub x: i32,
    /// y-coordinate of the bounding box centroid in pixels.
    pub y: i32,
    /// Half the width of the bounding box in pixels.
    pub half_width: i32,
    /// Half the height of the bounding box in pixels.
    pub half_height: i32,
}

/// One timestamped sample within an interaction's path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    /// x-coordinate of the waypoint centroid in pixels.
    pub x: i32,
    /// y-coordinate of the waypoint centroid in pixels.
    pub y: i32,
    /// Half the width of the waypoint in pixels.
    pub half_width: i32,
    /// Half the height of the waypoint in pixels.
    pub half_height: i32,
    /// Seconds elapsed since the beginning of the owning interaction.
    pub t: f32,
}

impl Waypoint {
    pub fn new(x: i32, y: i32, half_width: i32, half_height: i32, t: f32) -> Self {
        Self {
            x,
            y,
            half_width,
            half_height,
            t,
        }
    }

    /// Squared distance between the centroids of two waypoints.
    pub fn distance_sq(&self, other: &Waypoint) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);

        dx * dx + dy * dy
    }

    /// Distance from this waypoint to the infinite line through `a` and `b`.
    pub fn perpendicular_distance(&self, a: &Waypoint, b: &Waypoint) -> f64 {
        let (px, py) = (f64::from(self.x), f64::from(self.y));
        let (ax, ay) = (f64::from(a.x), f64::from(a.y));
        let (bx, by) = (f64::from(b.x), f64::from(b.y));

        let dx = bx - ax;
        let dy = by - ay;
        let length_sq = dx * dx + dy * dy;

        if length_sq == 0.0 {
            return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
        }

        let numerator = dy * px - dx * py + bx * ay - by * ax;
        numerator.abs() / length_sq.sqrt()
    }

    /// Positional equality with a small tolerance on `t` to absorb scheduling jitter.
    pub fn matches(&self, other: &Waypoint) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.half_width == other.half_width
            && self.half_height == other.half_height
            && (self.t - other.t).abs() < TIME_TOLERANCE
    }
}

impl From<Detection> for Waypoint {
    fn from(d: Detection) -> Self {
        Waypoint::new(d.x, d.y, d.half_width, d.half_height, 0.0)
    }
}
