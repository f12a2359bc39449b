// THEORY:
// Douglas-Peucker path simplification. A visitor standing still for a minute
// produces hundreds of near-identical waypoints; persisting all of them is
// wasteful and makes the summariser build hundreds of zero-length shafts. The
// simplifier keeps only the waypoints that bend the path by more than
// `epsilon` pixels.
//
// It runs once, when an interaction is persisted. Live tracking always sees the
// full path, so simplification can never influence an assignment decision.

use crate::core_modules::waypoint::Waypoint;

/// Reduces `path` to the waypoints that deviate from the chord by more than `epsilon`.
pub fn douglas_peucker(path: &[Waypoint], epsilon: f64) -> Vec<Waypoint> {
    let (first, last) = match path {
        [] | [_] => return path.to_vec(),
        [first, .., last] => (first, last),
    };

    // --- 1. Find the waypoint furthest from the chord ---
    let mut d_max = 0.0;
    let mut i_max = 0;
    for (i, w) in path.iter().enumerate().take(path.len() - 1).skip(1) {
        let d = w.perpendicular_distance(first, last);
        if d > d_max {
            d_max = d;
            i_max = i;
        }
    }

    // --- 2. Collapse or split ---
    if d_max <= epsilon {
        return vec![*first, *last];
    }

    let mut simplified = douglas_peucker(&path[..=i_max], epsilon);
    let tail = douglas_peucker(&path[i_max..], epsilon);
    // The split waypoint ends the head and starts the tail; keep one copy.
    simplified.extend_from_slice(&tail[1..]);
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(x: i32, y: i32) -> Waypoint {
        Waypoint::new(x, y, 0, 0, 0.0)
    }

    #[test]
    fn small_paths_are_unchanged() {
        let a = wp(0, 0);
        let b = wp(0, 2);

        assert_eq!(douglas_peucker(&[a, b], 2.0), vec![a, b]);
        assert_eq!(douglas_peucker(&[a], 2.0), vec![a]);
        assert!(douglas_peucker(&[], 2.0).is_empty());
    }

    #[test]
    fn waypoints_within_epsilon_are_removed() {
        let a = wp(0, 0);
        let b = wp(2, 1);
        let c = wp(2, 2);
        let d = wp(0, 4);

        assert_eq!(douglas_peucker(&[a, b, d], 3.0), vec![a, d]);
        assert_eq!(douglas_peucker(&[a, b, d], 1.0), vec![a, b, d]);
        assert_eq!(douglas_peucker(&[a, b, c, d], 1.9), vec![a, b, d]);
    }

    #[test]
    fn closed_loop_keeps_its_far_point() {
        let a = wp(0, 0);
        let b = wp(10, 0);
        let c = wp(0, 0);

        assert_eq!(douglas_peucker(&[a, b, c], 1.0), vec![a, b, c]);
    }

    #[test]
    fn straight_line_collapses_to_endpoints() {
        let path: Vec<Waypoint> = (0..50).map(|i| wp(i * 4, i * 2)).collect();

        let simplified = douglas_peucker(&path, 0.5);
        assert_eq!(simplified, vec![path[0], path[49]]);
    }
}
