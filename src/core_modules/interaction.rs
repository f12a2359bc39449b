// THEORY:
// An `Interaction` is the complete record of one visitor's path through the
// scene, from the first detection that could not be matched to anything, until
// the scene gives up on it. It is the unit the scout ultimately reports.
//
// Key architectural principles:
// 1.  **Lifecycle**: open (receiving waypoints) -> idle (unmatched, waiting for a
//     possible resume) -> closed (persisted). The `Scene` owns the transitions;
//     this module only knows how to grow, simplify and persist itself.
// 2.  **Privacy Projection**: The real start time is kept in memory only. What
//     leaves the process is an `InteractionRecord`, whose entry time is rounded
//     to the nearest quarter hour. There is no way to serialize an
//     `Interaction` directly.
// 3.  **Relative Time**: Waypoint `t` values are seconds since the start of the
//     interaction, so a path carries its own timing without revealing when it
//     happened.
// 4.  **Best Effort Persistence**: `persist` consumes the interaction. If the
//     store rejects it, the failure is logged and the record is gone.

use crate::core_modules::simplify::douglas_peucker;
use crate::core_modules::waypoint::Waypoint;
use crate::store::InteractionStore;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

/// Version of the record layout handed to the store.
pub const PROTOCOL_VERSION: &str = "0.1";

/// Entry times are only ever reported rounded to this many minutes.
pub const ENTRY_ROUNDING_MINUTES: i64 = 15;

/// The persisted shape of an interaction. Carries no precise timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// The sensor that observed the interaction.
    pub owner_id: Uuid,
    /// Layout version of this record.
    pub protocol_version: String,
    /// Start of the interaction, rounded to the nearest quarter hour.
    pub entered_at: DateTime<Utc>,
    /// Total duration of the interaction in seconds.
    pub duration: f32,
    /// The (simplified) path of the interaction through the scene.
    pub path: Vec<Waypoint>,
    /// Identifier of the interaction within the scene that produced it.
    pub scene_local_id: u32,
}

/// A single visitor's path through the scene, while it is still owned by a `Scene`.
#[derive(Debug, Clone)]
pub struct Interaction {
    owner_id: Uuid,
    scene_local_id: u32,
    entered_at: DateTime<Utc>,
    /// The actual start time. Never persisted.
    started_at: DateTime<Utc>,
    /// Wall-clock time of the most recent waypoint. Never persisted.
    last_seen_at: DateTime<Utc>,
    duration: f32,
    path: Vec<Waypoint>,
}

impl Interaction {
    /// Starts a new interaction at `now` with `waypoint` as its first sample.
    pub fn new(waypoint: Waypoint, owner_id: Uuid, scene_local_id: u32, now: DateTime<Utc>) -> Self {
        let mut interaction = Self {
            owner_id,
            scene_local_id,
            entered_at: round_to_quarter_hour(now),
            started_at: now,
            last_seen_at: now,
            duration: 0.0,
            path: Vec::new(),
        };
        interaction.add_waypoint(waypoint, now);
        interaction
    }

    /// Appends `w`, stamping it with the seconds elapsed since the interaction started.
    pub fn add_waypoint(&mut self, mut w: Waypoint, now: DateTime<Utc>) {
        // A clock stepping backwards must not make the path go back in time.
        let floor = self.path.last().map_or(0.0, |last| last.t);
        w.t = seconds_between(self.started_at, now).max(floor);

        self.duration = w.t;
        self.last_seen_at = self.last_seen_at.max(now);
        self.path.push(w);
    }

    pub fn last_waypoint(&self) -> &Waypoint {
        // The constructor always pushes the first waypoint.
        &self.path[self.path.len() - 1]
    }

    /// Seconds since the last waypoint was added.
    pub fn idle_for(&self, now: DateTime<Utc>) -> f32 {
        seconds_between(self.last_seen_at, now).max(0.0)
    }

    pub fn path(&self) -> &[Waypoint] {
        &self.path
    }

    /// True when the path matches `waypoints` element by element, within time tolerance.
    pub fn path_matches(&self, waypoints: &[Waypoint]) -> bool {
        self.path.len() == waypoints.len()
            && self.path.iter().zip(waypoints).all(|(a, b)| a.matches(b))
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn scene_local_id(&self) -> u32 {
        self.scene_local_id
    }

    /// Removes path segments that deviate by no more than `epsilon` pixels.
    pub fn simplify(&mut self, epsilon: f64) {
        self.path = douglas_peucker(&self.path, epsilon);
    }

    /// The externally visible projection of this interaction.
    pub fn record(&self) -> InteractionRecord {
        InteractionRecord {
            owner_id: self.owner_id,
            protocol_version: PROTOCOL_VERSION.to_string(),
            entered_at: self.entered_at,
            duration: self.duration,
            path: self.path.clone(),
            scene_local_id: self.scene_local_id,
        }
    }

    /// Simplifies the path and hands the record to `store`. Returns the storage id,
    /// or `None` if the store rejected it (the failure is logged, the record dropped).
    pub fn persist(mut self, store: &dyn InteractionStore, epsilon: f64) -> Option<u64> {
        let raw_len = self.path.len();
        self.simplify(epsilon);

        match store.insert_interaction(&self.record()) {
            Ok(id) => {
                debug!(
                    id,
                    scene_local_id = self.scene_local_id,
                    duration = self.duration,
                    waypoints = self.path.len(),
                    raw_waypoints = raw_len,
                    "persisted interaction"
                );
                Some(id)
            }
            Err(e) => {
                error!(
                    scene_local_id = self.scene_local_id,
                    error = %e,
                    "unable to save interaction, dropping it"
                );
                None
            }
        }
    }
}

/// Rounds `t` to the nearest quarter hour, ties rounding up.
pub fn round_to_quarter_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    // Rounding only fails outside chrono's representable range.
    t.duration_round(TimeDelta::minutes(ENTRY_ROUNDING_MINUTES))
        .unwrap_or(t)
}

/// Signed seconds from `from` to `to`.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f32 {
    (to - from)
        .num_microseconds()
        .map_or(f32::MAX, |us| us as f32 / 1_000_000.0)
}
