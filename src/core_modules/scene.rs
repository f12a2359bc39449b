// THEORY:
// The `scene` module is the tracking engine. It adds memory to a perception
// collaborator that only ever reports the boxes visible right now: each tick it
// associates the new detections with the interactions it already holds, decides
// which visitors have left, and hands finished interactions to the store.
//
// This module solves the "data association problem" without any appearance
// model, using nothing but centroid distance.
//
// Key architectural principles:
// 1.  **Two Regimes**: When at least as many boxes are detected as there are
//     active interactions, the scene is growing (or steady). Every active
//     interaction is extended by its closest nominated box and any box left over
//     becomes a new (or resumed) interaction. When fewer boxes are detected, the
//     scene is shrinking. Active interactions without a box go idle.
// 2.  **Deterministic Matching**: Each detection nominates its nearest active
//     interaction. An interaction nominated by several detections is extended by
//     the closest one; ties go to the earliest detection. Identical input
//     always produces identical assignments.
// 3.  **Idle, Not Gone**: A visitor briefly hidden behind a pillar should not be
//     split into two interactions. Unmatched interactions wait in `idle`, and a
//     new box close to where one was last seen resumes it instead of starting a
//     new interaction.
// 4.  **Expiry Filters Noise**: Idle interactions older than the idle window are
//     removed. Only those that lasted longer than `min_duration` are persisted;
//     the rest are flicker. Closing the scene persists everything that remains,
//     with no such filter.

use crate::config::TrackingConfig;
use crate::core_modules::interaction::Interaction;
use crate::core_modules::waypoint::Waypoint;
use crate::store::InteractionStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// The nearest active interaction for one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nomination {
    /// Index into the active interactions.
    pub interaction: usize,
    /// Squared distance from the detection to that interaction's last waypoint.
    pub distance_sq: i64,
}

/// What a single `Scene::update` did. Used for logging and by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub extended: usize,
    pub created: usize,
    pub resumed: usize,
    pub idled: usize,
    pub dropped: usize,
    pub expired: usize,
    pub persisted: usize,
}

/// For every detection, the nearest active interaction. `None` when nothing is active.
/// Distance ties go to the lowest interaction index.
pub fn nominate(detected: &[Waypoint], active: &[Interaction]) -> Vec<Option<Nomination>> {
    detected
        .iter()
        .map(|d| {
            active
                .iter()
                .enumerate()
                .map(|(interaction, i)| Nomination {
                    interaction,
                    distance_sq: d.distance_sq(i.last_waypoint()),
                })
                .min_by_key(|n| n.distance_sq)
        })
        .collect()
}

/// For every active interaction, the index of the detection that wins it, if any.
/// The closest nominating detection wins; ties go to the lowest detection index.
pub fn resolve_matches(nominations: &[Option<Nomination>], active_len: usize) -> Vec<Option<usize>> {
    let mut best: Vec<Option<(usize, i64)>> = vec![None; active_len];

    for (detection, nomination) in nominations.iter().enumerate() {
        let Some(n) = nomination else { continue };
        let closer = match best[n.interaction] {
            Some((_, d)) => n.distance_sq < d,
            None => true,
        };
        if closer {
            best[n.interaction] = Some((detection, n.distance_sq));
        }
    }

    best.into_iter().map(|b| b.map(|(detection, _)| detection)).collect()
}

/// The tracking state for one sensor over one measurement session.
pub struct Scene {
    owner_id: Uuid,
    config: TrackingConfig,
    store: Arc<dyn InteractionStore>,
    /// Interactions that received a waypoint on the most recent tick (or were just created).
    active: Vec<Interaction>,
    /// Interactions waiting to be resumed or expired. Most recently idled last.
    idle: Vec<Interaction>,
    next_local_id: u32,
}

impl Scene {
    pub fn new(owner_id: Uuid, config: TrackingConfig, store: Arc<dyn InteractionStore>) -> Self {
        Self {
            owner_id,
            config,
            store,
            active: Vec::new(),
            idle: Vec::new(),
            next_local_id: 0,
        }
    }

    /// Feeds the detections of one tick into the scene, then expires stale idle interactions.
    pub fn update(&mut self, detected: &[Waypoint], now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        if detected.len() >= self.active.len() {
            self.add_interactions(detected, now, &mut report);
        } else {
            self.remove_interactions(detected, now, &mut report);
        }
        self.expire_idle(now, &mut report);

        if report != TickReport::default() {
            trace!(?report, active = self.active.len(), idle = self.idle.len(), "scene tick");
        }
        report
    }

    /// Persists every remaining interaction, active first, then idle.
    /// Returns the number the store accepted.
    pub fn close(self) -> usize {
        let total = self.active.len() + self.idle.len();
        let epsilon = self.config.simplify_epsilon;

        let persisted = self
            .active
            .into_iter()
            .chain(self.idle)
            .filter_map(|i| i.persist(self.store.as_ref(), epsilon))
            .count();

        info!(owner = %self.owner_id, total, persisted, "scene closed");
        persisted
    }

    pub fn active(&self) -> &[Interaction] {
        &self.active
    }

    pub fn idle(&self) -> &[Interaction] {
        &self.idle
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Growth regime: at least as many detections as active interactions.
    fn add_interactions(&mut self, detected: &[Waypoint], now: DateTime<Utc>, report: &mut TickReport) {
        // --- 1. Matching ---
        let nominations = nominate(detected, &self.active);
        let winners = resolve_matches(&nominations, self.active.len());

        // --- 2. Extend winners ---
        let mut matched = vec![false; detected.len()];
        for (interaction, winner) in winners.into_iter().enumerate() {
            if let Some(d) = winner {
                self.active[interaction].add_waypoint(detected[d], now);
                matched[d] = true;
                report.extended += 1;
            }
        }

        // --- 3. Resume or create for the rest, in detection order ---
        for (d, w) in detected.iter().enumerate() {
            if matched[d] {
                continue;
            }
            if self.resume_idle(w, now) {
                report.resumed += 1;
            } else {
                self.create(*w, now);
                report.created += 1;
            }
        }
    }

    /// Shrink regime: fewer detections than active interactions.
    fn remove_interactions(&mut self, detected: &[Waypoint], now: DateTime<Utc>, report: &mut TickReport) {
        // --- 1. Matching ---
        let nominations = nominate(detected, &self.active);
        let winners = resolve_matches(&nominations, self.active.len());

        for (d, w) in detected.iter().enumerate() {
            if !winners.contains(&Some(d)) {
                trace!(x = w.x, y = w.y, "dropping detection that lost its match while shrinking");
                report.dropped += 1;
            }
        }

        // --- 2. Extend matched, idle the rest ---
        let mut went_idle = Vec::new();
        let previous = std::mem::take(&mut self.active);
        for (mut interaction, winner) in previous.into_iter().zip(winners) {
            match winner {
                Some(d) => {
                    interaction.add_waypoint(detected[d], now);
                    report.extended += 1;
                    self.active.push(interaction);
                }
                None => went_idle.push(interaction),
            }
        }

        // Higher active indexes go idle first, so resume tries the lower ones first.
        report.idled += went_idle.len();
        self.idle.extend(went_idle.into_iter().rev());
    }

    /// Attaches `w` to the most recently idled interaction it qualifies for.
    /// At most one interaction is resumed per detection.
    fn resume_idle(&mut self, w: &Waypoint, now: DateTime<Utc>) -> bool {
        let resumable = self.idle.iter().rposition(|i| {
            w.distance_sq(i.last_waypoint()) < self.config.resume_sq_distance
                && i.idle_for(now) < self.config.idle_duration
        });

        let Some(k) = resumable else {
            return false;
        };

        let mut interaction = self.idle.remove(k);
        interaction.add_waypoint(*w, now);
        debug!(scene_local_id = interaction.scene_local_id(), "resumed idle interaction");
        self.active.push(interaction);
        true
    }

    fn create(&mut self, w: Waypoint, now: DateTime<Utc>) {
        let interaction = Interaction::new(w, self.owner_id, self.next_local_id, now);
        debug!(scene_local_id = self.next_local_id, x = w.x, y = w.y, "new interaction");
        self.next_local_id += 1;
        self.active.push(interaction);
    }

    /// Removes idle interactions that can no longer be resumed, persisting the ones
    /// that lasted longer than `min_duration`.
    fn expire_idle(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let idle_duration = self.config.idle_duration;
        let (expired, still_idle): (Vec<_>, Vec<_>) = std::mem::take(&mut self.idle)
            .into_iter()
            .partition(|i| i.idle_for(now) >= idle_duration);
        self.idle = still_idle;

        for interaction in expired {
            report.expired += 1;
            if interaction.duration() <= self.config.min_duration {
                trace!(
                    scene_local_id = interaction.scene_local_id(),
                    duration = interaction.duration(),
                    "discarding short interaction"
                );
                continue;
            }
            if interaction
                .persist(self.store.as_ref(), self.config.simplify_epsilon)
                .is_some()
            {
                report.persisted += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::testing::UnavailableStore;
    use chrono::{TimeDelta, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn wp(x: i32, y: i32) -> Waypoint {
        Waypoint::new(x, y, 20, 20, 0.0)
    }

    fn scene() -> (Scene, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scene = Scene::new(Uuid::nil(), TrackingConfig::default(), store.clone());
        (scene, store)
    }

    fn positions(interactions: &[Interaction]) -> Vec<(i32, i32)> {
        interactions
            .iter()
            .map(|i| (i.last_waypoint().x, i.last_waypoint().y))
            .collect()
    }

    #[test]
    fn nominations_pick_the_nearest_interaction() {
        let active = vec![
            Interaction::new(wp(0, 0), Uuid::nil(), 0, at(0)),
            Interaction::new(wp(100, 0), Uuid::nil(), 1, at(0)),
        ];

        let n = nominate(&[wp(90, 0), wp(5, 0)], &active);
        assert_eq!(
            n,
            vec![
                Some(Nomination { interaction: 1, distance_sq: 100 }),
                Some(Nomination { interaction: 0, distance_sq: 25 }),
            ]
        );
        assert_eq!(nominate(&[wp(1, 1)], &[]), vec![None]);
    }

    #[test]
    fn closest_nomination_wins_and_ties_go_to_the_first_detection() {
        let nominations = vec![
            Some(Nomination { interaction: 0, distance_sq: 9 }),
            Some(Nomination { interaction: 0, distance_sq: 4 }),
            Some(Nomination { interaction: 1, distance_sq: 4 }),
            Some(Nomination { interaction: 1, distance_sq: 4 }),
            None,
        ];

        assert_eq!(resolve_matches(&nominations, 3), vec![Some(1), Some(2), None]);
    }

    #[test]
    fn empty_scene_creates_an_interaction_per_detection() {
        let (mut scene, _) = scene();

        let report = scene.update(&[wp(10, 10), wp(500, 500)], at(0));

        assert_eq!(report.created, 2);
        assert_eq!(positions(scene.active()), vec![(10, 10), (500, 500)]);
        let ids: Vec<u32> = scene.active().iter().map(Interaction::scene_local_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn nearby_detection_extends_and_far_detection_creates() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100)], at(0));

        scene.update(&[wp(102, 100), wp(50, 50)], at(100));

        assert_eq!(scene.active().len(), 2);
        assert!(scene.active()[0].path_matches(&[
            Waypoint::new(100, 100, 20, 20, 0.0),
            Waypoint::new(102, 100, 20, 20, 0.1),
        ]));
        assert_eq!(scene.active()[1].path(), &[wp(50, 50)]);
        assert_eq!(scene.active()[1].scene_local_id(), 1);
    }

    #[test]
    fn equidistant_detections_extend_with_the_first() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100)], at(0));

        scene.update(&[wp(102, 100), wp(98, 100)], at(100));

        assert_eq!(positions(scene.active()), vec![(102, 100), (98, 100)]);
        assert_eq!(scene.active()[0].path().len(), 2);
        assert_eq!(scene.active()[1].path().len(), 1);
    }

    #[test]
    fn closer_detection_wins_regardless_of_order() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100)], at(0));

        scene.update(&[wp(110, 100), wp(101, 100)], at(100));

        assert_eq!(positions(scene.active()), vec![(101, 100), (110, 100)]);
    }

    #[test]
    fn shrinking_extends_matched_and_idles_the_rest() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100), wp(300, 300)], at(0));

        let report = scene.update(&[wp(101, 100)], at(100));

        assert_eq!(report.extended, 1);
        assert_eq!(report.idled, 1);
        assert_eq!(positions(scene.active()), vec![(101, 100)]);
        assert_eq!(positions(scene.idle()), vec![(300, 300)]);
    }

    #[test]
    fn shrinking_drops_detections_that_lose_their_match() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100), wp(110, 100), wp(400, 400)], at(0));

        // Both detections nominate interaction 0; the second loses and is not
        // offered to interaction 1.
        let report = scene.update(&[wp(101, 100), wp(102, 100)], at(100));

        assert_eq!(report.extended, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.created, 0);
        assert_eq!(positions(scene.active()), vec![(101, 100)]);
        assert_eq!(positions(scene.idle()), vec![(400, 400), (110, 100)]);
    }

    #[test]
    fn no_detections_idles_everything() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100), wp(300, 300)], at(0));

        scene.update(&[], at(100));

        assert!(scene.active().is_empty());
        assert_eq!(positions(scene.idle()), vec![(300, 300), (100, 100)]);
    }

    #[test]
    fn nearby_detection_resumes_an_idle_interaction() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100)], at(0));
        scene.update(&[], at(100));

        let report = scene.update(&[wp(103, 100)], at(500));

        assert_eq!(report.resumed, 1);
        assert_eq!(report.created, 0);
        assert!(scene.idle().is_empty());
        assert_eq!(scene.active().len(), 1);
        assert_eq!(scene.active()[0].scene_local_id(), 0);
        assert_eq!(scene.active()[0].path().len(), 2);
    }

    #[test]
    fn distant_detection_does_not_resume() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100)], at(0));
        scene.update(&[], at(100));

        scene.update(&[wp(120, 100)], at(500));

        assert_eq!(scene.idle().len(), 1);
        assert_eq!(scene.active()[0].scene_local_id(), 1);
    }

    #[test]
    fn only_one_idle_interaction_is_resumed_per_detection() {
        let (mut scene, _) = scene();
        scene.update(&[wp(100, 100), wp(104, 100)], at(0));
        scene.update(&[], at(100));

        scene.update(&[wp(102, 100)], at(200));

        assert_eq!(scene.active().len(), 1);
        assert_eq!(scene.idle().len(), 1);
        // Idle order is [1, 0]; the most recently idled (0) is tried first.
        assert_eq!(scene.active()[0].scene_local_id(), 0);
        assert_eq!(scene.idle()[0].scene_local_id(), 1);
    }

    #[test]
    fn stale_idle_interaction_is_not_resumed_and_expires() {
        let (mut scene, store) = scene();
        scene.update(&[wp(100, 100)], at(0));
        scene.update(&[], at(100));

        let report = scene.update(&[wp(101, 100)], at(1000));

        assert_eq!(report.resumed, 0);
        assert_eq!(report.created, 1);
        assert_eq!(report.expired, 1);
        // Too short to be worth keeping.
        assert_eq!(report.persisted, 0);
        assert!(scene.idle().is_empty());
        assert!(store.interactions().is_empty());
    }

    #[test]
    fn long_interactions_are_persisted_on_expiry() {
        let (mut scene, store) = scene();
        for (step, ms) in [0, 500, 1000, 1500, 2000].into_iter().enumerate() {
            scene.update(&[wp(100 + step as i32 * 10, 100)], at(ms));
        }
        scene.update(&[], at(2100));
        assert_eq!(scene.idle().len(), 1);

        let report = scene.update(&[], at(2999));
        assert_eq!(report.expired, 0);

        let report = scene.update(&[], at(3000));
        assert_eq!(report.expired, 1);
        assert_eq!(report.persisted, 1);

        let stored = store.interactions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].interaction.scene_local_id, 0);
        assert_eq!(stored[0].interaction.duration, 2.0);
        // Straight line, simplified down to its endpoints.
        assert_eq!(stored[0].interaction.path.len(), 2);
    }

    #[test]
    fn close_persists_everything_regardless_of_duration() {
        let (mut scene, store) = scene();
        scene.update(&[wp(100, 100), wp(300, 300)], at(0));
        scene.update(&[wp(100, 100)], at(100));

        assert_eq!(scene.close(), 2);

        let mut ids: Vec<u32> = store
            .interactions()
            .iter()
            .map(|s| s.interaction.scene_local_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn failing_store_does_not_stop_tracking() {
        let mut scene = Scene::new(
            Uuid::nil(),
            TrackingConfig::default(),
            Arc::new(UnavailableStore),
        );
        for ms in [0, 1000, 2000] {
            scene.update(&[wp(100, 100)], at(ms));
        }
        scene.update(&[], at(2100));

        let report = scene.update(&[], at(3500));

        assert_eq!(report.expired, 1);
        assert_eq!(report.persisted, 0);
        assert!(scene.idle().is_empty());
        assert_eq!(scene.close(), 0);
    }
}
