// THEORY:
// The `summariser` is the second half of the scout. The tracking engine writes
// finished interactions to the store and forgets them; the summariser polls the
// store on a fixed period and folds every unprocessed interaction into its
// sensor's `ScoutSummary`.
//
// Key architectural principles:
// 1.  **Sweep Geometry**: Each segment of a path is widened into a `Shaft`, the
//     corridor its bounding box swept while moving. Every bucket the shaft
//     touches is credited with the longest time the visitor could plausibly
//     have spent crossing a single bucket along that segment.
// 2.  **Once Per Interaction**: A bucket is credited at most once per
//     interaction, by the first segment that touches it. A visitor pacing back
//     and forth over the same spot is one visit, not twenty.
// 3.  **Single Flight**: Passes never overlap. The periodic task awaits each
//     pass before the next tick, skips ticks it missed, and an atomic guard turns
//     any concurrent call into a no-op.
// 4.  **Order Of Effects**: For each interaction the summary is written before
//     the interaction is marked processed. A store failure stops the pass;
//     what remains unprocessed is retried on the next tick. A stored summary
//     laid out for a different grid only holds back its own owner's
//     interactions.

use crate::core_modules::shaft::Shaft;
use crate::core_modules::summary::{BucketGrid, ScoutSummary};
use crate::core_modules::waypoint::Waypoint;
use crate::error::StoreError;
use crate::store::{InteractionStore, StoredInteraction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Shortest polling period `Summariser::run` will use.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// The result of one `summarise_unprocessed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was already in flight; nothing was done.
    Skipped,
    /// Every unprocessed interaction was folded in.
    Completed { processed: usize },
    /// The store failed part way; `processed` interactions were folded in first.
    Aborted { processed: usize },
}

/// The longest time, in seconds, a visitor moving from `a` to `b` could have spent
/// inside a single bucket of `grid`.
///
/// A bucket's width is projected along the direction of travel and compared to
/// the segment length. Vertical segments project to the bare bucket width.
/// Segments shorter than a bucket keep their full duration.
pub fn max_travel_time(a: &Waypoint, b: &Waypoint, grid: &BucketGrid) -> f32 {
    let dt = b.t - a.t;
    let dx = f64::from(b.x) - f64::from(a.x);
    let dy = f64::from(b.y) - f64::from(a.y);
    let segment_len = (dx * dx + dy * dy).sqrt();

    if segment_len == 0.0 {
        return dt;
    }

    let projected = if dx == 0.0 {
        f64::from(grid.bucket_width())
    } else {
        let slope = dy / dx;
        f64::from(grid.bucket_width()) * (1.0 + slope * slope).sqrt()
    };

    dt * (projected / segment_len).min(1.0) as f32
}

/// Credits every bucket touched by `path` into `summary`, at most once per call.
/// Does not touch `visitor_count`.
pub fn accumulate(
    summary: &mut ScoutSummary,
    path: &[Waypoint],
    grid: &BucketGrid,
) -> Result<(), StoreError> {
    summary.check_shape(grid)?;

    let mut intersected = vec![vec![false; grid.columns]; grid.rows];

    for segment in path.windows(2) {
        let [a, b] = segment else { continue };
        let shaft = Shaft::from_waypoints(a, b, grid.frame_width, grid.frame_height);
        let travel_time = max_travel_time(a, b, grid);

        for (row, credited) in intersected.iter_mut().enumerate() {
            for (col, done) in credited.iter_mut().enumerate() {
                if *done || !shaft.intersects(&grid.bucket_aabb(row, col)) {
                    continue;
                }
                summary.visit_time_buckets[row][col] += travel_time;
                summary.visitor_buckets[row][col] += 1;
                *done = true;
            }
        }
    }

    Ok(())
}

/// Folds stored interactions into per-sensor summaries.
pub struct Summariser {
    store: Arc<dyn InteractionStore>,
    grid: BucketGrid,
    running: AtomicBool,
}

/// Clears the in-flight flag when a pass ends, even by unwinding.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Summariser {
    pub fn new(store: Arc<dyn InteractionStore>, grid: BucketGrid) -> Self {
        Self {
            store,
            grid,
            running: AtomicBool::new(false),
        }
    }

    pub fn grid(&self) -> &BucketGrid {
        &self.grid
    }

    /// Runs one pass over every unprocessed interaction in the store.
    pub fn summarise_unprocessed(&self) -> PassOutcome {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("summarise pass already in flight, skipping");
            return PassOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.running);

        let pending = match self.store.unprocessed_interactions() {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "unable to fetch unprocessed interactions");
                return PassOutcome::Aborted { processed: 0 };
            }
        };

        let mut processed = 0;
        for stored in &pending {
            match self.summarise_one(stored) {
                Ok(()) => processed += 1,
                Err(e @ StoreError::GridMismatch { .. }) => {
                    warn!(
                        id = stored.id,
                        owner = %stored.interaction.owner_id,
                        error = %e,
                        "stored summary does not fit the grid, leaving interaction unprocessed"
                    );
                }
                Err(e) => {
                    error!(id = stored.id, error = %e, "summarise pass aborted");
                    return PassOutcome::Aborted { processed };
                }
            }
        }

        if processed > 0 {
            debug!(processed, "summarise pass complete");
        }
        PassOutcome::Completed { processed }
    }

    fn summarise_one(&self, stored: &StoredInteraction) -> Result<(), StoreError> {
        let owner_id = stored.interaction.owner_id;
        let mut summary = self
            .store
            .summary(owner_id)?
            .unwrap_or_else(|| ScoutSummary::for_grid(owner_id, &self.grid));

        summary.visitor_count += 1;
        accumulate(&mut summary, &stored.interaction.path, &self.grid)?;

        self.store.update_summary(&summary)?;
        self.store.mark_processed(stored.id)?;
        trace!(id = stored.id, owner = %owner_id, "interaction summarised");
        Ok(())
    }

    /// Polls the store every `period` until `shutdown` turns true (or its sender is
    /// dropped), then runs one last pass so nothing persisted before shutdown is missed.
    ///
    /// Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let period = period.max(MIN_PERIOD);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "summariser started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Arc::clone(&self).pass().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        Arc::clone(&self).pass().await;
        info!("summariser stopped");
    }

    /// Runs one pass on the blocking pool and waits for it.
    async fn pass(self: Arc<Self>) {
        match tokio::task::spawn_blocking(move || self.summarise_unprocessed()).await {
            Ok(outcome) => trace!(?outcome, "summarise tick"),
            Err(e) => error!(error = %e, "summarise pass panicked"),
        }
    }
}
