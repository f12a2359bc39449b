//! End to end: a recorded session replayed through the monitor, summarised, and
//! rendered.

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use scout_tracker::core_modules::heatmap;
use scout_tracker::{
    Command, InteractionStore, MemoryStore, Monitor, PassOutcome, ReplaySource, ScoutConfig,
    ScoutSummary, Summariser,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A visitor walking left to right along the top of the frame for two seconds,
/// a one-frame flicker in the far corner, then two seconds of empty frames.
fn recording() -> String {
    let mut lines = Vec::new();
    for i in 0..=40 {
        let t = f64::from(i) * 0.1;
        let mut detections = Vec::new();
        if i == 5 {
            detections.push(r#"{"x": 1500, "y": 900, "half_width": 10, "half_height": 10}"#.to_string());
        }
        if i <= 20 {
            detections.push(format!(
                r#"{{"x": {}, "y": 27, "half_width": 10, "half_height": 10}}"#,
                48 + i * 24
            ));
        }
        lines.push(format!(r#"{{"t": {t:.1}, "detections": [{}]}}"#, detections.join(", ")));
    }
    lines.join("\n")
}

#[tokio::test]
async fn recorded_walk_becomes_one_summarised_visit() {
    let owner = Uuid::new_v4();
    let config = ScoutConfig {
        owner_id: owner,
        ..ScoutConfig::default()
    };
    let store = Arc::new(MemoryStore::new());

    let source = ReplaySource::from_reader(Cursor::new(recording()))
        .starting_at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 7, 40).unwrap());
    let monitor = Monitor::spawn(source, &config, store.clone()).unwrap();
    let mut status = monitor.subscribe();

    monitor.send(Command::Calibrate);
    monitor.send(Command::StartMeasure);
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.sessions_completed == 1),
    )
    .await
    .unwrap()
    .unwrap();
    let final_status = monitor.shutdown().unwrap();
    assert_eq!(final_status.frames_processed, 41);

    // The flicker was too short to keep; the walk survived expiry.
    let stored = store.interactions();
    assert_eq!(stored.len(), 1);
    let walk = &stored[0].interaction;
    assert_eq!(walk.owner_id, owner);
    assert_eq!(
        walk.entered_at,
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap()
    );
    assert_relative_eq!(walk.duration, 2.0);
    assert_eq!(walk.path.len(), 2);
    assert_eq!((walk.path[0].x, walk.path[1].x), (48, 528));

    // --- Summarise ---
    let summariser = Summariser::new(store.clone(), config.summary.grid());
    assert_eq!(
        summariser.summarise_unprocessed(),
        PassOutcome::Completed { processed: 1 }
    );

    let summary: ScoutSummary = store.summary(owner).unwrap().unwrap();
    assert_eq!(summary.visitor_count, 1);
    for col in 0..6 {
        assert_eq!(summary.visitor_buckets[0][col], 1);
        assert_relative_eq!(summary.visit_time_buckets[0][col], 0.4, epsilon = 1e-5);
    }
    let touched: i32 = summary.visitor_buckets.iter().flatten().sum();
    assert_eq!(touched, 6);

    // --- Outputs ---
    let dir = tempfile::tempdir().unwrap();
    store
        .export_summaries(&dir.path().join("summaries.json"))
        .unwrap();
    let grid = config.summary.grid();
    heatmap::save(&summary, &grid, &dir.path().join("heatmap.png")).unwrap();

    let exported: Vec<ScoutSummary> = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("summaries.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(exported, vec![summary]);
}
