//! `scout` binary: replays a recording of detections through the tracker and the
//! summariser, then writes the results.
//!
//! # Usage
//!
//! ```bash
//! scout recording.jsonl --out-dir results
//! scout recording.jsonl --config scout.json --paced --json-logs
//! scout --write-config scout.json
//! ```

use anyhow::{Context, bail};
use clap::Parser;
use scout_tracker::core_modules::heatmap;
use scout_tracker::logger::init_tracing;
use scout_tracker::{
    Command, Monitor, MonitorStatus, ReplaySource, ScoutConfig, MemoryStore, Summariser,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Command-line arguments for the scout runner.
#[derive(Parser, Debug)]
#[command(
    name = "scout",
    version,
    about = "Visitor tracking and occupancy heatmaps from recorded detections",
    long_about = None
)]
struct Args {
    /// JSON-lines recording of detections to replay.
    #[arg(value_name = "FILE")]
    detections: Option<PathBuf>,

    /// Path to the JSON configuration file. Defaults are used if omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that receives interactions.json, summaries.json and heatmaps.
    #[arg(short, long, value_name = "DIR", default_value = "scout_out")]
    out_dir: PathBuf,

    /// Replay at the recorded speed instead of as fast as possible.
    #[arg(long, default_value_t = false)]
    paced: bool,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Write the effective configuration to FILE and exit.
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,
}

fn session_over(status: &MonitorStatus) -> bool {
    status.sessions_completed > 0 || (!status.calibrated && status.last_error.is_some())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match args.config.as_deref() {
        Some(path) => ScoutConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ScoutConfig::default(),
    };
    config.validate()?;

    if let Some(path) = args.write_config.as_deref() {
        config.save(path)?;
        info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    let Some(detections) = args.detections.as_deref() else {
        bail!("no detections file given (see --help)");
    };
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let store = Arc::new(MemoryStore::new());
    let grid = config.summary.grid();

    // --- Summariser ---
    let summariser = Arc::new(Summariser::new(store.clone(), grid));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let summarising = tokio::spawn(summariser.run(config.summary.interval(), shutdown_rx));

    // --- Monitor ---
    let source = ReplaySource::open(detections)?.paced(args.paced);
    let monitor = Monitor::spawn(source, &config, store.clone())?;
    let mut status = monitor.subscribe();

    info!(owner = %config.owner_id, recording = %detections.display(), "measuring");
    monitor.send(Command::Calibrate);
    monitor.send(Command::StartMeasure);

    tokio::select! {
        finished = status.wait_for(session_over) => {
            finished.context("monitor exited unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping measure");
            monitor.send(Command::StopMeasure);
        }
    }

    let final_status = tokio::task::spawn_blocking(move || monitor.shutdown()).await??;
    if let Some(e) = &final_status.last_error {
        warn!(error = %e, "monitor reported an error");
    }

    let _ = shutdown_tx.send(true);
    summarising.await?;

    // --- Results ---
    store.export_interactions(&args.out_dir.join("interactions.json"))?;
    store.export_summaries(&args.out_dir.join("summaries.json"))?;
    for summary in store.summaries() {
        let path = args.out_dir.join(format!("heatmap_{}.png", summary.owner_id));
        heatmap::save(&summary, &grid, &path)?;
    }

    info!(
        frames = final_status.frames_processed,
        interactions = final_status.interactions_persisted,
        out_dir = %args.out_dir.display(),
        "done"
    );
    Ok(())
}
