// THEORY:
// This file is the main entry point for the `scout_tracker` library crate. It
// exposes two engines that only ever meet through the storage collaborator:
//
// - Tracking: a `Monitor` (in `pipeline`) feeds per-frame detections into a
//   `Scene`, which turns them into visitor `Interaction`s and persists them when
//   they end.
// - Summarising: a `Summariser` periodically folds persisted interactions into a
//   per-sensor `ScoutSummary`, a coarse occupancy heatmap of the frame.
//
// The geometry, path simplification and bucket bookkeeping both engines rely on
// live in `core_modules`. The most commonly used types are re-exported here.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod replay;
pub mod store;
pub mod summariser;

pub use config::{ScoutConfig, SummaryConfig, TrackingConfig};
pub use core_modules::interaction::{Interaction, InteractionRecord};
pub use core_modules::scene::Scene;
pub use core_modules::summary::{BucketGrid, ScoutSummary};
pub use core_modules::waypoint::{Detection, Waypoint};
pub use error::{ConfigError, ScoutError, SourceError, StoreError};
pub use pipeline::{Command, DetectionSource, Frame, Monitor, MonitorHandle, MonitorStatus, ScoutState};
pub use replay::ReplaySource;
pub use store::{InteractionStore, MemoryStore, StoredInteraction};
pub use summariser::{PassOutcome, Summariser};
