// THEORY:
// The `pipeline` module is the top-level driver of the tracking half of the
// scout. A `Monitor` owns the perception source and a `Scene`, and runs them on
// one dedicated OS thread, steered by a small command vocabulary:
// calibrate, start measuring, stop measuring.
//
// Key architectural principles:
// 1.  **Exclusive Source**: Camera-like sources are not shareable and often not
//     movable between threads once opened, so the source lives on the monitor
//     thread for its entire life and nothing else touches it.
// 2.  **Never Wait While Measuring**: While idle, the thread sleeps on the
//     command channel. While measuring, it only peeks at the channel once per
//     frame and goes straight back to the source, so a slow operator can never
//     delay frame capture.
// 3.  **Observable State**: The coarse state (`Idle -> Calibrating -> Calibrated
//     -> Measuring -> Idle`) and a few counters are published on a `watch`
//     channel. Observers always see the latest value and never block the
//     monitor.
// 4.  **Sessions Always Close**: However measuring ends (stop command, end of
//     stream, source failure, or everyone hanging up), the scene is closed and
//     every remaining interaction is handed to the store.

use crate::config::{ScoutConfig, TrackingConfig};
use crate::core_modules::scene::Scene;
use crate::core_modules::waypoint::{Detection, Waypoint};
use crate::error::{ScoutError, SourceError};
use crate::store::InteractionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Instructions accepted by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Calibrate,
    StartMeasure,
    StopMeasure,
}

/// The coarse state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoutState {
    Idle,
    Calibrating,
    Calibrated,
    Measuring,
}

/// Everything the monitor publishes about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: ScoutState,
    /// True once a calibration has succeeded. Survives measuring sessions.
    pub calibrated: bool,
    /// Measuring sessions that have ended and been flushed to the store.
    pub sessions_completed: u64,
    /// Frames fed to the scene, over all sessions.
    pub frames_processed: u64,
    /// Interactions handed to the store, over all sessions.
    pub interactions_persisted: u64,
    pub last_error: Option<String>,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            state: ScoutState::Idle,
            calibrated: false,
            sessions_completed: 0,
            frames_processed: 0,
            interactions_persisted: 0,
            last_error: None,
        }
    }
}

/// The detections found in one captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub captured_at: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

/// The perception collaborator. Lives on the monitor thread.
pub trait DetectionSource: Send {
    /// Prepares the source for measuring. Must succeed before measuring can start.
    fn calibrate(&mut self) -> Result<(), SourceError>;

    /// Blocks until the next frame is available. `Ok(None)` means the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Why a measuring session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    StopRequested,
    EndOfStream,
    SourceFailed,
    Disconnected,
}

pub struct Monitor {
    source: Box<dyn DetectionSource>,
    owner_id: Uuid,
    tracking: TrackingConfig,
    store: Arc<dyn InteractionStore>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<MonitorStatus>,
}

/// The controlling side of a running monitor.
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<MonitorStatus>,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    /// Queues `command`. Returns false if the monitor thread has already exited.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// A receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status.clone()
    }

    pub fn status(&self) -> MonitorStatus {
        self.status.borrow().clone()
    }

    /// Hangs up the command channel and waits for the monitor thread to finish.
    /// A session in progress is closed first.
    pub fn shutdown(self) -> Result<MonitorStatus, ScoutError> {
        let Self {
            commands,
            status,
            thread,
        } = self;
        drop(commands);
        thread.join().map_err(|_| ScoutError::MonitorPanicked)?;
        let last = status.borrow().clone();
        Ok(last)
    }
}

impl Monitor {
    /// Starts a monitor on its own thread, idle and waiting for commands.
    pub fn spawn<S>(
        source: S,
        config: &ScoutConfig,
        store: Arc<dyn InteractionStore>,
    ) -> Result<MonitorHandle, ScoutError>
    where
        S: DetectionSource + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(MonitorStatus::default());

        let monitor = Monitor {
            source: Box::new(source),
            owner_id: config.owner_id,
            tracking: config.tracking.clone(),
            store,
            commands: commands_rx,
            status: status_tx,
        };

        let thread = std::thread::Builder::new()
            .name("scout-monitor".to_string())
            .spawn(move || monitor.run())
            .map_err(ScoutError::MonitorSpawn)?;

        Ok(MonitorHandle {
            commands: commands_tx,
            status: status_rx,
            thread,
        })
    }

    fn run(mut self) {
        info!(owner = %self.owner_id, "monitor ready");
        while let Some(command) = self.commands.blocking_recv() {
            match command {
                Command::Calibrate => self.calibrate(),
                Command::StartMeasure => {
                    let calibrated = self.status.borrow().calibrated;
                    if calibrated {
                        self.measure();
                    } else {
                        error!("unable to measure, scout has not been calibrated");
                        self.fail("measure requested before calibration".to_string());
                    }
                }
                Command::StopMeasure => debug!("not measuring, ignoring stop"),
            }
        }
        info!("command channel closed, monitor exiting");
    }

    fn calibrate(&mut self) {
        info!("calibrating scout");
        self.set_state(ScoutState::Calibrating);

        match self.source.calibrate() {
            Ok(()) => self.status.send_modify(|s| {
                s.state = ScoutState::Calibrated;
                s.calibrated = true;
                s.last_error = None;
            }),
            Err(e) => {
                error!(error = %e, "calibration failed");
                self.status.send_modify(|s| {
                    s.state = ScoutState::Idle;
                    s.calibrated = false;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn measure(&mut self) {
        info!("starting measure");
        self.set_state(ScoutState::Measuring);

        let mut scene = Scene::new(self.owner_id, self.tracking.clone(), Arc::clone(&self.store));
        let mut frames = 0u64;

        let end = loop {
            // A stop still lets the frame already in flight through, then ends the session.
            let requested_end = match self.commands.try_recv() {
                Ok(Command::StopMeasure) => Some(SessionEnd::StopRequested),
                Ok(other) => {
                    warn!(command = ?other, "ignoring command while measuring");
                    None
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(SessionEnd::Disconnected),
            };

            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    let detected: Vec<Waypoint> =
                        frame.detections.into_iter().map(Waypoint::from).collect();
                    scene.update(&detected, frame.captured_at);
                    frames += 1;
                }
                Ok(None) => break SessionEnd::EndOfStream,
                Err(e) => {
                    error!(error = %e, "detection source failed, ending measure");
                    self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                    break SessionEnd::SourceFailed;
                }
            }

            if let Some(end) = requested_end {
                break end;
            }
        };

        let persisted = scene.close() as u64;
        info!(?end, frames, persisted, "measure finished");

        self.status.send_modify(|s| {
            s.state = ScoutState::Idle;
            s.sessions_completed += 1;
            s.frames_processed += frames;
            s.interactions_persisted += persisted;
        });
    }

    fn set_state(&self, state: ScoutState) {
        self.status.send_modify(|s| s.state = state);
    }

    fn fail(&self, reason: String) {
        self.status.send_modify(|s| s.last_error = Some(reason));
    }
}
