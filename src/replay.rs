//! A [`DetectionSource`] that plays back recorded detections.
//!
//! The recording is JSON lines, one frame per line:
//!
//! ```text
//! {"t": 0.0, "detections": [{"x": 100, "y": 200, "half_width": 20, "half_height": 40}]}
//! {"t": 0.1, "detections": []}
//! ```
//!
//! `t` is seconds since the start of the recording. Blank lines are skipped.

use crate::core_modules::waypoint::Detection;
use crate::error::SourceError;
use crate::pipeline::{DetectionSource, Frame};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    t: f64,
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct ReplaySource {
    lines: Box<dyn BufRead + Send>,
    line_no: usize,
    /// Wall-clock time that `t = 0` maps to.
    origin: DateTime<Utc>,
    /// Sleep between frames so playback runs at the recorded speed.
    paced: bool,
    last_t: Option<f64>,
    /// A frame read ahead by `calibrate`.
    pending: Option<Frame>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            lines: Box::new(reader),
            line_no: 0,
            origin: Utc::now(),
            paced: false,
            last_t: None,
            pending: None,
        }
    }

    /// Maps `t = 0` to `origin` instead of the time the source was created.
    pub fn starting_at(mut self, origin: DateTime<Utc>) -> Self {
        self.origin = origin;
        self
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.lines.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                break;
            }
        }

        let recorded: RecordedFrame =
            serde_json::from_str(&line).map_err(|source| SourceError::Malformed {
                line: self.line_no,
                source,
            })?;

        if self.paced {
            if let Some(last_t) = self.last_t {
                let gap = recorded.t - last_t;
                if gap > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(gap));
                }
            }
        }
        self.last_t = Some(recorded.t);

        let offset = TimeDelta::microseconds((recorded.t * 1_000_000.0).round() as i64);
        Ok(Some(Frame {
            captured_at: self.origin + offset,
            detections: recorded.detections,
        }))
    }
}

impl DetectionSource for ReplaySource {
    /// Checks that the recording starts with a readable frame.
    fn calibrate(&mut self) -> Result<(), SourceError> {
        if self.pending.is_none() {
            self.pending = self.read_frame()?;
        }
        match &self.pending {
            Some(frame) => {
                debug!(detections = frame.detections.len(), "replay calibrated on first frame");
                Ok(())
            }
            None => Err(SourceError::Calibration("recording has no frames".to_string())),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.pending.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.read_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn source(text: &str) -> ReplaySource {
        ReplaySource::from_reader(Cursor::new(text.to_string())).starting_at(origin())
    }

    #[test]
    fn frames_are_read_in_order_with_relative_times() {
        let mut replay = source(
            r#"{"t": 0.0, "detections": [{"x": 1, "y": 2, "half_width": 3, "half_height": 4}]}

{"t": 0.25}
"#,
        );

        let first = replay.next_frame().unwrap().unwrap();
        assert_eq!(first.captured_at, origin());
        assert_eq!(
            first.detections,
            vec![Detection {
                x: 1,
                y: 2,
                half_width: 3,
                half_height: 4
            }]
        );

        let second = replay.next_frame().unwrap().unwrap();
        assert_eq!(second.captured_at, origin() + TimeDelta::milliseconds(250));
        assert!(second.detections.is_empty());

        assert!(replay.next_frame().unwrap().is_none());
    }

    #[test]
    fn calibration_does_not_consume_the_first_frame() {
        let mut replay = source("{\"t\": 1.0}\n{\"t\": 2.0}\n");

        replay.calibrate().unwrap();
        replay.calibrate().unwrap();

        let first = replay.next_frame().unwrap().unwrap();
        assert_eq!(first.captured_at, origin() + TimeDelta::seconds(1));
    }

    #[test]
    fn empty_recording_fails_calibration() {
        let mut replay = source("\n\n");

        assert!(matches!(
            replay.calibrate(),
            Err(SourceError::Calibration(_))
        ));
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let mut replay = source("{\"t\": 0.0}\nnot json\n");

        replay.next_frame().unwrap();
        assert!(matches!(
            replay.next_frame(),
            Err(SourceError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            ReplaySource::open(&dir.path().join("absent.jsonl")),
            Err(SourceError::Open { .. })
        ));
    }
}
