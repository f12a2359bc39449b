//! Tracing setup for binaries and long-running hosts.
//!
//! The library itself only emits `tracing` events. Whoever owns `main` calls
//! [`init_tracing`] once; later calls are ignored.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// With `json` set, events are written as flattened JSON objects, one per line,
/// which is what the log collector on a deployed scout expects.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
