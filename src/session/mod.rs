//! Measurement sessions driven by the external latency tool
//!
//! A session launches the tool with the flags derived from a
//! [`MeasurementConfig`], follows its line protocol on stdout and reports
//! progress plus exactly one terminal [`SessionOutcome`].

mod config;
mod protocol;
mod runner;

pub use config::MeasurementConfig;
pub use protocol::{
    LineClassifier, LineKind, ProgressEvent, ProtocolTracker, SessionOutcome, Step,
};
pub use runner::{
    drive_stream, Drained, MeasurementSession, SessionCanceller, SessionEvent, SessionHandle,
    SessionState,
};

use std::io;
use thiserror::Error;

/// Errors raised before a session is running.
///
/// Once the tool is running, every failure is reported as a
/// [`SessionOutcome`] instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid measurement config: {0}")]
    InvalidConfig(String),
    #[error("Failed to start measurement tool {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}
