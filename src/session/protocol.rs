//! Line protocol spoken by the measurement tool on stdout
//!
//! The tool prints one line per measured press (`iteration,total,latency_ms`),
//! the path of the result file once it is written, and `done` when it
//! finishes. A `cancelled` line ends the run early. Anything else is
//! diagnostic chatter and ignored.

use log::debug;
use std::path::PathBuf;

/// Progress report for one measured iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub iteration: u32,
    pub total: u32,
    pub last_latency_ms: f64,
}

impl ProgressEvent {
    /// Completed share of the run in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.iteration as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// How a session ended. Exactly one of these terminates every session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Success { file_path: PathBuf },
    Cancelled,
    ProtocolError { detail: String },
    ProcessError { detail: String },
}

impl SessionOutcome {
    pub fn protocol_error(detail: impl Into<String>) -> Self {
        Self::ProtocolError {
            detail: detail.into(),
        }
    }

    pub fn process_error(detail: impl Into<String>) -> Self {
        Self::ProcessError {
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Shape of a single output line
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Progress { iteration: u32, last_latency_ms: f64 },
    /// Starts like a progress line but cannot be parsed as one
    MalformedProgress,
    Done,
    Cancelled,
    ResultPath(String),
    Blank,
    Other,
}

const FIELD_SEPARATOR: char = ',';
const DONE_MARKER: &str = "done";
const CANCELLED_MARKER: &str = "cancelled";

/// Classifies tool output lines, one rule per line shape
#[derive(Debug, Clone)]
pub struct LineClassifier {
    result_dir_marker: String,
}

impl LineClassifier {
    pub fn new(result_dir_marker: impl Into<String>) -> Self {
        Self {
            result_dir_marker: result_dir_marker.into(),
        }
    }

    pub fn classify(&self, line: &str) -> LineKind {
        let line = line.trim();

        if line.is_empty() {
            return LineKind::Blank;
        }
        if let Some(kind) = classify_progress(line) {
            return kind;
        }
        if has_word(line, DONE_MARKER) {
            return LineKind::Done;
        }
        if has_word(line, CANCELLED_MARKER) {
            return LineKind::Cancelled;
        }
        if !self.result_dir_marker.is_empty() && line.contains(&self.result_dir_marker) {
            return LineKind::ResultPath(line.to_string());
        }
        LineKind::Other
    }
}

/// `None` unless the line starts with `<digits>,`
fn classify_progress(line: &str) -> Option<LineKind> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || !line[digits..].starts_with(FIELD_SEPARATOR) {
        return None;
    }

    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < 3 {
        return Some(LineKind::MalformedProgress);
    }

    let iteration = fields[0].parse::<u32>().ok();
    let latency = fields[fields.len() - 1]
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|ms| ms.is_finite());

    Some(match (iteration, latency) {
        (Some(iteration), Some(last_latency_ms)) => LineKind::Progress {
            iteration,
            last_latency_ms,
        },
        _ => LineKind::MalformedProgress,
    })
}

fn has_word(line: &str, word: &str) -> bool {
    line.split_whitespace().any(|token| token == word)
}

/// Result of feeding one line to the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Progress(ProgressEvent),
    Finished(SessionOutcome),
    Ignored,
}

/// Turns the classified line stream into progress events and one outcome.
///
/// Success needs both the `done` marker and a result path, in either order.
/// After an outcome is produced every further line is ignored.
#[derive(Debug, Clone)]
pub struct ProtocolTracker {
    classifier: LineClassifier,
    total: u32,
    last_iteration: Option<u32>,
    done: bool,
    result_path: Option<String>,
    finished: bool,
}

impl ProtocolTracker {
    pub fn new(classifier: LineClassifier, total: u32) -> Self {
        Self {
            classifier,
            total,
            last_iteration: None,
            done: false,
            result_path: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, line: &str) -> Step {
        if self.finished {
            return Step::Ignored;
        }

        match self.classifier.classify(line) {
            LineKind::Progress {
                iteration,
                last_latency_ms,
            } => {
                if iteration > self.total {
                    return self.finish(SessionOutcome::protocol_error(format!(
                        "iteration {} exceeds the configured {} iterations",
                        iteration, self.total
                    )));
                }
                if self.last_iteration.is_some_and(|last| iteration <= last) {
                    debug!("Dropping out-of-order progress line {:?}", line.trim());
                    return Step::Ignored;
                }
                self.last_iteration = Some(iteration);
                Step::Progress(ProgressEvent {
                    iteration,
                    total: self.total,
                    last_latency_ms,
                })
            }
            LineKind::MalformedProgress => self.finish(SessionOutcome::protocol_error(format!(
                "unparseable progress line {:?}",
                line.trim()
            ))),
            LineKind::Done => {
                self.done = true;
                self.try_complete()
            }
            LineKind::Cancelled => self.finish(SessionOutcome::Cancelled),
            LineKind::ResultPath(path) => {
                self.result_path = Some(path);
                self.try_complete()
            }
            LineKind::Blank | LineKind::Other => Step::Ignored,
        }
    }

    /// Outcome when the stream ends without a terminal step
    pub fn end_of_stream(&mut self) -> SessionOutcome {
        let outcome = if self.done {
            SessionOutcome::protocol_error("tool reported done without a result path")
        } else {
            SessionOutcome::protocol_error("output ended before a terminal marker")
        };
        self.finished = true;
        outcome
    }

    fn try_complete(&mut self) -> Step {
        if !self.done {
            return Step::Ignored;
        }
        match self.result_path.clone() {
            Some(path) => self.finish(SessionOutcome::Success {
                file_path: PathBuf::from(path),
            }),
            None => Step::Ignored,
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) -> Step {
        self.finished = true;
        Step::Finished(outcome)
    }
}
