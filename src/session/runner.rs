//! Launching the measurement tool and following it to completion

use super::config::MeasurementConfig;
use super::protocol::{LineClassifier, ProgressEvent, ProtocolTracker, SessionOutcome, Step};
use super::SessionError;
use crate::cancel::CancelToken;
use crate::config::ToolConfig;
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const REAP_INTERVAL: Duration = Duration::from_millis(10);
/// Longest a blocked receive goes without checking for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Polls after a kill before giving up on collecting the exit status
const KILL_WAIT_ATTEMPTS: u32 = 100;

/// Event delivered to the owner of a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    /// Always the last event of a session
    Finished(SessionOutcome),
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configured but not started; this is every [`MeasurementSession`].
    /// A [`SessionHandle`] starts out `Running`.
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl From<&SessionOutcome> for SessionState {
    fn from(outcome: &SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Success { .. } => Self::Completed,
            SessionOutcome::Cancelled => Self::Cancelled,
            SessionOutcome::ProtocolError { .. } | SessionOutcome::ProcessError { .. } => {
                Self::Failed
            }
        }
    }
}

/// A configured, not yet started measurement run ([`SessionState::Idle`]).
///
/// [`start`](Self::start) consumes it and hands back a [`SessionHandle`].
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    tool: ToolConfig,
    config: MeasurementConfig,
}

impl MeasurementSession {
    pub fn new(tool: ToolConfig, config: MeasurementConfig) -> Self {
        Self { tool, config }
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// The tool invocation for this session, with stdout and stderr piped.
    ///
    /// On Unix the tool leads its own process group so that cancelling also
    /// reaches anything it spawned (or the tool itself behind a wrapper).
    pub fn command(&self) -> Result<Command, SessionError> {
        let mut command = Command::new(&self.tool.program);
        command
            .args(&self.tool.leading_args)
            .args(self.config.tool_args()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.tool.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        Ok(command)
    }

    /// Launch the tool and start following its output on a worker thread.
    ///
    /// Only configuration and spawn failures are returned here; everything
    /// that happens after the tool is running ends up in the outcome.
    pub fn start(self) -> Result<SessionHandle, SessionError> {
        let mut command = self.command()?;
        let program = self.tool.program.display().to_string();

        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            program: program.clone(),
            source,
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SessionError::Spawn {
                program,
                source: io::Error::other("tool stdout was not captured"),
            });
        };
        let stderr = child.stderr.take();

        info!(
            "Started {} (pid {}) measuring {:?} on {}",
            program,
            child.id(),
            self.config.device_name,
            self.config.event_node
        );

        let child = Arc::new(Mutex::new(child));
        let canceller = SessionCanceller {
            token: CancelToken::new(),
            child: Arc::clone(&child),
        };

        if let Some(stderr) = stderr {
            forward_stderr(stderr);
        }

        let (tx, rx) = mpsc::channel();
        let token = canceller.token.clone();
        let tracker = ProtocolTracker::new(
            LineClassifier::new(self.tool.result_dir_marker.clone()),
            self.config.iterations,
        );
        let grace = self.tool.exit_grace();
        let working_dir = self.tool.working_dir.clone();

        let spawned = thread::Builder::new()
            .name("lagbox-session".to_string())
            .spawn(move || {
                let drained = drive_stream(BufReader::new(stdout), tracker, &token, |event| {
                    let _ = tx.send(SessionEvent::Progress(event));
                });
                let outcome = settle(drained, &child, grace, working_dir.as_deref());
                info!("Measurement session finished: {:?}", outcome);
                let _ = tx.send(SessionEvent::Finished(outcome));
            });

        if let Err(source) = spawned {
            canceller.cancel();
            return Err(SessionError::Spawn { program, source });
        }

        Ok(SessionHandle {
            events: rx,
            canceller,
            outcome: None,
        })
    }
}

/// Where [`drive_stream`] stopped
#[derive(Debug, Clone, PartialEq)]
pub struct Drained {
    pub outcome: SessionOutcome,
    /// The outcome was decided by the output ending, not by a line
    pub end_of_stream: bool,
}

/// Feed every line of `reader` to `tracker` until it yields an outcome,
/// the stream ends or `cancel` is set.
///
/// Progress is passed to `on_progress` in order. Nothing is passed once
/// cancellation has been observed.
pub fn drive_stream<R: BufRead>(
    mut reader: R,
    mut tracker: ProtocolTracker,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(ProgressEvent),
) -> Drained {
    let stopped = |outcome| Drained {
        outcome,
        end_of_stream: false,
    };
    let mut buf = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return stopped(SessionOutcome::Cancelled);
        }

        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                let outcome = if cancel.is_cancelled() {
                    SessionOutcome::Cancelled
                } else {
                    tracker.end_of_stream()
                };
                return Drained {
                    outcome,
                    end_of_stream: true,
                };
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                debug!("tool: {}", line.trim_end());
                match tracker.feed(&line) {
                    Step::Progress(event) => {
                        if cancel.is_cancelled() {
                            return stopped(SessionOutcome::Cancelled);
                        }
                        on_progress(event);
                    }
                    Step::Finished(outcome) => return stopped(outcome),
                    Step::Ignored => {}
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let outcome = if cancel.is_cancelled() {
                    SessionOutcome::Cancelled
                } else {
                    SessionOutcome::process_error(format!("failed to read tool output: {e}"))
                };
                return stopped(outcome);
            }
        }
    }
}

/// Make sure the tool is gone and turn the stream result into the final outcome
fn settle(
    drained: Drained,
    child: &Mutex<Child>,
    grace: Duration,
    working_dir: Option<&Path>,
) -> SessionOutcome {
    match drained.outcome {
        SessionOutcome::Success { file_path } => {
            // The tool exits on its own right after `done`
            reap(child, grace);
            SessionOutcome::Success {
                file_path: resolve_result_path(&file_path, working_dir),
            }
        }
        outcome @ SessionOutcome::ProtocolError { .. } if drained.end_of_stream => {
            match reap(child, grace) {
                Some(status) if !status.success() => SessionOutcome::process_error(format!(
                    "tool exited with {status} before finishing"
                )),
                _ => outcome,
            }
        }
        outcome => {
            terminate(child);
            reap(child, grace);
            outcome
        }
    }
}

/// Wait up to `grace` for the tool to exit, then kill it
fn reap(child: &Mutex<Child>, grace: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + grace;
    loop {
        let polled = lock(child).try_wait();
        match polled {
            Ok(Some(status)) => {
                debug!("Measurement tool exited with {}", status);
                return Some(status);
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(REAP_INTERVAL),
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to query measurement tool status: {}", e);
                return None;
            }
        }
    }

    warn!("Measurement tool still running after {:?}, killing it", grace);
    terminate(child);
    for _ in 0..KILL_WAIT_ATTEMPTS {
        let polled = lock(child).try_wait();
        match polled {
            Ok(Some(status)) => return Some(status),
            Ok(None) => thread::sleep(REAP_INTERVAL),
            Err(_) => return None,
        }
    }
    warn!("Measurement tool did not exit after kill");
    None
}

/// Kill the tool and its process group
fn terminate(child: &Mutex<Child>) {
    let mut child = lock(child);

    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The group outlives a reaped leader while members remain, so its id
        // cannot have been reused
        match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            Ok(()) => debug!("Killed measurement tool process group {}", child.id()),
            Err(e) => debug!("Kill of process group {} failed: {}", child.id(), e),
        }
    }

    if let Err(e) = child.kill() {
        debug!("Kill of measurement tool failed: {}", e);
    }
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Relative result paths are relative to the tool's working directory
fn resolve_result_path(path: &Path, working_dir: Option<&Path>) -> PathBuf {
    match working_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn forward_stderr(stderr: impl Read + Send + 'static) {
    let spawned = thread::Builder::new()
        .name("lagbox-tool-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => debug!("tool stderr: {}", line),
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Could not forward measurement tool stderr: {}", e);
    }
}

/// Cancels a running session from any thread
#[derive(Debug, Clone)]
pub struct SessionCanceller {
    token: CancelToken,
    child: Arc<Mutex<Child>>,
}

impl SessionCanceller {
    /// Request cancellation and kill the tool. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!("Cancelling measurement session");
        }
        self.token.cancel();
        terminate(&self.child);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owner side of a running session.
///
/// Yields progress events in iteration order followed by exactly one
/// [`SessionEvent::Finished`]. After [`cancel`](Self::cancel) no further
/// progress is yielded and the next receive finishes the session without
/// waiting for the tool's output to close. Dropping an unfinished handle
/// cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    events: Receiver<SessionEvent>,
    canceller: SessionCanceller,
    outcome: Option<SessionOutcome>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.outcome
            .as_ref()
            .map_or(SessionState::Running, SessionState::from)
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> SessionCanceller {
        self.canceller.clone()
    }

    /// Block for the next event; `None` once the session has finished
    pub fn recv(&mut self) -> Option<SessionEvent> {
        while self.outcome.is_none() {
            if let Some(event) = self.recv_timeout(CANCEL_POLL_INTERVAL) {
                return Some(event);
            }
        }
        None
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<SessionEvent> {
        let deadline = Instant::now() + timeout;
        while self.outcome.is_none() {
            if let Some(event) = self.finish_if_cancelled() {
                return Some(event);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.events.recv_timeout(remaining.min(CANCEL_POLL_INTERVAL)) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) if Instant::now() >= deadline => return None,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => worker_lost(),
            };
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
        None
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        while self.outcome.is_none() {
            if let Some(event) = self.finish_if_cancelled() {
                return Some(event);
            }

            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => worker_lost(),
            };
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
        None
    }

    /// Drain the session and return its outcome
    pub fn wait(mut self) -> SessionOutcome {
        while self.recv().is_some() {}
        self.outcome
            .clone()
            .unwrap_or_else(|| SessionOutcome::process_error("session ended without an outcome"))
    }

    /// After a cancel request, end the session from what is already queued.
    ///
    /// An outcome the worker has already sent is kept; otherwise the session
    /// ends as cancelled while the worker finishes reaping in the background.
    fn finish_if_cancelled(&mut self) -> Option<SessionEvent> {
        if self.outcome.is_some() || !self.canceller.is_cancelled() {
            return None;
        }
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, SessionEvent::Finished(_)) {
                return self.accept(event);
            }
        }
        self.accept(SessionEvent::Finished(SessionOutcome::Cancelled))
    }

    fn accept(&mut self, event: SessionEvent) -> Option<SessionEvent> {
        match event {
            SessionEvent::Progress(progress) if self.canceller.is_cancelled() => {
                debug!("Dropping progress {} after cancel", progress.iteration);
                None
            }
            SessionEvent::Finished(outcome) => {
                self.outcome = Some(outcome.clone());
                Some(SessionEvent::Finished(outcome))
            }
            event => Some(event),
        }
    }
}

impl Iterator for SessionHandle {
    type Item = SessionEvent;

    fn next(&mut self) -> Option<SessionEvent> {
        self.recv()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.canceller.cancel();
        }
    }
}

fn worker_lost() -> SessionEvent {
    SessionEvent::Finished(SessionOutcome::process_error(
        "session worker stopped without an outcome",
    ))
}
