//! Button detection: wait for the first key-down on an event node

use super::codes::ButtonCode;
use super::event::EventSource;
use super::DetectError;
use crate::cancel::CancelToken;
use crate::config::{DetectionConfig, DeviceConfig};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Terminal result of one detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A key-down was observed
    Pressed(ButtonCode),
    /// The caller cancelled before any key-down arrived
    Cancelled,
}

pub type DetectionResult = Result<Detection, DetectError>;

/// Poll `source` until a key-down arrives or `cancel` is set.
///
/// Returns as soon as the qualifying event is read; later events stay queued
/// in the source. An empty poll waits up to `poll_interval` on the cancel
/// token before reading again.
pub fn detect<S: EventSource + ?Sized>(
    source: &mut S,
    cancel: &CancelToken,
    poll_interval: Duration,
) -> DetectionResult {
    loop {
        if cancel.is_cancelled() {
            return Ok(Detection::Cancelled);
        }

        match source.next_event()? {
            Some(event) if event.is_key_down() => {
                return Ok(Detection::Pressed(ButtonCode(event.code)));
            }
            Some(event) => debug!("Ignoring event {:?}", event),
            None => {
                if cancel.wait_timeout(poll_interval) {
                    return Ok(Detection::Cancelled);
                }
            }
        }
    }
}

struct ActiveDetection {
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

/// Runs [`detect`] on a background thread, one run at a time.
///
/// Starting a new run cancels and joins the previous one first, so a
/// "restart detection" request never leaves two readers on a device.
pub struct ButtonDetector {
    dev_input_dir: PathBuf,
    poll_interval: Duration,
    active: Option<ActiveDetection>,
}

impl ButtonDetector {
    pub fn new(devices: &DeviceConfig, detection: &DetectionConfig) -> Self {
        Self {
            dev_input_dir: devices.dev_input_dir.clone(),
            poll_interval: detection.poll_interval(),
            active: None,
        }
    }

    /// Start detecting on an event node such as `event5`.
    ///
    /// The single result (including a permission failure) arrives on the
    /// returned channel.
    #[cfg(target_os = "linux")]
    pub fn start(&mut self, event_node: &str) -> mpsc::Receiver<DetectionResult> {
        let path = self.dev_input_dir.join(event_node);
        self.start_with(move || super::EvdevDevice::open(&path))
    }

    /// Start detecting on a source produced by `open` on the worker thread
    pub fn start_with<S, F>(&mut self, open: F) -> mpsc::Receiver<DetectionResult>
    where
        S: EventSource,
        F: FnOnce() -> Result<S, DetectError> + Send + 'static,
    {
        self.cancel();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let worker_tx = tx.clone();
        let poll_interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name("lagbox-detect".to_string())
            .spawn(move || {
                let result = open().and_then(|mut source| {
                    detect(&mut source, &worker_cancel, poll_interval)
                });
                match &result {
                    Ok(Detection::Pressed(code)) => info!("Detected button {}", code),
                    Ok(Detection::Cancelled) => debug!("Button detection cancelled"),
                    Err(e) => info!("Button detection failed: {}", e),
                }
                let _ = worker_tx.send(result);
            });

        match spawned {
            Ok(worker) => self.active = Some(ActiveDetection { cancel, worker }),
            Err(e) => {
                let _ = tx.send(Err(DetectError::Io(e)));
            }
        }

        rx
    }

    /// Cancel the running detection, if any, and wait for its worker to exit
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            let _ = active.worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.worker.is_finished())
    }
}

impl Drop for ButtonDetector {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::{InputEvent, ScriptedSource, EV_KEY};
    use std::io;

    const POLL: Duration = Duration::from_millis(1);

    fn detector() -> ButtonDetector {
        ButtonDetector::new(&DeviceConfig::default(), &DetectionConfig { poll_interval_ms: 1 })
    }

    #[test]
    fn returns_first_key_down() {
        let mut source = ScriptedSource::new([
            InputEvent::new(0x00, 0, 0), // SYN_REPORT
            InputEvent::key_release(30),
            InputEvent::key_press(42),
            InputEvent::key_press(7),
        ]);

        let result = detect(&mut source, &CancelToken::new(), POLL).unwrap();
        assert_eq!(result, Detection::Pressed(ButtonCode(42)));
        // Nothing after the qualifying event was read
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn autorepeat_counts_as_pressed() {
        let mut source = ScriptedSource::new([InputEvent::new(EV_KEY, 0x110, 2)]);
        let result = detect(&mut source, &CancelToken::new(), POLL).unwrap();
        assert_eq!(result, Detection::Pressed(ButtonCode(0x110)));
    }

    #[test]
    fn cancelled_token_stops_detection() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut source = ScriptedSource::new([InputEvent::key_press(30)]);
        assert_eq!(detect(&mut source, &cancel, POLL).unwrap(), Detection::Cancelled);
    }

    #[test]
    fn source_errors_propagate() {
        struct Broken;
        impl EventSource for Broken {
            fn next_event(&mut self) -> io::Result<Option<InputEvent>> {
                Err(io::Error::new(io::ErrorKind::Other, "device unplugged"))
            }
        }

        let result = detect(&mut Broken, &CancelToken::new(), POLL);
        assert!(matches!(result, Err(DetectError::Io(_))));
    }

    #[test]
    fn background_detection_reports_press() {
        let mut detector = detector();
        let rx = detector.start_with(|| {
            Ok(ScriptedSource::new([
                InputEvent::key_release(1),
                InputEvent::key_press(57),
            ]))
        });
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(result, Detection::Pressed(ButtonCode(57)));
    }

    #[test]
    fn permission_error_is_delivered_not_raised() {
        let mut detector = detector();
        let rx = detector.start_with(|| -> Result<ScriptedSource, DetectError> {
            Err(DetectError::PermissionDenied {
                path: PathBuf::from("/dev/input/event3"),
            })
        });
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(DetectError::PermissionDenied { .. })));
    }

    #[test]
    fn restart_cancels_previous_run() {
        let mut detector = detector();
        // An empty source waits until cancelled
        let first = detector.start_with(|| Ok(ScriptedSource::default()));
        assert!(detector.is_running());

        let second = detector.start_with(|| Ok(ScriptedSource::new([InputEvent::key_press(30)])));

        let first_result = first.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(first_result, Detection::Cancelled);
        let second_result = second.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(second_result, Detection::Pressed(ButtonCode(30)));
    }

    #[test]
    fn explicit_cancel_acknowledges() {
        let mut detector = detector();
        let rx = detector.start_with(|| Ok(ScriptedSource::default()));
        detector.cancel();
        assert!(!detector.is_running());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(),
            Detection::Cancelled
        );
    }
}
