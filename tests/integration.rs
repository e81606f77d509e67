//! Integration tests for LagBox
//!
//! These tests exercise the full measurement pipeline: device listing,
//! session configuration, a scripted stand-in for the measurement tool,
//! result ingestion and report generation.

use lagbox::config::{Config, DeviceConfig, ToolConfig};
use lagbox::device::{DeviceCatalog, DeviceType};
use lagbox::input::{detect, ButtonCode, Detection, InputEvent, ScriptedSource};
use lagbox::report::SessionReport;
use lagbox::results::{IngestError, ResultIngestor};
use lagbox::session::{MeasurementConfig, MeasurementSession, SessionEvent, SessionOutcome};
use lagbox::CancelToken;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const LISTING: &str = "\
I: Bus=0003 Vendor=046a Product=0011 Version=0110
N: Name=\"Cherry G80 Keyboard\"
P: Phys=usb-0000:00:14.0-1/input0
S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0/0003:046A:0011.0001/input/input3
U: Uniq=
H: Handlers=sysrq kbd leds event3
B: PROP=0

I: Bus=0019 Vendor=0000 Product=0001 Version=0000
N: Name=\"Power Button\"
P: Phys=PNP0C0C/button/input0
S: Sysfs=/devices/LNXSYSTM:00/LNXSYBUS:00/PNP0C0C:00/input/input0
U: Uniq=
H: Handlers=kbd event0
B: PROP=0

I: Bus=0003 Vendor=1532 Product=0084 Version=0111
N: Name=\"Razer DeathAdder\"
P: Phys=usb-0000:00:14.0-2/input0
S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/0003:1532:0084.0002/input/input4
U: Uniq=
H: Handlers=mouse0 event4
B: PROP=0

";

const TIMEOUT: Duration = Duration::from_secs(10);

/// Scratch layout: `<root>/devices` listing, `<root>/sys` tree and
/// `<root>/bin` as the tool's working directory
fn setup(root: &Path) -> Config {
    fs::write(root.join("devices"), LISTING).unwrap();

    let speed_dir = root.join("sys/devices/pci0000:00/0000:00:14.0/usb1/1-1");
    fs::create_dir_all(&speed_dir).unwrap();
    fs::write(speed_dir.join("speed"), "12\n").unwrap();

    fs::create_dir_all(root.join("bin")).unwrap();

    let mut config = Config::default();
    config.devices = DeviceConfig {
        listing_command: vec![
            "cat".to_string(),
            root.join("devices").display().to_string(),
        ],
        sysfs_root: root.join("sys"),
        ..DeviceConfig::default()
    };
    config.measurement.iterations = 3;
    config
}

/// Point the config at a shell script standing in for the measurement tool
fn install_tool(config: &mut Config, root: &Path, script: &str) {
    let path = root.join("bin/tool.sh");
    fs::write(&path, script).unwrap();
    config.tool = ToolConfig {
        program: PathBuf::from("/bin/sh"),
        leading_args: vec![path.display().to_string()],
        working_dir: Some(root.join("bin")),
        ..ToolConfig::default()
    };
}

/// A tool run that measures three presses and writes its log like the real tool
const SUCCESSFUL_TOOL: &str = r#"
mkdir -p ../log
{
  echo '#Device:;Cherry G80 Keyboard'
  echo '#Button:;30'
  echo '#minDelay:;10'
  echo '#maxDelay:;1000'
  echo '#iterations:;3'
  echo '#author:;'
  echo ''
  echo 'counter;latency;delayTime'
  echo '1;1000;120'
  echo '2;2000;530'
  echo '3;3000;87'
} > ../log/automode_Cherry_G80_Keyboard_1ms_1.csv
echo 'Measuring...'
echo '1,3,1.000000'
echo '2,3,2.000000'
echo '3,3,3.000000'
echo 'done'
echo '../log/automode_Cherry_G80_Keyboard_1ms_1.csv'
"#;

// ---------------------------------------------------------------------------
// Full pipeline tests
// ---------------------------------------------------------------------------

#[test]
fn catalog_lists_only_usb_devices() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let devices = DeviceCatalog::new(&config.devices).enumerate().unwrap();
    assert_eq!(devices.len(), 2);

    let keyboard = &devices[0];
    assert_eq!(keyboard.name, "Cherry G80 Keyboard");
    assert_eq!(keyboard.event_node, "event3");
    assert_eq!(keyboard.auto_detected_type, Some(DeviceType::Keyboard));
    assert_eq!(keyboard.speed.as_deref(), Some("12"));

    let mouse = &devices[1];
    assert_eq!(mouse.auto_detected_type, Some(DeviceType::Mouse));
    assert_eq!(mouse.speed, None);
}

#[test]
fn background_enumeration_matches_direct_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let catalog = DeviceCatalog::new(&config.devices);

    let background = catalog
        .spawn_enumeration()
        .recv_timeout(TIMEOUT)
        .unwrap()
        .unwrap();
    assert_eq!(background, catalog.enumerate().unwrap());
}

#[cfg(unix)]
#[test]
fn measurement_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    install_tool(&mut config, dir.path(), SUCCESSFUL_TOOL);

    // Select the keyboard and "press" its space bar
    let devices = DeviceCatalog::new(&config.devices).enumerate().unwrap();
    let keyboard = devices
        .iter()
        .find(|d| d.event_node == "event3")
        .unwrap();
    let mut events = ScriptedSource::new([
        InputEvent::new(0x04, 4, 0x70039), // MSC_SCAN
        InputEvent::key_press(30),
    ]);
    let Detection::Pressed(button) =
        detect(&mut events, &CancelToken::new(), Duration::from_millis(1)).unwrap()
    else {
        panic!("expected a detected button");
    };
    assert_eq!(button, ButtonCode(30));

    let measurement = MeasurementConfig::for_device(
        keyboard,
        keyboard.auto_detected_type.unwrap(),
        button,
        &config.measurement,
    );
    let mut handle = MeasurementSession::new(config.tool.clone(), measurement)
        .start()
        .unwrap();

    let mut progress = Vec::new();
    let outcome = loop {
        match handle.recv_timeout(TIMEOUT).expect("session timed out") {
            SessionEvent::Progress(p) => progress.push((p.iteration, p.last_latency_ms)),
            SessionEvent::Finished(outcome) => break outcome,
        }
    };
    assert_eq!(progress, vec![(1, 1.0), (2, 2.0), (3, 3.0)]);

    let SessionOutcome::Success { file_path } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert!(file_path.starts_with(dir.path().join("bin")));
    assert!(file_path.exists());

    let ingestion = ResultIngestor::new(&config.results)
        .ingest(&file_path)
        .unwrap();
    assert_eq!(ingestion.samples, vec![1.0, 2.0, 3.0]);
    assert_eq!(ingestion.stats.mean, 2.0);
    assert_eq!(ingestion.stats.median, 2.0);
    assert_eq!(ingestion.metadata.device(), Some("Cherry G80 Keyboard"));
    assert_eq!(ingestion.metadata.button(), Some(30));

    let report_path = dir.path().join("report.json");
    let report = SessionReport::new(&file_path, &ingestion, config.results.decimal_places);
    report.export_json(&report_path).unwrap();
    let json = fs::read_to_string(&report_path).unwrap();
    assert!(json.contains("\"std_dev\": 0.816"));
}

#[cfg(unix)]
#[test]
fn cancelled_measurement_leaves_no_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    install_tool(&mut config, dir.path(), "echo '1,3,1.0'\nexec sleep 30\n");

    let devices = DeviceCatalog::new(&config.devices).enumerate().unwrap();
    let measurement = MeasurementConfig::for_device(
        &devices[0],
        DeviceType::Keyboard,
        ButtonCode(30),
        &config.measurement,
    );
    let mut handle = MeasurementSession::new(config.tool.clone(), measurement)
        .start()
        .unwrap();

    assert!(matches!(
        handle.recv_timeout(TIMEOUT),
        Some(SessionEvent::Progress(_))
    ));
    handle.cancel();
    assert_eq!(handle.wait(), SessionOutcome::Cancelled);
}

#[cfg(unix)]
#[test]
fn success_with_missing_result_file_fails_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    install_tool(
        &mut config,
        dir.path(),
        "echo '1,3,1.0'\necho '../log/never_written.csv'\necho 'done'\n",
    );

    let devices = DeviceCatalog::new(&config.devices).enumerate().unwrap();
    let measurement = MeasurementConfig::for_device(
        &devices[1],
        DeviceType::Mouse,
        ButtonCode(0x110),
        &config.measurement,
    );
    let outcome = MeasurementSession::new(config.tool.clone(), measurement)
        .start()
        .unwrap()
        .wait();

    let SessionOutcome::Success { file_path } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    let err = ResultIngestor::new(&config.results)
        .ingest(&file_path)
        .unwrap_err();
    assert!(matches!(err, IngestError::FileMissing(_)));
}

#[test]
fn config_file_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[tool]
program = "/opt/lagbox/inputLatencyMeasureTool"
exit_grace_ms = 500

[measurement]
iterations = 50
min_delay_ms = 20

[results]
display_ceiling_ms = 1.5
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.tool.exit_grace(), Duration::from_millis(500));
    assert_eq!(config.measurement.iterations, 50);
    assert_eq!(config.measurement.max_delay_ms, 1000);

    let ingestion = ResultIngestor::new(&config.results)
        .parse("counter;latency;delayTime\n1;1000;1\n2;2000;1\n")
        .unwrap();
    assert_eq!(ingestion.over_ceiling, 1);
}
