//! LagBox - input device latency measurement
//!
//! Command-line front end: list devices, detect a button, run a measurement
//! and analyze result files.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lagbox::{
    config::Config,
    device::{Device, DeviceCatalog, DeviceType},
    input::ButtonCode,
    report::SessionReport,
    results::{Ingestion, ResultIngestor},
    session::{MeasurementConfig, MeasurementSession, SessionEvent, SessionOutcome},
    CancelToken,
};

/// How often the foreground loops check for Ctrl-C
const TICK_RATE: Duration = Duration::from_millis(100);

/// measure input latency of USB keyboards, mice and gamepads
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// list USB input devices
    Devices {
        /// print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// wait for a button press on an event node (e.g. event5)
    Detect { event_node: String },
    /// run a latency measurement
    Measure(MeasureArgs),
    /// print the effective configuration as TOML
    Config,
    /// compute statistics for an existing result file
    Analyze {
        file: PathBuf,
        /// write a JSON report
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct MeasureArgs {
    /// device name or event node
    #[arg(short, long)]
    device: String,

    /// device type; defaults to the auto-detected one
    #[arg(short = 't', long = "type", value_enum)]
    device_type: Option<TypeArg>,

    /// button code; detected interactively when omitted
    #[arg(short, long)]
    button: Option<u16>,

    /// number of measured presses
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// minimum delay between presses in ms
    #[arg(long)]
    min_delay: Option<u32>,

    /// maximum delay between presses in ms
    #[arg(long)]
    max_delay: Option<u32>,

    /// tool mode
    #[arg(short, long)]
    mode: Option<u32>,

    /// write a JSON report
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum TypeArg {
    Gamepad,
    Mouse,
    Keyboard,
}

impl From<TypeArg> for DeviceType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Gamepad => DeviceType::Gamepad,
            TypeArg::Mouse => DeviceType::Mouse,
            TypeArg::Keyboard => DeviceType::Keyboard,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    match cli.command {
        Command::Devices { json } => list_devices(&config, json),
        Command::Config => {
            print!("{}", config.to_toml().context("Failed to render config")?);
            Ok(())
        }
        Command::Detect { event_node } => {
            let interrupt = install_interrupt()?;
            match detect_button(&config, &event_node, &interrupt)? {
                Some(code) => println!("{}", code),
                None => println!("Detection cancelled"),
            }
            Ok(())
        }
        Command::Measure(args) => {
            let interrupt = install_interrupt()?;
            measure(&config, args, &interrupt)
        }
        Command::Analyze { file, report } => {
            let ingestion = analyze(&config, &file)?;
            if let Some(path) = report {
                write_report(&config, &file, &ingestion, &path)?;
            }
            Ok(())
        }
    }
}

/// Ctrl-C cancels the foreground operation; a second Ctrl-C exits immediately
fn install_interrupt() -> Result<CancelToken> {
    let interrupt = CancelToken::new();
    let handler_token = interrupt.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(interrupt)
}

fn list_devices(config: &Config, json: bool) -> Result<()> {
    let devices = enumerate(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No USB input devices found");
        return Ok(());
    }
    for device in &devices {
        println!(
            "{:<8} {}:{}  {:<9} {:>4}  {}",
            device.event_node,
            device.vendor_id,
            device.product_id,
            device
                .auto_detected_type
                .map_or("-", |device_type| device_type.name()),
            device.speed.as_deref().unwrap_or("-"),
            device.name
        );
    }
    Ok(())
}

fn enumerate(config: &Config) -> Result<Vec<Device>> {
    let receiver = DeviceCatalog::new(&config.devices).spawn_enumeration();
    let devices = receiver
        .recv()
        .context("Device enumeration stopped unexpectedly")?
        .context("Failed to list input devices")?;
    Ok(devices)
}

/// `Ok(None)` when the user cancelled
#[cfg(target_os = "linux")]
fn detect_button(
    config: &Config,
    event_node: &str,
    interrupt: &CancelToken,
) -> Result<Option<ButtonCode>> {
    use lagbox::input::{ButtonDetector, Detection};
    use std::sync::mpsc::RecvTimeoutError;

    let mut detector = ButtonDetector::new(&config.devices, &config.detection);
    let results = detector.start(event_node);
    println!("Press the button to measure on {} (Ctrl-C to abort)", event_node);

    loop {
        if interrupt.is_cancelled() {
            detector.cancel();
        }
        match results.recv_timeout(TICK_RATE) {
            Ok(result) => {
                return match result.context("Button detection failed")? {
                    Detection::Pressed(code) => Ok(Some(code)),
                    Detection::Cancelled => Ok(None),
                };
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => bail!("Button detection stopped unexpectedly"),
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn detect_button(
    _config: &Config,
    _event_node: &str,
    _interrupt: &CancelToken,
) -> Result<Option<ButtonCode>> {
    bail!("Button detection needs Linux event devices; pass --button instead")
}

fn measure(config: &Config, args: MeasureArgs, interrupt: &CancelToken) -> Result<()> {
    let devices = enumerate(config)?;
    let device = devices
        .iter()
        .find(|d| d.name == args.device || d.event_node == args.device)
        .ok_or_else(|| anyhow!("No USB input device named {:?}", args.device))?;

    let device_type = args
        .device_type
        .map(DeviceType::from)
        .or(device.auto_detected_type)
        .ok_or_else(|| anyhow!("Cannot tell the type of {:?}; pass --type", device.name))?;

    let button = match args.button {
        Some(code) => ButtonCode::new(code),
        None => match detect_button(config, &device.event_node, interrupt)? {
            Some(code) => {
                println!("Detected {}", code);
                code
            }
            None => {
                println!("Measurement aborted");
                return Ok(());
            }
        },
    };

    let mut measurement =
        MeasurementConfig::for_device(device, device_type, button, &config.measurement);
    if let Some(iterations) = args.iterations {
        measurement.iterations = iterations;
    }
    if let Some(min_delay) = args.min_delay {
        measurement.min_delay_ms = min_delay;
    }
    if let Some(max_delay) = args.max_delay {
        measurement.max_delay_ms = max_delay;
    }
    if let Some(mode) = args.mode {
        measurement.mode = mode;
    }

    info!(
        "Measuring {} ({}) button {} for {} iterations",
        device.name, device_type, button, measurement.iterations
    );
    let mut handle = MeasurementSession::new(config.tool.clone(), measurement).start()?;

    let outcome = loop {
        if interrupt.is_cancelled() {
            handle.cancel();
        }
        match handle.recv_timeout(TICK_RATE) {
            Some(SessionEvent::Progress(progress)) => println!(
                "[{:>3.0}%] {}/{}  {:.3} ms",
                progress.fraction() * 100.0,
                progress.iteration,
                progress.total,
                progress.last_latency_ms
            ),
            Some(SessionEvent::Finished(outcome)) => break outcome,
            None => continue,
        }
    };

    match outcome {
        SessionOutcome::Success { file_path } => {
            println!("Results written to {}", file_path.display());
            let ingestion = analyze(config, &file_path)?;
            if let Some(path) = args.report {
                write_report(config, &file_path, &ingestion, &path)?;
            }
            Ok(())
        }
        SessionOutcome::Cancelled => {
            println!("Measurement cancelled");
            Ok(())
        }
        SessionOutcome::ProtocolError { detail } => bail!("Measurement tool misbehaved: {detail}"),
        SessionOutcome::ProcessError { detail } => bail!("Measurement tool failed: {detail}"),
    }
}

fn analyze(config: &Config, file: &Path) -> Result<Ingestion> {
    let ingestion = ResultIngestor::new(&config.results)
        .ingest(file)
        .with_context(|| format!("Failed to read results from {}", file.display()))?;

    if let Some(device) = ingestion.metadata.device() {
        println!("Device:  {}", device);
    }
    if let Some(button) = ingestion.metadata.button() {
        println!("Button:  {}", ButtonCode::new(button));
    }
    println!("Samples: {}", ingestion.samples.len());
    println!(
        "{:.*}",
        config.results.decimal_places as usize,
        ingestion.stats.rounded(config.results.decimal_places)
    );
    println!("Rating:  {}", ingestion.stats.rating());
    if ingestion.over_ceiling > 0 {
        warn!(
            "{} samples exceed {} ms and would be clipped in a plot",
            ingestion.over_ceiling, config.results.display_ceiling_ms
        );
    }
    Ok(ingestion)
}

fn write_report(config: &Config, source: &Path, ingestion: &Ingestion, path: &Path) -> Result<()> {
    SessionReport::new(source, ingestion, config.results.decimal_places)
        .export_json(path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}
