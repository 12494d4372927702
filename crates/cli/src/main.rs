use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use smartlens_core::{
    load_config, DeviceSnapshot, ParsePipeline, Property, ProbeConfig, SmartctlExecutor,
    StorageDevice,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "smartlens",
    version,
    about = "Classify storage devices and read their SMART data through smartctl."
)]
struct Cli {
    /// JSON config file (smartctl binary, extra options, output formats).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Probe a device, classify it and print what was found.
    Probe(ProbeArgs),
    /// Parse a previously saved smartctl output file.
    Load(LoadArgs),
    /// Switch SMART on or off.
    Smart(ToggleArgs),
    /// Switch automatic offline data collection on or off.
    AutoOffline(ToggleArgs),
}

#[derive(Debug, Args)]
struct DeviceArgs {
    /// Device path, e.g. /dev/sda.
    device: String,

    /// smartctl device type passed as `-d`.
    #[arg(long = "type", short = 'd', value_name = "TYPE")]
    type_arg: Option<String>,

    /// Extra smartctl arguments (repeatable).
    #[arg(long = "extra", value_name = "ARG", action = ArgAction::Append, allow_hyphen_values = true)]
    extra: Vec<String>,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Also run the exhaustive probe after the basic one.
    #[arg(long)]
    full: bool,

    /// Write the raw smartctl output to this file (loadable with `load`).
    #[arg(long, value_name = "FILE")]
    save_output: Option<PathBuf>,

    /// List every parsed property.
    #[arg(long)]
    properties: bool,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Saved smartctl output (text or JSON).
    file: PathBuf,

    /// List every parsed property.
    #[arg(long)]
    properties: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Debug, Args)]
struct ToggleArgs {
    #[command(flatten)]
    device: DeviceArgs,

    #[arg(value_enum)]
    state: Switch,
}

#[derive(Debug, Serialize)]
struct ProbeOutput<'a> {
    snapshot: DeviceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<&'a [Property]>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Probe(args) => run_probe_command(&config, args, cli.json),
        Commands::Load(args) => run_load_command(&config, args, cli.json),
        Commands::Smart(args) => run_toggle_command(&config, args, Toggle::Smart, cli.json),
        Commands::AutoOffline(args) => {
            run_toggle_command(&config, args, Toggle::AutoOffline, cli.json)
        }
    }
}

fn build_device(args: DeviceArgs) -> StorageDevice {
    let mut device = StorageDevice::new(args.device);
    device.set_type_argument(args.type_arg);
    device.set_extra_arguments(args.extra);
    device
}

fn run_probe_command(config: &ProbeConfig, args: ProbeArgs, json: bool) -> Result<()> {
    let pipeline = ParsePipeline::builtin(config);
    let executor = SmartctlExecutor::from_config(config);
    let mut device = build_device(args.device);

    let basic = device.fetch_basic_data_and_parse(&pipeline, &executor);
    if let Some(path) = &args.save_output {
        save_output(&device, path)?;
    }
    basic.with_context(|| format!("basic probe of {} failed", device.device_with_type()))?;

    if args.full {
        let full = device.fetch_full_data_and_parse(&pipeline, &executor);
        if let Some(path) = &args.save_output {
            save_output(&device, path)?;
        }
        full.with_context(|| format!("full probe of {} failed", device.device_with_type()))?;
    }

    print_device(&device, args.properties, json)
}

/// The full output when there is one, since it is a superset of the basic.
fn save_output(device: &StorageDevice, path: &Path) -> Result<()> {
    let output = if device.full_output().is_empty() {
        device.basic_output()
    } else {
        device.full_output()
    };
    fs::write(path, output)
        .with_context(|| format!("failed to write smartctl output to {}", path.display()))?;
    info!("smartctl output written to {}", path.display());
    Ok(())
}

fn run_load_command(config: &ProbeConfig, args: LoadArgs, json: bool) -> Result<()> {
    let output = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let pipeline = ParsePipeline::builtin(config);
    let mut device = StorageDevice::new_virtual(&args.file, output);

    device
        .parse_any_data_for_virtual(&pipeline)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    print_device(&device, args.properties, json)
}

#[derive(Debug, Copy, Clone)]
enum Toggle {
    Smart,
    AutoOffline,
}

fn run_toggle_command(
    config: &ProbeConfig,
    args: ToggleArgs,
    toggle: Toggle,
    json: bool,
) -> Result<()> {
    let pipeline = ParsePipeline::builtin(config);
    let executor = SmartctlExecutor::from_config(config);
    let mut device = build_device(args.device);
    let enabled = matches!(args.state, Switch::On);

    let result = match toggle {
        Toggle::Smart => device.set_smart_enabled(enabled, &pipeline, &executor),
        Toggle::AutoOffline => device.set_auto_offline_enabled(enabled, &pipeline, &executor),
    };
    result.with_context(|| format!("{:?} switch on {} failed", toggle, device.device_with_type()))?;

    device
        .fetch_basic_data_and_parse(&pipeline, &executor)
        .with_context(|| format!("cannot re-read {}", device.device_with_type()))?;
    print_device(&device, false, json)
}

fn print_device(device: &StorageDevice, properties: bool, json: bool) -> Result<()> {
    let snapshot = device.snapshot();
    if json {
        let payload = ProbeOutput {
            snapshot,
            properties: properties.then(|| device.property_repository().properties()),
        };
        let payload =
            serde_json::to_string_pretty(&payload).context("failed to serialize device")?;
        println!("{payload}");
        return Ok(());
    }

    println!(
        "{} [{}] parse={:?}",
        snapshot.display_name,
        snapshot.detected_type.displayable_name(),
        snapshot.parse_status
    );
    for (label, value) in [
        ("Model", &snapshot.model_name),
        ("Family", &snapshot.family_name),
        ("Serial", &snapshot.serial_number),
        ("Size", &snapshot.size),
    ] {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }
    println!(
        "  SMART: {} (switch {})",
        snapshot.smart_status.displayable_name(),
        if snapshot.smart_switch_supported {
            "available"
        } else {
            "unavailable"
        }
    );
    if let Some(health) = &snapshot.health {
        println!("  {}: {}", health.displayable_name, health.readable_value);
    }
    println!(
        "  Self-tests: {:?} | Auto offline: {:?}",
        snapshot.self_test_support, snapshot.auto_offline_status
    );

    if properties {
        for property in device.property_repository().properties() {
            println!(
                "  - [{:?}] {} = {}",
                property.section, property.path, property.readable_value
            );
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
