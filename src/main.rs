use std::env;
use std::process;

use anyhow::{bail, Context};
use clap::Parser;
use fpga_hdmi::cli::{Cli, Sub};
use fpga_hdmi::hdmi::{pick_mode, ModeRequest, ModeStatus, OutputDevice, TimingMode};
use fpga_hdmi::registry::DriverRegistry;
use fpga_hdmi::sim::{SimMaster, SimResources};
use fpga_hdmi_config::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| "fpga_hdmi=debug".to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:?}");
            process::exit(1);
        }
    };

    let registry = DriverRegistry::with_builtin_variants();

    let sub = match cli.subcommand {
        Sub::ValidateConfig => return validate_config(&registry, &config),
        sub => sub,
    };

    let mut resources = SimResources::new();
    for (adapter, path) in &cli.edids {
        resources
            .add_edid_file(adapter, path)
            .with_context(|| format!("error setting up adapter {adapter:?}"))?;
    }

    let devices = probe_all(&registry, &config, &resources);

    match sub {
        Sub::Modes { all } => print_modes(&devices, all),
        Sub::Detect => {
            for device in &devices {
                println!("{}: {:?}", device.name(), device.detect(true));
            }
        }
        Sub::Commit { mode, output } => commit(devices, mode, output.as_deref())?,
        Sub::ValidateConfig => (),
    }

    Ok(())
}

fn validate_config(registry: &DriverRegistry, config: &Config) -> anyhow::Result<()> {
    let mut unknown = 0;
    for node in &config.nodes {
        if registry.variant(&node.compatible).is_none() {
            warn!(
                "{}: no driver for compatible {:?}",
                node.display_name(),
                node.compatible
            );
            unknown += 1;
        }
    }

    if unknown > 0 {
        let known: Vec<_> = registry.compatibles().collect();
        bail!("{unknown} nodes have no driver, known compatibles: {known:?}");
    }

    info!("config is valid");
    Ok(())
}

fn probe_all(
    registry: &DriverRegistry,
    config: &Config,
    resources: &SimResources,
) -> Vec<OutputDevice> {
    let mut devices = Vec::new();

    for node in &config.nodes {
        match registry.probe(node, resources, resources) {
            Ok(device) => devices.push(device),
            Err(err) if err.is_deferred() => {
                warn!("{}: probe deferred: {err}", node.display_name());
            }
            Err(err) => {
                warn!("{}: probe failed: {:?}", node.display_name(), anyhow::Error::from(err));
            }
        }
    }

    devices
}

fn print_modes(devices: &[OutputDevice], all: bool) {
    for device in devices {
        let modes = device.modes();
        println!("{}: {} modes", device.name(), modes.len());
        if let Some(identity) = device.identity() {
            println!(
                "  sink: {} {} {}",
                identity.make.as_deref().unwrap_or("Unknown"),
                identity.model.as_deref().unwrap_or("Unknown"),
                identity.serial.as_deref().unwrap_or("Unknown"),
            );
        }

        for mode in &modes {
            match device.mode_valid(Some(mode)) {
                ModeStatus::Ok => println!("  {mode}"),
                ModeStatus::Rejected(reason) if all => println!("  {mode} ({reason})"),
                ModeStatus::Rejected(_) => (),
            }
        }
    }
}

fn commit(
    devices: Vec<OutputDevice>,
    target: Option<ModeRequest>,
    only: Option<&str>,
) -> anyhow::Result<()> {
    let mut master = SimMaster::new();

    for device in devices {
        if only.is_some_and(|name| name != device.name()) {
            continue;
        }

        let modes = device.valid_modes();
        let Some((mode, fallback)) = pick_mode(&modes, target) else {
            warn!("{}: no usable modes, skipping", device.name());
            continue;
        };
        if fallback {
            warn!("{}: falling back to {mode}", device.name());
        }

        let res = commit_one(&device, &mut master, &mode);
        device.remove(&mut master);
        res?;
    }

    if master.live_objects() != 0 {
        bail!("{} compositor objects leaked", master.live_objects());
    }

    Ok(())
}

fn commit_one(
    device: &OutputDevice,
    master: &mut SimMaster,
    mode: &TimingMode,
) -> anyhow::Result<()> {
    device.bind(master)?;
    device
        .mode_set(mode)
        .with_context(|| format!("error programming {mode} on {}", device.name()))?;
    device.enable()?;

    println!(
        "{}: {:?} at {} ({} Hz pixel clock)",
        device.name(),
        device.state(),
        mode.name,
        device.clock_rate().unwrap_or(0)
    );
    Ok(())
}
