//! # EMBER CLI
//!
//! Plans the memory map of a configured system and drives the simulated
//! lifecycle manager through mode transitions.
//!
//! # Usage
//!
//! ```bash
//! # Print the planned layout (fails if the system does not fit)
//! ember --config config/ember.toml plan
//!
//! # Machine-readable layout for CI checks
//! ember --config config/ember.toml plan --format json
//!
//! # Walk through modes, with bulk_mem failing to power up
//! ember --config config/ember.toml run --mode work --mode idle --fail-resource bulk_mem
//!
//! # Verbose / JSON logging
//! ember --config config/ember.toml -v --json run --mode work
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ember_common::config::{ConfigError, ConfigLoader, LogLevel, SystemConfig};
use ember_common::consts::DEFAULT_CONFIG_PATH;
use ember_common::ids::{SubsystemId, SubsystemSet};
use ember_lifecycle::power::PowerError;
use ember_lifecycle::simulation::{SimulatedPower, build_simulated_system};
use ember_lifecycle::{LifecycleManager, TransitionReport};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// EMBER - static arena planner and mode lifecycle simulator
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Static memory arena planner and mode-aware lifecycle simulator")]
#[command(long_about = None)]
struct Args {
    /// Path to the system configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan the memory map and print it.
    Plan {
        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Boot the simulated system and transition through modes.
    Run {
        /// Mode to enter (repeatable, applied in order).
        #[arg(short, long = "mode", action = clap::ArgAction::Append)]
        modes: Vec<String>,

        /// Resource whose enable always faults (repeatable).
        #[arg(long = "fail-resource", action = clap::ArgAction::Append)]
        fail_resources: Vec<String>,

        /// Resource whose enable exceeds the timeout (repeatable).
        #[arg(long = "slow-resource", action = clap::ArgAction::Append)]
        slow_resources: Vec<String>,

        /// Finish with a transition to the fail-safe mode.
        #[arg(long)]
        recover: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("ember failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Tracing comes up even when the config fails to load.
    let loaded = SystemConfig::load(&args.config);
    setup_tracing(&args, startup_level(&loaded));
    let config = loaded?;
    config.validate()?;

    info!(
        "EMBER v{} loaded {} ({} subsystems)",
        env!("CARGO_PKG_VERSION"),
        args.config.display(),
        config.subsystems.len()
    );

    let power = SimulatedPower::new();
    let probe = power.probe();

    match &args.command {
        Command::Plan { format } => {
            let system = build_simulated_system(&config, power)?;
            match format {
                Format::Json => {
                    println!("{}", ember_arena::layout_to_json(system.manager.layout())?);
                }
                Format::Text => print_layout(&system.manager),
            }
        }
        Command::Run {
            modes,
            fail_resources,
            slow_resources,
            recover,
        } => {
            let catalog = config.catalog()?;
            for name in fail_resources {
                let resource = catalog
                    .resource_id(name)
                    .ok_or_else(|| format!("unknown resource '{name}'"))?;
                probe.inject_fault(resource, PowerError::Fault("injected by --fail-resource"));
            }
            for name in slow_resources {
                let resource = catalog
                    .resource_id(name)
                    .ok_or_else(|| format!("unknown resource '{name}'"))?;
                let timeout = config.lifecycle.power_enable_timeout();
                probe.set_latency(resource, timeout + Duration::from_millis(1));
            }

            let system = build_simulated_system(&config, power)?;
            let manager = &system.manager;
            if let Some(report) = manager.last_report() {
                print_report(manager, &report);
            }
            for name in modes {
                let mode = manager
                    .catalog()
                    .mode_id(name)
                    .ok_or_else(|| format!("unknown mode '{name}'"))?;
                let report = manager.transition_to(mode)?;
                print_report(manager, &report);
            }
            if *recover {
                let report = manager.recover()?;
                print_report(manager, &report);
            }
        }
    }

    info!("EMBER shutdown complete");
    Ok(())
}

fn print_layout(manager: &LifecycleManager) {
    let layout = manager.layout();
    for class in layout.classes() {
        let usage = layout.usage(class.id);
        let (used, capacity) = usage.map_or((0, class.capacity), |u| (u.used, u.capacity));
        println!("{} ({used}/{capacity} bytes)", class.name);
        for region in layout.regions_in(class.id) {
            let names: Vec<&str> = region
                .occupants
                .iter()
                .map(|s| manager.subsystem_name(s))
                .collect();
            println!(
                "  [{:>6}..{:>6}) align {:>2} {:<9} {}",
                region.offset,
                region.end(),
                region.align,
                if region.is_union() { "union" } else { "dedicated" },
                names.join(" | ")
            );
        }
    }
    for (index, d) in manager.descriptors().iter().enumerate() {
        if manager.region_of(SubsystemId::from_index(index)).is_none() {
            println!("  (never constructible) {}", d.name);
        }
    }
}

fn print_report(manager: &LifecycleManager, report: &TransitionReport) {
    let catalog = manager.catalog();
    let names = |set: SubsystemSet| {
        set.iter()
            .map(|s| manager.subsystem_name(s).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!(
        "{} -> {}: {:?} in {:?}",
        report.from.map_or("-", |m| catalog.mode_name(m)),
        catalog.mode_name(report.to),
        report.outcome(),
        report.duration
    );
    println!("  active:      {}", names(report.active));
    println!("  constructed: {}", names(report.constructed));
    println!("  destroyed:   {}", names(report.destroyed));
    println!("  refreshed:   {}", names(report.refreshed));
    for failure in &report.failures {
        println!(
            "  omitted {}: {}",
            manager.subsystem_name(failure.subsystem),
            failure.error
        );
    }
}

/// Configured log level, or the default when the config did not load.
fn startup_level(loaded: &Result<SystemConfig, ConfigError>) -> Level {
    loaded
        .as_ref()
        .map_or(LogLevel::default(), |c| c.shared.log_level)
        .into()
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, configured: Level) {
    let level = if args.verbose { Level::DEBUG } else { configured };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
