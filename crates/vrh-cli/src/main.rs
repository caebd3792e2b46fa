//! VRH CLI
//!
//! Command-line driver for the VRH governance accounting engine.
//!
//! ```text
//! vrh simulate demos/scenario.json --config demos/protocol.toml
//! vrh schedule --years 8
//! vrh info
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vrh_core::prelude::*;
use vrh_economics::constants::{NAME, SYMBOL};
use vrh_economics::{EmissionToken, Ledger, Operation, Outcome, ProtocolConfig, Request, Response};

#[derive(Parser)]
#[command(name = "vrh")]
#[command(author = "VRH DAO Contributors")]
#[command(version = "0.1.0")]
#[command(about = "VRH - vote-escrowed guild rewards engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Protocol configuration file (TOML)
    #[arg(short, long, global = true, env = "VRH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario through a fresh deployment
    Simulate {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Pretty-print each response
        #[arg(long)]
        pretty: bool,
    },

    /// Print the emission schedule
    Schedule {
        /// Number of mining epochs
        #[arg(short, long, default_value = "10")]
        years: u32,
    },

    /// Show protocol constants and configuration
    Info,
}

/// A scenario file
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Deployer; holds every admin role and the initial supply
    #[serde(default = "default_admin")]
    admin: Address,

    /// Deployment timestamp
    #[serde(default = "default_start")]
    start: Timestamp,

    steps: Vec<Step>,
}

fn default_admin() -> Address {
    Address::from_label("admin")
}

fn default_start() -> Timestamp {
    1_600_000_000
}

/// One call, optionally preceded by moving the clock
#[derive(Debug, Deserialize)]
struct Step {
    /// Seconds to advance before the call
    #[serde(default)]
    advance: u64,

    /// Then advance to the next multiple of this period
    #[serde(default)]
    boundary: Option<u64>,

    caller: Address,

    /// An `Operation`; strings of the form "$name" refer to saved addresses
    call: Box<RawValue>,

    /// Remember the address this call returns under `name`
    #[serde(default)]
    save: Option<String>,
}

#[derive(Serialize)]
struct StepReport<'a> {
    step: usize,
    caller: Address,
    response: &'a Response,
}

fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries responses
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ProtocolConfig> {
    match path {
        Some(path) => {
            let config = ProtocolConfig::load(path)?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => Ok(ProtocolConfig::default()),
    }
}

/// Replace every `"$name"` string with the saved address
fn substitute(call: &str, saved: &HashMap<String, Address>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(call.len());
    let mut rest = call;
    while let Some(pos) = rest.find("\"$") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 2..];
        let end = tail
            .find('"')
            .context("unterminated reference")?;
        let name = &tail[..end];
        let address = saved
            .get(name)
            .with_context(|| format!("unknown reference ${name}"))?;
        out.push('"');
        out.push_str(&address.to_hex());
        out.push('"');
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn simulate(config: ProtocolConfig, path: &Path, pretty: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .with_context(|| format!("parsing scenario {}", path.display()))?;

    tracing::info!(
        admin = %scenario.admin,
        start = scenario.start,
        steps = scenario.steps.len(),
        "Running scenario"
    );

    let ledger = Ledger::new(scenario.admin, config, ManualClock::new(scenario.start))?;
    let mut saved = HashMap::new();
    let mut reverted = 0;

    for (index, step) in scenario.steps.iter().enumerate() {
        if step.advance > 0 {
            ledger.clock().advance(step.advance);
        }
        if let Some(period) = step.boundary {
            if period == 0 {
                bail!("step {index}: boundary must be positive");
            }
            ledger.clock().advance_to_boundary(period);
        }

        let call = substitute(step.call.get(), &saved).with_context(|| format!("step {index}"))?;
        let op: Operation = serde_json::from_str(&call)
            .with_context(|| format!("step {index}: invalid call {call}"))?;
        let response = ledger.submit(Request::new(step.caller, op));

        match (&response.outcome, &step.save) {
            (Ok(Outcome::Address(address)), Some(name)) => {
                tracing::debug!(step = index, %name, %address, "Saved address");
                saved.insert(name.clone(), *address);
            }
            (Ok(_), Some(name)) => {
                bail!("step {index}: only address outcomes can be saved as ${name}")
            }
            (Err(err), _) => {
                reverted += 1;
                tracing::warn!(step = index, code = err.code(), "Step reverted: {}", err);
            }
            (Ok(_), None) => {}
        }

        let report = StepReport {
            step: index,
            caller: step.caller,
            response: &response,
        };
        let line = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{line}");
    }

    let now = ledger.clock().now();
    ledger.view(|dao| {
        tracing::info!(
            now,
            reverted,
            supply = dao.token().ledger().total_supply(),
            locked = dao.escrow().supply(),
            guilds = dao.controller().guild_count(),
            "Scenario finished"
        );
    });
    Ok(())
}

/// Whole tokens with six decimals
fn tokens(value: Amount) -> String {
    format!("{}.{:06}", value / ONE, value % ONE / 1_000_000_000_000)
}

fn schedule(config: &ProtocolConfig, years: u32) -> anyhow::Result<()> {
    let params = config.emission.clone();
    // deploy one epoch in so the first epoch start does not underflow
    let deployed = params.rate_reduction_time;
    let mut token = EmissionToken::new(
        Address::from_label("token"),
        NAME,
        SYMBOL,
        default_admin(),
        params.clone(),
        deployed,
    )?;

    println!(
        "{:>5}  {:>12}  {:>22}  {:>26}  {:>26}",
        "epoch", "starts (s)", "rate (VRH/s)", "epoch emission (VRH)", "supply at start (VRH)"
    );
    let mut now = deployed + params.inflation_delay;
    for _ in 0..years {
        let update = token.update_mining_parameters(now)?;
        println!(
            "{:>5}  {:>12}  {:>22}  {:>26}  {:>26}",
            token.mining_epoch(),
            update.time - deployed,
            tokens(update.rate),
            tokens(update.rate * u128::from(params.rate_reduction_time)),
            tokens(update.supply),
        );
        now += params.rate_reduction_time;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate { scenario, pretty } => {
            simulate(config, &scenario, pretty)?;
        }

        Commands::Schedule { years } => {
            schedule(&config, years)?;
        }

        Commands::Info => {
            println!("{} ({})", NAME, SYMBOL);
            println!();
            println!("Constants:");
            println!("  WEEK:    {} s", WEEK);
            println!("  MONTH:   {} s (vesting period)", MONTH);
            println!("  YEAR:    {} s (mining epoch)", YEAR);
            println!("  MAXTIME: {} s (longest lock)", MAXTIME);
            println!("  Decimals: {}", DECIMALS);
            println!();
            println!("Emission:");
            println!(
                "  Initial supply: {} {}",
                tokens(config.emission.initial_supply()),
                SYMBOL
            );
            println!(
                "  Initial rate:   {} {}/s",
                tokens(config.emission.initial_rate()),
                SYMBOL
            );
            println!("  Max boost:      {:.2}x", config.guild.max_boost());
            println!();
            println!("Configuration:");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
