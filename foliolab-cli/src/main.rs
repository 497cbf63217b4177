//! FolioLab CLI — portfolio metrics, scenarios, rebalancing and trade patterns.
//!
//! Commands:
//! - `metrics` — value, weights, exposures and concentration of a position set
//! - `scenario` — apply hypothetical changes and report the impact
//! - `rebalance` — build a sequenced, cost- and tax-annotated plan toward a target
//! - `patterns` — classify round-trip trades from an operation history
//! - `fingerprint` — print the input hashes used as plan ids and cache keys
//!
//! Results are pretty JSON on stdout (or `--output`); logs go to stderr.

mod logging;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use foliolab_core::fingerprint::InputHash;
use foliolab_runner::{load_changes, load_operations, load_positions, load_target, Engine};

use logging::{init_logging, LogFormat};

#[derive(Parser)]
#[command(
    name = "foliolab",
    about = "FolioLab CLI — portfolio simulation and rebalancing engine"
)]
struct Cli {
    /// Engine config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write the JSON result here instead of stdout.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Portfolio metrics for a positions file.
    Metrics {
        /// JSON array of broker positions.
        #[arg(long)]
        positions: PathBuf,
    },
    /// Apply hypothetical changes to a position set.
    Scenario {
        #[arg(long)]
        positions: PathBuf,

        /// JSON array of tagged changes.
        #[arg(long)]
        changes: PathBuf,

        /// Cash balance held alongside the positions.
        #[arg(long, default_value_t = 0.0)]
        cash: f64,
    },
    /// Build a rebalancing plan toward a target allocation.
    Rebalance {
        #[arg(long)]
        positions: PathBuf,

        /// JSON target allocation.
        #[arg(long)]
        target: PathBuf,

        /// Mark the plan approved.
        #[arg(long, default_value_t = false, conflicts_with = "reject")]
        approve: bool,

        /// Mark the plan rejected.
        #[arg(long, default_value_t = false)]
        reject: bool,

        /// Valuation date (YYYY-MM-DD) for holding periods. Defaults to today.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Classify round-trip trades from an operation history (JSON or CSV).
    Patterns {
        #[arg(long)]
        operations: PathBuf,
    },
    /// Print input fingerprints.
    Fingerprint {
        #[arg(long)]
        positions: PathBuf,

        /// Include the rebalance key for this target.
        #[arg(long)]
        target: Option<PathBuf>,

        /// Include the scenario key for these changes.
        #[arg(long)]
        changes: Option<PathBuf>,

        #[arg(long, default_value_t = 0.0)]
        cash: f64,

        /// Valuation date (YYYY-MM-DD) folded into the rebalance key.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let mut engine = Engine::from_config_file(cli.config.as_deref()).context("engine config")?;
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Metrics { positions } => {
            let positions = load_positions(&positions)?;
            emit(&engine.metrics(&positions), output)
        }
        Commands::Scenario {
            positions,
            changes,
            cash,
        } => {
            let positions = load_positions(&positions)?;
            let changes = load_changes(&changes)?;
            emit(&engine.scenario(&positions, &changes, cash), output)
        }
        Commands::Rebalance {
            positions,
            target,
            approve,
            reject,
            as_of,
        } => run_rebalance(
            &mut engine,
            &positions,
            &target,
            valuation_time(as_of),
            approve,
            reject,
            output,
        ),
        Commands::Patterns { operations } => {
            let operations = load_operations(&operations)?;
            emit(&engine.patterns(&operations), output)
        }
        Commands::Fingerprint {
            positions,
            target,
            changes,
            cash,
            as_of,
        } => run_fingerprint(
            &engine,
            &positions,
            target.as_deref(),
            changes.as_deref(),
            cash,
            valuation_time(as_of).date_naive(),
            output,
        ),
    }
}

/// Start of day (UTC) on `as_of`, or the current instant.
fn valuation_time(as_of: Option<NaiveDate>) -> DateTime<Utc> {
    as_of
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(Utc::now)
}

fn run_rebalance(
    engine: &mut Engine,
    positions: &Path,
    target: &Path,
    now: DateTime<Utc>,
    approve: bool,
    reject: bool,
    output: Option<&Path>,
) -> Result<()> {
    let positions = load_positions(positions)?;
    let target = load_target(target)?;
    let mut plan = engine
        .rebalance_at(&positions, &target, now)
        .context("build rebalancing plan")?;

    if approve {
        plan.approve()?;
    } else if reject {
        plan.reject()?;
    }

    let summary = plan.summary();
    info!(
        plan = %plan.id().short(),
        trades = summary.trade_count,
        net_cost = summary.net_cost,
        status = %plan.status(),
        "plan ready"
    );
    for warning in &summary.warnings {
        eprintln!("warning: {warning}");
    }
    emit(&plan, output)
}

#[derive(Serialize)]
struct Fingerprints {
    positions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rebalance_key: Option<InputHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario_key: Option<InputHash>,
}

fn run_fingerprint(
    engine: &Engine,
    positions: &Path,
    target: Option<&Path>,
    changes: Option<&Path>,
    cash: f64,
    as_of: NaiveDate,
    output: Option<&Path>,
) -> Result<()> {
    if target.is_none() && changes.is_none() {
        bail!("pass --target and/or --changes to fingerprint");
    }
    let positions = load_positions(positions)?;

    let rebalance_key = match target {
        Some(path) => Some(engine.rebalance_key(&positions, &load_target(path)?, as_of)?),
        None => None,
    };
    let scenario_key = match changes {
        Some(path) => Some(InputHash::scenario_key(&positions, &load_changes(path)?, cash)),
        None => None,
    };

    emit(
        &Fingerprints {
            positions: positions.len(),
            rebalance_key,
            scenario_key,
        },
        output,
    )
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize result")?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
