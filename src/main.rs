use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use windstorm::analysis::{self, IntegrityViolation, LedgerStats};
use windstorm::config::{EngineConfig, RegimeKind, SimulationConfig, AUTHORITY_VAR};
use windstorm::events::write_ndjson;
use windstorm::simulation::{self, SeasonOutcome};

/// Simulate hurricane seasons against the parametric windstorm engine.
#[derive(Debug, Parser)]
#[command(name = "windstorm", version)]
struct Args {
    /// JSON simulation config; defaults to the canonical season.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Number of applications filed per season.
    #[arg(long)]
    applications: Option<usize>,

    /// Payout rule: category-bucket or distance-band.
    #[arg(long)]
    regime: Option<RegimeKind>,

    /// Run N seasons with consecutive seeds in parallel and print a summary.
    #[arg(long)]
    runs: Option<u64>,

    /// Event log path for a single run.
    #[arg(long, default_value = "events.ndjson")]
    output: PathBuf,

    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimulationConfig::canonical(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(n) = args.applications {
        config.applications = n;
    }
    if let Some(regime) = args.regime {
        config.regime = regime;
    }
    // The deployment environment, when present, names the authority.
    if std::env::var_os(AUTHORITY_VAR).is_some() {
        config.engine = EngineConfig::from_env().context("loading engine config from environment")?;
    }

    match args.runs {
        Some(runs) => {
            let outcomes = simulation::run_many(&config, runs);
            if !args.quiet {
                print_runs(&outcomes);
            }
        }
        None => {
            let (outcome, log) = simulation::run_season(config);
            let file = File::create(&args.output)
                .with_context(|| format!("creating {}", args.output.display()))?;
            write_ndjson(&mut BufWriter::new(file), &log)
                .with_context(|| format!("writing {}", args.output.display()))?;

            if !args.quiet {
                println!("Events written: {} → {}", log.len(), args.output.display());
                print_outcome(&outcome);
                print_ledger(&analysis::summarise(&log), &analysis::verify_integrity(&log));
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &SeasonOutcome) {
    println!("\n=== Season (seed {}) ===", outcome.seed);
    println!("  Applications filed:  {}", outcome.applied);
    println!("  Declined:            {}", outcome.declined);
    println!("  Underwritten:        {}", outcome.underwritten);
    println!("  Storms:              {}", outcome.storms);
    println!("  Payouts:             {}", outcome.payouts);
    println!("  Paid:                {}", outcome.paid);
    if !outcome.rejected.is_empty() {
        println!("  Rejected resolutions:");
        for (code, n) in &outcome.rejected {
            println!("    {code:<32} {n}");
        }
    }
}

fn print_ledger(stats: &LedgerStats, violations: &[IntegrityViolation]) {
    println!("\n=== Ledger ===");
    println!("  Requested amount:    {}", stats.requested_amount);
    println!("  Confirmed amount:    {}", stats.confirmed_amount);
    println!("  Unconfirmed payouts: {}", stats.unconfirmed());
    if violations.is_empty() {
        println!("  Integrity invariants: PASS");
    } else {
        println!("  Integrity invariants: FAIL ({} violation(s))", violations.len());
        for v in violations {
            println!("    {v}");
        }
    }
}

fn print_runs(outcomes: &[SeasonOutcome]) {
    if outcomes.is_empty() {
        return;
    }
    println!("{:>8} {:>8} {:>8} {:>8} {:>14}", "seed", "storms", "written", "payouts", "paid");
    for o in outcomes {
        println!("{:>8} {:>8} {:>8} {:>8} {:>14}", o.seed, o.storms, o.underwritten, o.payouts, o.paid);
    }
    let paid: Vec<u64> = outcomes.iter().map(|o| o.paid).collect();
    let mean = paid.iter().sum::<u64>() as f64 / paid.len() as f64;
    let min = paid.iter().min().copied().unwrap_or(0);
    let max = paid.iter().max().copied().unwrap_or(0);
    println!("\nPaid per season: min={min} mean={mean:.0} max={max} over {} runs", paid.len());
}
