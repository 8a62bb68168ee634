//! Audit a windstorm event log.
//!
//! Reads `events.ndjson` (or the first positional argument), replays it with
//! the same `LedgerEvent` type the engine writes, and prints the ledger
//! totals followed by PASS/FAIL per integrity invariant. Exits non-zero when
//! any invariant fails.

use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

use anyhow::{Context, Result};
use windstorm::analysis::{summarise, verify_integrity, IntegrityViolation};
use windstorm::events::read_ndjson;

fn main() -> Result<ExitCode> {
    let events_path = std::env::args().nth(1).unwrap_or_else(|| "events.ndjson".to_string());
    let file = File::open(&events_path)
        .with_context(|| format!("cannot open {events_path}; run `cargo run --release` first"))?;
    let events = read_ndjson(BufReader::new(file)).with_context(|| format!("reading {events_path}"))?;

    let stats = summarise(&events);
    println!("=== {events_path}: {} events ===", events.len());
    println!("  Applications:        {}", stats.applications);
    println!("  Underwritten:        {}", stats.underwritten);
    println!("  Payouts requested:   {} ({})", stats.payouts_requested, stats.requested_amount);
    println!("  Payouts confirmed:   {} ({})", stats.payouts_confirmed, stats.confirmed_amount);
    println!("  Adjusted on confirm: {}", stats.adjusted_confirmations);

    let violations = verify_integrity(&events);
    let inv = |variant: fn(&IntegrityViolation) -> bool| {
        if violations.iter().any(variant) { "FAIL" } else { "PASS" }
    };

    println!("\n=== Integrity invariants ===");
    println!("  [1] Sequence numbers contiguous:          {}", inv(|v| matches!(v, IntegrityViolation::SequenceGap { .. })));
    println!("  [2] Correlation ids strictly increasing:  {}", inv(|v| matches!(v, IntegrityViolation::IdNotIncreasing { .. })));
    println!("  [3] Correlation ids never reused:         {}", inv(|v| matches!(v, IntegrityViolation::DuplicateId { .. })));
    println!("  [4] Status request has an application:    {}", inv(|v| matches!(v, IntegrityViolation::StatusWithoutApplication { .. })));
    println!("  [5] Application underwritten once:        {}", inv(|v| matches!(v, IntegrityViolation::DuplicateUnderwriting { .. })));
    println!("  [6] Payout has an underwritten policy:    {}", inv(|v| matches!(v, IntegrityViolation::PayoutWithoutStatus { .. })));
    println!("  [7] Payout amount > 0:                    {}", inv(|v| matches!(v, IntegrityViolation::ZeroPayout { .. })));
    println!("  [8] Confirmation has a requested payout:  {}", inv(|v| matches!(v, IntegrityViolation::ConfirmationWithoutPayout { .. })));

    if violations.is_empty() {
        println!("  All integrity invariants: PASS");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\n  {} violation(s):", violations.len());
        for v in &violations {
            println!("    {v}");
        }
        Ok(ExitCode::FAILURE)
    }
}
