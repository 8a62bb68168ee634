use std::collections::BTreeMap;

use rand::distr::weighted::WeightedIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Exp, Poisson};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ClaimPolicy, RegimeKind, SimulationConfig};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{Event, LedgerEvent};
use crate::ledger::{ApplicationParams, Coverage};
use crate::payout::{CategoryBucket, DistanceBand, PayoutRegime};
use crate::types::{Amount, Currency, RequestId};

/// How the synthetic oracle reports a storm for a given payout rule.
/// Draws are deliberately wider than the payable range so every rejection
/// path of the engine is exercised.
pub trait StormReport: PayoutRegime {
    /// `(category, measure)` as `policy_status_callback` expects them.
    fn sample_report(&self, rng: &mut impl Rng) -> (u32, u32);
}

impl StormReport for CategoryBucket {
    fn sample_report(&self, rng: &mut impl Rng) -> (u32, u32) {
        // Weaker storms are more common.
        let weights = [30, 22, 16, 12, 9, 7, 4];
        let category = WeightedIndex::new(weights).map_or(1, |w| w.sample(rng) as u32 + 1);
        let bucket = rng.random_range(1..=Self::BUCKETS as u32 + 1);
        (category, bucket)
    }
}

impl StormReport for DistanceBand {
    fn sample_report(&self, rng: &mut impl Rng) -> (u32, u32) {
        let category = rng.random_range(1..=5);
        // Mean closest approach of roughly 25 miles.
        let distance: f64 = Exp::new(1.0 / 40_000.0).map_or(0.0, |d| d.sample(rng));
        (category, distance.min(u32::MAX as f64) as u32)
    }
}

/// Aggregate result of one simulated season.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeasonOutcome {
    pub seed: u64,
    pub applied: usize,
    pub declined: usize,
    pub underwritten: usize,
    pub storms: usize,
    pub payouts: usize,
    pub paid: Amount,
    /// Rejected status callbacks keyed by error code.
    pub rejected: BTreeMap<&'static str, usize>,
}

/// A season: one engine plus the oracle that watches its log and calls back.
pub struct Simulation<R: StormReport> {
    pub engine: Engine<R>,
    config: SimulationConfig,
    rng: ChaCha20Rng,
    /// Next log sequence number the oracle has not yet seen.
    cursor: u64,
    /// Status requests the oracle is still answering, in issue order.
    open: Vec<RequestId>,
    outcome: SeasonOutcome,
}

impl<R: StormReport> Simulation<R> {
    pub fn new(regime: R, config: SimulationConfig) -> Self {
        let engine = Engine::new(regime, config.engine.clone());
        let rng = ChaCha20Rng::seed_from_u64(config.seed);
        let outcome = SeasonOutcome { seed: config.seed, ..SeasonOutcome::default() };
        Simulation { engine, config, rng, cursor: 0, open: Vec::new(), outcome }
    }

    pub fn log(&self) -> &[LedgerEvent] {
        self.engine.events().as_slice()
    }

    pub fn outcome(&self) -> &SeasonOutcome {
        &self.outcome
    }

    /// Play the whole season: file applications, underwrite, then resolve
    /// every storm against every open policy and settle the payouts.
    pub fn run(&mut self, payout_options: &[Amount]) -> &SeasonOutcome {
        self.file_applications(payout_options);
        self.oracle_step();

        let storms = Poisson::new(self.config.storms_per_season)
            .map_or(0, |p| p.sample(&mut self.rng) as usize);
        for storm in 0..storms {
            self.outcome.storms += 1;
            self.resolve_storm(storm);
            self.oracle_step();
        }
        info!(
            seed = self.config.seed,
            applied = self.outcome.applied,
            payouts = self.outcome.payouts,
            paid = self.outcome.paid,
            "season complete"
        );
        &self.outcome
    }

    fn file_applications(&mut self, payout_options: &[Amount]) {
        let start = self.config.season_start;
        let end = self.config.season_end();
        for i in 0..self.config.applications {
            // Caribbean box around Puerto Rico.
            let lat = self.rng.random_range(17.5..19.5);
            let lon = self.rng.random_range(-67.5..-64.0);
            let params = ApplicationParams {
                location: format!("{lat:.7},{lon:.7}"),
                peril_contract_id: "windstorm-atlantic".to_string(),
                coverage: Coverage::Season { start, end },
                premium: self.config.premium,
                currency: Currency(1),
                payout_options: payout_options.to_vec(),
                external_id: format!("customer-{i}"),
            };
            match self.engine.apply_for_policy(params) {
                Ok(_) => self.outcome.applied += 1,
                Err(err) => debug!(code = err.code(), "simulated application rejected"),
            }
        }
    }

    /// Answer every notification published since the last step.
    fn oracle_step(&mut self) {
        let authority = self.config.engine.authority.clone();
        let fresh: Vec<Event> =
            self.engine.events_since(self.cursor).iter().map(|e| e.event.clone()).collect();
        self.cursor += fresh.len() as u64;

        for event in fresh {
            match event {
                Event::ApplicationRequested { request_id } => {
                    let decline = self.rng.random_bool(self.config.decline_probability.clamp(0.0, 1.0));
                    match self.engine.application_callback(&authority, request_id, decline) {
                        Ok(None) => self.outcome.declined += 1,
                        Ok(Some(_)) => self.outcome.underwritten += 1,
                        Err(err) => debug!(code = err.code(), "underwriting failed"),
                    }
                }
                Event::PolicyStatusRequested { request_id, .. } => self.open.push(request_id),
                Event::PayoutRequested { payout_id, amount, .. } => {
                    if self.engine.confirm_payout(&authority, payout_id, amount).is_ok() {
                        self.outcome.paid += amount;
                    }
                }
                Event::PayoutConfirmed { .. } => {}
            }
        }
        // Answered events may have produced new ones.
        if self.engine.events().len() as u64 > self.cursor {
            self.oracle_step();
        }
    }

    fn resolve_storm(&mut self, storm: usize) {
        let authority = self.config.engine.authority.clone();
        let single = self.config.engine.claims == ClaimPolicy::Single;
        let mut still_open = Vec::with_capacity(self.open.len());
        for request_id in std::mem::take(&mut self.open) {
            let (category, measure) = self.engine.regime().sample_report(&mut self.rng);
            match self.engine.policy_status_callback(&authority, request_id, category, measure) {
                Ok(_) => {
                    self.outcome.payouts += 1;
                    if !single {
                        still_open.push(request_id);
                    }
                }
                Err(err) => {
                    *self.outcome.rejected.entry(err.code()).or_insert(0) += 1;
                    if !matches!(err, EngineError::InvalidRequestId(_)) {
                        still_open.push(request_id);
                    }
                }
            }
        }
        debug!(storm, open = still_open.len(), "storm resolved");
        self.open = still_open;
    }
}

/// Run one season for the configured regime, returning the outcome and
/// the full event log.
pub fn run_season(config: SimulationConfig) -> (SeasonOutcome, Vec<LedgerEvent>) {
    match config.regime {
        RegimeKind::CategoryBucket => {
            let options = config.category_options.clone();
            let mut sim = Simulation::new(CategoryBucket, config);
            sim.run(&options);
            (sim.outcome.clone(), sim.log().to_vec())
        }
        RegimeKind::DistanceBand => {
            let options = config.distance_options.clone();
            let mut sim = Simulation::new(DistanceBand::default(), config);
            sim.run(&options);
            (sim.outcome.clone(), sim.log().to_vec())
        }
    }
}

/// `runs` independent seasons with consecutive seeds, in parallel.
pub fn run_many(base: &SimulationConfig, runs: u64) -> Vec<SeasonOutcome> {
    (0..runs)
        .into_par_iter()
        .map(|i| {
            let mut config = base.clone();
            config.seed = base.seed.wrapping_add(i);
            run_season(config).0
        })
        .collect()
}
