use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, Amount, Timestamp};

/// Environment variable holding the designated authority, as set by the
/// deployment tooling.
pub const AUTHORITY_VAR: &str = "PRODUCT_CONTROLLER_ADDRESS";
/// Set to `1`/`true` to keep status requests open after a payout.
pub const REPEAT_CLAIMS_VAR: &str = "WINDSTORM_REPEAT_CLAIMS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("unknown payout regime {0:?} (expected category-bucket or distance-band)")]
    UnknownRegime(String),
}

/// Whether one underwritten application can be paid more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimPolicy {
    /// The first payout closes the status request.
    #[default]
    Single,
    /// The status request stays open for later storms.
    Repeated,
}

/// Process-wide engine settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub authority: AccountId,
    #[serde(default)]
    pub claims: ClaimPolicy,
}

impl EngineConfig {
    pub fn new(authority: AccountId) -> Self {
        EngineConfig { authority, claims: ClaimPolicy::default() }
    }

    pub fn with_claims(mut self, claims: ClaimPolicy) -> Self {
        self.claims = claims;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// `from_env` over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let authority = lookup(AUTHORITY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar(AUTHORITY_VAR))?;
        let claims = match lookup(REPEAT_CLAIMS_VAR).as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("false") => ClaimPolicy::Single,
            Some("1") | Some("true") => ClaimPolicy::Repeated,
            Some(other) => {
                return Err(ConfigError::InvalidValue { var: REPEAT_CLAIMS_VAR, value: other.to_string() });
            }
        };
        Ok(EngineConfig { authority: AccountId::new(authority.trim()), claims })
    }
}

/// Which payout rule a simulated product uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegimeKind {
    #[default]
    CategoryBucket,
    DistanceBand,
}

impl FromStr for RegimeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category-bucket" | "category" => Ok(RegimeKind::CategoryBucket),
            "distance-band" | "distance" => Ok(RegimeKind::DistanceBand),
            other => Err(ConfigError::UnknownRegime(other.to_string())),
        }
    }
}

impl fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegimeKind::CategoryBucket => "category-bucket",
            RegimeKind::DistanceBand => "distance-band",
        })
    }
}

/// One simulated hurricane season driven by a synthetic oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub regime: RegimeKind,
    pub engine: EngineConfig,
    /// Applications filed before the season opens.
    pub applications: usize,
    /// Probability the oracle declines an application.
    pub decline_probability: f64,
    pub season_start: Timestamp,
    pub season_days: u32,
    pub premium: Amount,
    /// Poisson λ: expected storms per season.
    pub storms_per_season: f64,
    /// Flat payout table for the category-bucket product (21 cells).
    pub category_options: Vec<Amount>,
    /// Flat payout table for the distance-band product (9 cells).
    pub distance_options: Vec<Amount>,
}

impl SimulationConfig {
    pub fn canonical() -> Self {
        // ── Payout tables ─────────────────────────────────────────────────────
        // Category-bucket: rows are categories 1–7, columns distance buckets
        // closest first. Categories 1–4 carry no entitlement.
        let mut category_options = vec![0; 12];
        category_options.extend([500_000, 200_000, 75_000]);
        category_options.extend([750_000, 350_000, 100_000]);
        category_options.extend([1_000_000, 600_000, 300_000]);

        // Distance-band: rows are 10-mile bands, columns categories 3–5.
        let distance_options = vec![
            120_000, 140_000, 150_000, //  0–10 mi
            90_000, 100_000, 110_000, // 10–20 mi
            60_000, 70_000, 80_000, //   20–30 mi
        ];

        SimulationConfig {
            seed: 42,
            regime: RegimeKind::CategoryBucket,
            engine: EngineConfig::new(AccountId::new("0x0000000000000000000000000000000000c0ffee")),
            applications: 200,
            decline_probability: 0.1,
            // 2024-06-01T00:00:00Z, six-month Atlantic season.
            season_start: Timestamp(1_717_200_000),
            season_days: 183,
            premium: 30_000,
            storms_per_season: 3.0,
            category_options,
            distance_options,
        }
    }

    pub fn season_end(&self) -> Timestamp {
        self.season_start.plus_days(self.season_days as u64)
    }
}
