//! Error vocabulary for the lifecycle engine.
//!
//! Every variant aborts the call that produced it with no state change.
//! Callers match on the variant, or on the stable identifier from
//! [`EngineError::code`] when the error has crossed a process boundary.

use thiserror::Error;

use crate::types::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("ERROR::INVALID_LOCATION: location must be a non-empty descriptor")]
    InvalidLocation,

    #[error("ERROR::INVALID_SEASON_START_TIME: season start must be set")]
    InvalidSeasonStartTime,

    #[error("ERROR::INVALID_SEASON_END_TIME: season end must be set and after the start")]
    InvalidSeasonEndTime,

    #[error("ERROR::INVALID_COVERAGE_DURATION: coverage must last at least one day")]
    InvalidCoverageDuration,

    #[error("ERROR::INVALID_PAYOUT_OPTIONS: expected {expected} cells, got {actual}")]
    InvalidPayoutOptions { expected: usize, actual: usize },

    #[error("ERROR::INVALID_APPLICATION_ID: no application awaiting underwriting for id {0}")]
    InvalidApplicationId(u64),

    #[error("ERROR::INVALID_REQUEST_ID: no pending request for id {0}")]
    InvalidRequestId(u64),

    #[error("ERROR::INVALID_PAYOUT_ID: no payout with id {0}")]
    InvalidPayoutId(u64),

    #[error("ERROR::TOO_FAR_FOR_PAYOUT: distance {distance} exceeds maximum {max}")]
    TooFarForPayout { distance: u32, max: u32 },

    #[error("ERROR::INVALID_CATEGORY: ({category}, {bucket}) is outside the payout table")]
    InvalidCategory { category: u32, bucket: u32 },

    #[error("ERROR::NO_PAYOUT_FOR_BUCKET: cell ({category}, {bucket}) carries no entitlement")]
    NoPayoutForBucket { category: u32, bucket: u32 },

    #[error("ERROR::UNAUTHORIZED: {caller} is not the designated authority")]
    Unauthorized { caller: AccountId },
}

impl EngineError {
    /// Stable identifier surfaced through the failure channel.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidLocation => "ERROR::INVALID_LOCATION",
            EngineError::InvalidSeasonStartTime => "ERROR::INVALID_SEASON_START_TIME",
            EngineError::InvalidSeasonEndTime => "ERROR::INVALID_SEASON_END_TIME",
            EngineError::InvalidCoverageDuration => "ERROR::INVALID_COVERAGE_DURATION",
            EngineError::InvalidPayoutOptions { .. } => "ERROR::INVALID_PAYOUT_OPTIONS",
            EngineError::InvalidApplicationId(_) => "ERROR::INVALID_APPLICATION_ID",
            EngineError::InvalidRequestId(_) => "ERROR::INVALID_REQUEST_ID",
            EngineError::InvalidPayoutId(_) => "ERROR::INVALID_PAYOUT_ID",
            EngineError::TooFarForPayout { .. } => "ERROR::TOO_FAR_FOR_PAYOUT",
            EngineError::InvalidCategory { .. } => "ERROR::INVALID_CATEGORY",
            EngineError::NoPayoutForBucket { .. } => "ERROR::NO_PAYOUT_FOR_BUCKET",
            EngineError::Unauthorized { .. } => "ERROR::UNAUTHORIZED",
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_starts_with_code() {
        let errors = [
            EngineError::InvalidLocation,
            EngineError::InvalidSeasonStartTime,
            EngineError::InvalidSeasonEndTime,
            EngineError::InvalidCoverageDuration,
            EngineError::InvalidPayoutOptions { expected: 21, actual: 9 },
            EngineError::InvalidApplicationId(3),
            EngineError::InvalidRequestId(0),
            EngineError::InvalidPayoutId(4),
            EngineError::TooFarForPayout { distance: 50_000, max: 48_280 },
            EngineError::InvalidCategory { category: 8, bucket: 1 },
            EngineError::NoPayoutForBucket { category: 4, bucket: 2 },
            EngineError::Unauthorized { caller: AccountId::new("0xbeef") },
        ];
        for err in errors {
            let text = err.to_string();
            assert!(text.starts_with(err.code()), "{text} should start with {}", err.code());
        }
    }

    #[test]
    fn no_payout_is_distinct_from_invalid_category() {
        let lookup = EngineError::NoPayoutForBucket { category: 4, bucket: 2 };
        let bounds = EngineError::InvalidCategory { category: 4, bucket: 2 };
        assert_ne!(lookup.code(), bounds.code());
    }
}
