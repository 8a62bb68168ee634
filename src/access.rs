use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::AccountId;

/// The single identity allowed to submit callbacks (underwriting decisions,
/// storm resolutions, settlement confirmations). Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    designated: AccountId,
}

impl Authority {
    pub fn new(designated: AccountId) -> Self {
        Authority { designated }
    }

    pub fn designated(&self) -> &AccountId {
        &self.designated
    }

    /// Checked first by every callback entry point, before any other input.
    pub fn ensure(&self, caller: &AccountId) -> Result<()> {
        if *caller == self.designated {
            Ok(())
        } else {
            Err(EngineError::Unauthorized { caller: caller.clone() })
        }
    }
}
