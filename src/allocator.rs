use serde::{Deserialize, Serialize};

use crate::types::RequestId;

/// Issues correlation ids for every request kind (application, status,
/// payout) from one counter. Ids start at 1 and are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdAllocator {
    last_issued: u64,
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        RequestIdAllocator { last_issued: 0 }
    }

    /// The id the next call to `allocate` will return.
    pub fn peek(&self) -> RequestId {
        RequestId(self.last_issued + 1)
    }

    pub fn last_issued(&self) -> Option<RequestId> {
        (self.last_issued > 0).then_some(RequestId(self.last_issued))
    }

    /// Only call once every validation for the operation has passed: an
    /// allocated id is burned even if the caller later discards it.
    pub fn allocate(&mut self) -> RequestId {
        self.last_issued += 1;
        RequestId(self.last_issued)
    }
}
