use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation token linking an asynchronous request to its callback.
/// `RequestId(0)` is the reserved "invalid" sentinel and is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const INVALID: RequestId = RequestId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// An application is identified by the request id issued when it was filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutId(pub u64);

impl From<RequestId> for ApplicationId {
    fn from(id: RequestId) -> Self {
        ApplicationId(id.0)
    }
}

impl From<ApplicationId> for RequestId {
    fn from(id: ApplicationId) -> Self {
        RequestId(id.0)
    }
}

impl From<RequestId> for PayoutId {
    fn from(id: RequestId) -> Self {
        PayoutId(id.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a caller. The engine only compares identities for equality;
/// it never interprets the contents (usually an address string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wall-clock seconds since the Unix epoch. Zero means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const SECONDS_PER_DAY: u64 = 86_400;

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    pub fn plus_days(self, days: u64) -> Self {
        Timestamp(self.0.saturating_add(days.saturating_mul(Self::SECONDS_PER_DAY)))
    }
}

/// Monetary amount in the minor unit of the application's currency.
pub type Amount = u64;

/// Settlement currency code. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(pub u16);
