use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{Amount, ApplicationId, Currency, PayoutId, RequestId, Timestamp};

/// Descriptor of the insured point, usually `"lat,lon"`. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidLocation);
        }
        Ok(Location(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How long the policy is on risk. Product revisions use one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coverage {
    /// Hurricane season window, in Unix seconds.
    Season { start: Timestamp, end: Timestamp },
    /// Fixed term counted from underwriting.
    Duration { days: u32 },
}

impl Coverage {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Coverage::Season { start, end } => {
                if start.is_unset() {
                    return Err(EngineError::InvalidSeasonStartTime);
                }
                if end.is_unset() || end <= start {
                    return Err(EngineError::InvalidSeasonEndTime);
                }
                Ok(())
            }
            Coverage::Duration { days } => {
                if days == 0 {
                    return Err(EngineError::InvalidCoverageDuration);
                }
                Ok(())
            }
        }
    }
}

/// What an applicant submits. Validated by the engine before anything is
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationParams {
    pub location: String,
    pub peril_contract_id: String,
    pub coverage: Coverage,
    pub premium: Amount,
    pub currency: Currency,
    /// Flat row-major payout table; its length must match the product shape.
    pub payout_options: Vec<Amount>,
    /// Caller's own correlation token. Stored, never interpreted.
    pub external_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Applied,
    Declined,
    Underwritten,
}

/// A filed application. `T` is the payout table shape of the product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application<T> {
    pub id: ApplicationId,
    pub location: Location,
    pub peril_contract_id: String,
    pub coverage: Coverage,
    pub premium: Amount,
    pub currency: Currency,
    pub payout_options: T,
    pub external_id: String,
    pub status: ApplicationStatus,
    /// `RequestId::INVALID` until underwritten.
    pub status_request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub application_id: ApplicationId,
    pub status_request_id: RequestId,
    /// Amount read from the application's table.
    pub amount: Amount,
    /// Amount the settling authority reported; may differ from `amount`.
    pub confirmed_amount: Option<Amount>,
}

impl Payout {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_amount.is_some()
    }
}

/// Append-only store of applications and payouts plus the correlation table
/// of open status requests. Records are never removed.
///
/// The `*_for_*` lookups validate; the mutators assume the caller has
/// already validated through them and only apply the transition.
#[derive(Debug, Clone)]
pub struct PolicyLedger<T> {
    applications: BTreeMap<ApplicationId, Application<T>>,
    payouts: BTreeMap<PayoutId, Payout>,
    /// status request id → application awaiting storm resolution.
    pending_status: BTreeMap<RequestId, ApplicationId>,
}

impl<T> Default for PolicyLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PolicyLedger<T> {
    pub fn new() -> Self {
        PolicyLedger {
            applications: BTreeMap::new(),
            payouts: BTreeMap::new(),
            pending_status: BTreeMap::new(),
        }
    }

    pub fn application(&self, id: ApplicationId) -> Option<&Application<T>> {
        self.applications.get(&id)
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application<T>> {
        self.applications.values()
    }

    pub fn payout(&self, id: PayoutId) -> Option<&Payout> {
        self.payouts.get(&id)
    }

    pub fn payouts(&self) -> impl Iterator<Item = &Payout> {
        self.payouts.values()
    }

    /// Open status requests in id order.
    pub fn pending_status_requests(&self) -> impl Iterator<Item = (RequestId, ApplicationId)> + '_ {
        self.pending_status.iter().map(|(r, a)| (*r, *a))
    }

    pub fn insert_application(&mut self, application: Application<T>) {
        debug_assert!(!self.applications.contains_key(&application.id));
        self.applications.insert(application.id, application);
    }

    /// The application an underwriting callback may act on.
    /// Zero or unknown ids are `InvalidRequestId`; a known application that
    /// has already been decided is `InvalidApplicationId`.
    pub fn application_for_underwriting(&self, request_id: RequestId) -> Result<&Application<T>> {
        if !request_id.is_valid() {
            return Err(EngineError::InvalidRequestId(request_id.0));
        }
        let application = self
            .applications
            .get(&ApplicationId::from(request_id))
            .ok_or(EngineError::InvalidRequestId(request_id.0))?;
        if application.status != ApplicationStatus::Applied {
            return Err(EngineError::InvalidApplicationId(application.id.0));
        }
        Ok(application)
    }

    /// The underwritten application a status request id points at.
    pub fn application_for_status(&self, request_id: RequestId) -> Result<&Application<T>> {
        self.pending_status
            .get(&request_id)
            .and_then(|id| self.applications.get(id))
            .ok_or(EngineError::InvalidRequestId(request_id.0))
    }

    pub fn decline(&mut self, id: ApplicationId) {
        if let Some(application) = self.applications.get_mut(&id) {
            debug_assert_eq!(application.status, ApplicationStatus::Applied);
            application.status = ApplicationStatus::Declined;
        }
    }

    pub fn underwrite(&mut self, id: ApplicationId, status_request_id: RequestId) {
        if let Some(application) = self.applications.get_mut(&id) {
            debug_assert_eq!(application.status, ApplicationStatus::Applied);
            application.status = ApplicationStatus::Underwritten;
            application.status_request_id = status_request_id;
            self.pending_status.insert(status_request_id, id);
        }
    }

    /// Store a new payout. With `close_request` the status request it
    /// answers is taken out of the correlation table.
    pub fn record_payout(&mut self, payout: Payout, close_request: bool) {
        debug_assert!(!self.payouts.contains_key(&payout.id));
        if close_request {
            self.pending_status.remove(&payout.status_request_id);
        }
        self.payouts.insert(payout.id, payout);
    }

    /// Record the settled amount. Repeat confirmations overwrite it.
    pub fn confirm_payout(&mut self, id: PayoutId, amount: Amount) -> Result<&Payout> {
        let payout = self.payouts.get_mut(&id).ok_or(EngineError::InvalidPayoutId(id.0))?;
        payout.confirmed_amount = Some(amount);
        Ok(payout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application(id: u64) -> Application<Vec<Amount>> {
        Application {
            id: ApplicationId(id),
            location: Location::parse("18.3892246,-66.1305132").unwrap(),
            peril_contract_id: "windstorm-atlantic".to_string(),
            coverage: Coverage::Duration { days: 180 },
            premium: 30_000,
            currency: Currency(1),
            payout_options: vec![1, 2, 3],
            external_id: "a1b2c3".to_string(),
            status: ApplicationStatus::Applied,
            status_request_id: RequestId::INVALID,
        }
    }

    #[test]
    fn blank_location_is_invalid() {
        assert_eq!(Location::parse(""), Err(EngineError::InvalidLocation));
        assert_eq!(Location::parse("   "), Err(EngineError::InvalidLocation));
        assert_eq!(Location::parse(" 19.5,-64.2 ").unwrap().as_str(), "19.5,-64.2");
    }

    #[test]
    fn season_validation() {
        let ok = Coverage::Season { start: Timestamp(100), end: Timestamp(200) };
        assert_eq!(ok.validate(), Ok(()));
        let no_start = Coverage::Season { start: Timestamp(0), end: Timestamp(200) };
        assert_eq!(no_start.validate(), Err(EngineError::InvalidSeasonStartTime));
        let no_end = Coverage::Season { start: Timestamp(100), end: Timestamp(0) };
        assert_eq!(no_end.validate(), Err(EngineError::InvalidSeasonEndTime));
        let reversed = Coverage::Season { start: Timestamp(200), end: Timestamp(100) };
        assert_eq!(reversed.validate(), Err(EngineError::InvalidSeasonEndTime));
    }

    #[test]
    fn zero_day_duration_is_invalid() {
        assert_eq!(Coverage::Duration { days: 0 }.validate(), Err(EngineError::InvalidCoverageDuration));
        assert_eq!(Coverage::Duration { days: 1 }.validate(), Ok(()));
    }

    #[test]
    fn underwriting_lookup_distinguishes_unknown_from_decided() {
        let mut ledger = PolicyLedger::new();
        ledger.insert_application(application(1));
        assert!(ledger.application_for_underwriting(RequestId(1)).is_ok());
        assert_eq!(
            ledger.application_for_underwriting(RequestId(0)).unwrap_err(),
            EngineError::InvalidRequestId(0)
        );
        assert_eq!(
            ledger.application_for_underwriting(RequestId(7)).unwrap_err(),
            EngineError::InvalidRequestId(7)
        );
        ledger.decline(ApplicationId(1));
        assert_eq!(
            ledger.application_for_underwriting(RequestId(1)).unwrap_err(),
            EngineError::InvalidApplicationId(1)
        );
    }

    #[test]
    fn underwrite_opens_a_status_request() {
        let mut ledger = PolicyLedger::new();
        ledger.insert_application(application(1));
        ledger.underwrite(ApplicationId(1), RequestId(2));
        let app = ledger.application(ApplicationId(1)).unwrap();
        assert_eq!(app.status, ApplicationStatus::Underwritten);
        assert_eq!(app.status_request_id, RequestId(2));
        assert_eq!(ledger.application_for_status(RequestId(2)).unwrap().id, ApplicationId(1));
        // The application id itself is not a status request id.
        assert!(ledger.application_for_status(RequestId(1)).is_err());
        assert_eq!(ledger.pending_status_requests().collect::<Vec<_>>(), vec![(RequestId(2), ApplicationId(1))]);
    }

    #[test]
    fn closing_payout_removes_the_status_request() {
        let mut ledger = PolicyLedger::new();
        ledger.insert_application(application(1));
        ledger.underwrite(ApplicationId(1), RequestId(2));
        ledger.record_payout(
            Payout {
                id: PayoutId(3),
                application_id: ApplicationId(1),
                status_request_id: RequestId(2),
                amount: 500,
                confirmed_amount: None,
            },
            true,
        );
        assert_eq!(ledger.pending_status_requests().count(), 0);
        assert_eq!(ledger.payout(PayoutId(3)).unwrap().amount, 500);
    }

    #[test]
    fn confirm_overwrites_and_rejects_unknown() {
        let mut ledger: PolicyLedger<Vec<Amount>> = PolicyLedger::new();
        assert_eq!(ledger.confirm_payout(PayoutId(1), 10).unwrap_err(), EngineError::InvalidPayoutId(1));
        ledger.record_payout(
            Payout {
                id: PayoutId(1),
                application_id: ApplicationId(1),
                status_request_id: RequestId(2),
                amount: 500,
                confirmed_amount: None,
            },
            false,
        );
        ledger.confirm_payout(PayoutId(1), 450).unwrap();
        ledger.confirm_payout(PayoutId(1), 480).unwrap();
        let payout = ledger.payout(PayoutId(1)).unwrap();
        assert!(payout.is_confirmed());
        assert_eq!(payout.confirmed_amount, Some(480));
        assert_eq!(payout.amount, 500);
    }
}
