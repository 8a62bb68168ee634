use tracing::{debug, info, warn};

use crate::access::Authority;
use crate::allocator::RequestIdAllocator;
use crate::config::{ClaimPolicy, EngineConfig};
use crate::error::Result;
use crate::events::{Event, EventLog, LedgerEvent};
use crate::ledger::{Application, ApplicationParams, ApplicationStatus, Location, Payout, PolicyLedger};
use crate::payout::PayoutRegime;
use crate::types::{AccountId, Amount, ApplicationId, PayoutId, RequestId};

/// Lifecycle state machine for one parametric windstorm product.
///
/// Four entry points drive every transition:
///
/// | call                     | caller    | emits                   |
/// |--------------------------|-----------|-------------------------|
/// | `apply_for_policy`       | anyone    | `ApplicationRequested`  |
/// | `application_callback`   | authority | `PolicyStatusRequested` (unless declined) |
/// | `policy_status_callback` | authority | `PayoutRequested`       |
/// | `confirm_payout`         | authority | `PayoutConfirmed`       |
///
/// Each call validates everything before touching state: an `Err` leaves
/// the ledger, the id counter and the event log exactly as they were.
#[derive(Debug)]
pub struct Engine<R: PayoutRegime> {
    regime: R,
    authority: Authority,
    claims: ClaimPolicy,
    ids: RequestIdAllocator,
    ledger: PolicyLedger<R::Table>,
    log: EventLog,
}

impl<R: PayoutRegime> Engine<R> {
    pub fn new(regime: R, config: EngineConfig) -> Self {
        info!(
            regime = R::NAME,
            authority = %config.authority,
            claims = ?config.claims,
            "engine initialised"
        );
        Engine {
            regime,
            authority: Authority::new(config.authority),
            claims: config.claims,
            ids: RequestIdAllocator::new(),
            ledger: PolicyLedger::new(),
            log: EventLog::new(),
        }
    }

    // ── Entry points ─────────────────────────────────────────────────────────

    /// File an application. Public: no authority check.
    ///
    /// Validation order: location, coverage, payout table shape. On success
    /// the new id is both the application's identity and the correlation
    /// token of the `ApplicationRequested` notification.
    pub fn apply_for_policy(&mut self, params: ApplicationParams) -> Result<RequestId> {
        let (location, payout_options) = self.check_application(&params).inspect_err(|err| {
            warn!(code = err.code(), external_id = %params.external_id, "application rejected");
        })?;

        let request_id = self.ids.allocate();
        let id = ApplicationId::from(request_id);
        self.ledger.insert_application(Application {
            id,
            location,
            peril_contract_id: params.peril_contract_id,
            coverage: params.coverage,
            premium: params.premium,
            currency: params.currency,
            payout_options,
            external_id: params.external_id,
            status: ApplicationStatus::Applied,
            status_request_id: RequestId::INVALID,
        });
        self.log.emit(Event::ApplicationRequested { request_id });
        info!(%request_id, "application requested");
        Ok(request_id)
    }

    /// Underwriting decision for an application in `Applied`.
    ///
    /// Declining is terminal and silent. Accepting opens a status request
    /// under a fresh id, returned here and carried by
    /// `PolicyStatusRequested`; the application id is never accepted in
    /// its place.
    pub fn application_callback(
        &mut self,
        caller: &AccountId,
        request_id: RequestId,
        decline: bool,
    ) -> Result<Option<RequestId>> {
        self.authorize(caller, "application_callback")?;
        let id = self
            .ledger
            .application_for_underwriting(request_id)
            .map(|application| application.id)
            .inspect_err(|err| warn!(code = err.code(), %request_id, "underwriting callback rejected"))?;

        if decline {
            self.ledger.decline(id);
            info!(application_id = %id, "application declined");
            return Ok(None);
        }

        let status_request_id = self.ids.allocate();
        self.ledger.underwrite(id, status_request_id);
        self.log.emit(Event::PolicyStatusRequested {
            request_id: status_request_id,
            application_id: id,
        });
        info!(application_id = %id, %status_request_id, "policy underwritten, status requested");
        Ok(Some(status_request_id))
    }

    /// Storm resolution for a pending status request. `category` and
    /// `measure` are interpreted by the product's regime.
    ///
    /// A zero cell is `NoPayoutForBucket` and leaves the request open, so
    /// the oracle may report a later storm against it.
    pub fn policy_status_callback(
        &mut self,
        caller: &AccountId,
        request_id: RequestId,
        category: u32,
        measure: u32,
    ) -> Result<(PayoutId, Amount)> {
        self.authorize(caller, "policy_status_callback")?;
        let (application_id, amount) = self
            .ledger
            .application_for_status(request_id)
            .and_then(|application| {
                let amount = self.regime.resolve(&application.payout_options, category, measure)?;
                Ok((application.id, amount))
            })
            .inspect_err(|err| {
                warn!(code = err.code(), %request_id, category, measure, "status callback rejected")
            })?;
        debug!(%application_id, category, measure, amount, "payout cell resolved");

        let payout_id = PayoutId::from(self.ids.allocate());
        self.ledger.record_payout(
            Payout {
                id: payout_id,
                application_id,
                status_request_id: request_id,
                amount,
                confirmed_amount: None,
            },
            self.claims == ClaimPolicy::Single,
        );
        self.log.emit(Event::PayoutRequested { payout_id, application_id, amount });
        info!(%application_id, %payout_id, amount, "payout requested");
        Ok((payout_id, amount))
    }

    /// Record that settlement happened. The reported amount is trusted as
    /// given and may differ from the computed one; confirming again
    /// overwrites it.
    pub fn confirm_payout(&mut self, caller: &AccountId, payout_id: PayoutId, amount: Amount) -> Result<()> {
        self.authorize(caller, "confirm_payout")?;
        let payout = self
            .ledger
            .confirm_payout(payout_id, amount)
            .inspect_err(|err| warn!(code = err.code(), %payout_id, "payout confirmation rejected"))?;
        if payout.amount != amount {
            warn!(%payout_id, computed = payout.amount, confirmed = amount, "confirmed amount differs from table");
        }
        self.log.emit(Event::PayoutConfirmed { payout_id, amount });
        info!(%payout_id, amount, "payout confirmed");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn regime(&self) -> &R {
        &self.regime
    }

    pub fn authority(&self) -> &AccountId {
        self.authority.designated()
    }

    pub fn application(&self, id: ApplicationId) -> Option<&Application<R::Table>> {
        self.ledger.application(id)
    }

    pub fn payout(&self, id: PayoutId) -> Option<&Payout> {
        self.ledger.payout(id)
    }

    pub fn ledger(&self) -> &PolicyLedger<R::Table> {
        &self.ledger
    }

    /// The id the next successful allocating call will issue.
    pub fn next_request_id(&self) -> RequestId {
        self.ids.peek()
    }

    pub fn events(&self) -> &EventLog {
        &self.log
    }

    /// Notifications with `seq >= cursor`, for an oracle polling the log.
    pub fn events_since(&self, cursor: u64) -> &[LedgerEvent] {
        self.log.since(cursor)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn authorize(&self, caller: &AccountId, operation: &'static str) -> Result<()> {
        self.authority
            .ensure(caller)
            .inspect_err(|_| warn!(%caller, operation, "unauthorized callback"))
    }

    fn check_application(&self, params: &ApplicationParams) -> Result<(Location, R::Table)> {
        let location = Location::parse(&params.location)?;
        params.coverage.validate()?;
        let table = self.regime.table_from(&params.payout_options)?;
        Ok((location, table))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::EngineError;
    use crate::ledger::Coverage;
    use crate::payout::{CategoryBucket, DistanceBand};
    use crate::types::{Currency, Timestamp};

    fn oracle() -> AccountId {
        AccountId::new("0xoracle")
    }

    fn stranger() -> AccountId {
        AccountId::new("0xstranger")
    }

    fn brochure_options() -> Vec<Amount> {
        let mut options = vec![0; 12];
        options.extend([500_000, 200_000, 75_000, 750_000, 350_000, 100_000, 1_000_000, 600_000, 300_000]);
        options
    }

    fn params(location: &str, payout_options: Vec<Amount>) -> ApplicationParams {
        ApplicationParams {
            location: location.to_string(),
            peril_contract_id: "windstorm-atlantic".to_string(),
            coverage: Coverage::Season { start: Timestamp(1_700_000_000), end: Timestamp(1_715_000_000) },
            premium: 30_000,
            currency: Currency(1),
            payout_options,
            external_id: "a1b2c3".to_string(),
        }
    }

    fn category_engine() -> Engine<CategoryBucket> {
        Engine::new(CategoryBucket, EngineConfig::new(oracle()))
    }

    /// Apply and underwrite; returns (application id, status request id).
    fn underwritten(engine: &mut Engine<CategoryBucket>) -> (RequestId, RequestId) {
        let app = engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
        let status = engine.application_callback(&oracle(), app, false).unwrap().unwrap();
        (app, status)
    }

    // ── apply_for_policy ─────────────────────────────────────────────────────

    #[test]
    fn apply_creates_applied_application_and_event() {
        let mut engine = category_engine();
        let id = engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
        assert_eq!(id, RequestId(1));
        let app = engine.application(ApplicationId(1)).unwrap();
        assert_eq!(app.status, ApplicationStatus::Applied);
        assert_eq!(app.status_request_id, RequestId::INVALID);
        assert_eq!(app.payout_options.to_vec(), brochure_options());
        assert_eq!(
            engine.events().last().unwrap().event,
            Event::ApplicationRequested { request_id: RequestId(1) }
        );
    }

    #[test]
    fn empty_location_fails_without_allocating() {
        let mut engine = category_engine();
        let before = engine.next_request_id();
        let err = engine.apply_for_policy(params("", brochure_options())).unwrap_err();
        assert_eq!(err, EngineError::InvalidLocation);
        assert_eq!(engine.next_request_id(), before);
        assert!(engine.events().is_empty());
        assert_eq!(engine.ledger().applications().count(), 0);
    }

    #[test]
    fn location_is_checked_before_coverage() {
        let mut engine = category_engine();
        let mut p = params("", brochure_options());
        p.coverage = Coverage::Season { start: Timestamp(0), end: Timestamp(0) };
        assert_eq!(engine.apply_for_policy(p).unwrap_err(), EngineError::InvalidLocation);
    }

    #[test]
    fn season_errors_surface_in_order() {
        let mut engine = category_engine();
        let mut p = params("18.38,-66.13", brochure_options());
        p.coverage = Coverage::Season { start: Timestamp(0), end: Timestamp(10) };
        assert_eq!(engine.apply_for_policy(p.clone()).unwrap_err(), EngineError::InvalidSeasonStartTime);
        p.coverage = Coverage::Season { start: Timestamp(10), end: Timestamp(0) };
        assert_eq!(engine.apply_for_policy(p).unwrap_err(), EngineError::InvalidSeasonEndTime);
        assert_eq!(engine.next_request_id(), RequestId(1));
    }

    #[test]
    fn wrong_table_shape_is_rejected() {
        let mut engine = category_engine();
        let err = engine.apply_for_policy(params("18.38,-66.13", vec![1; 9])).unwrap_err();
        assert_eq!(err, EngineError::InvalidPayoutOptions { expected: 21, actual: 9 });
        assert!(engine.events().is_empty());
    }

    // ── application_callback ─────────────────────────────────────────────────

    #[test]
    fn zero_request_id_is_invalid() {
        let mut engine = category_engine();
        engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
        let events = engine.events().len();
        let err = engine.application_callback(&oracle(), RequestId(0), false).unwrap_err();
        assert_eq!(err.code(), "ERROR::INVALID_REQUEST_ID");
        assert_eq!(engine.events().len(), events);
    }

    #[test]
    fn decline_is_terminal_and_silent() {
        let mut engine = category_engine();
        let app = engine.apply_for_policy(params("19.57,-64.24", brochure_options())).unwrap();
        let events = engine.events().len();
        assert_eq!(engine.application_callback(&oracle(), app, true), Ok(None));
        assert_eq!(engine.events().len(), events);
        assert_eq!(engine.application(app.into()).unwrap().status, ApplicationStatus::Declined);
        assert_eq!(
            engine.application_callback(&oracle(), app, false),
            Err(EngineError::InvalidApplicationId(app.0))
        );
    }

    #[test]
    fn underwriting_issues_a_fresh_status_id() {
        let mut engine = category_engine();
        let (app, status) = underwritten(&mut engine);
        assert_ne!(app, status);
        assert!(status > app);
        assert_eq!(
            engine.events().last().unwrap().event,
            Event::PolicyStatusRequested { request_id: status, application_id: app.into() }
        );
        let record = engine.application(app.into()).unwrap();
        assert_eq!(record.status, ApplicationStatus::Underwritten);
        assert_eq!(record.status_request_id, status);
    }

    #[test]
    fn underwriting_twice_fails() {
        let mut engine = category_engine();
        let (app, _) = underwritten(&mut engine);
        assert_eq!(
            engine.application_callback(&oracle(), app, false),
            Err(EngineError::InvalidApplicationId(app.0))
        );
    }

    // ── policy_status_callback ───────────────────────────────────────────────

    #[test]
    fn category_seven_bucket_two_pays_from_table() {
        let mut engine = category_engine();
        let (app, status) = underwritten(&mut engine);
        let (payout_id, amount) = engine.policy_status_callback(&oracle(), status, 7, 2).unwrap();
        assert_eq!(amount, 600_000);
        assert!(payout_id.0 > status.0);
        assert_eq!(
            engine.events().last().unwrap().event,
            Event::PayoutRequested { payout_id, application_id: app.into(), amount: 600_000 }
        );
        let payout = engine.payout(payout_id).unwrap();
        assert_eq!(payout.amount, 600_000);
        assert!(!payout.is_confirmed());
    }

    #[test]
    fn zero_cell_fails_and_leaves_request_open() {
        let mut engine = category_engine();
        let (_, status) = underwritten(&mut engine);
        let events = engine.events().len();
        let next = engine.next_request_id();
        assert_eq!(
            engine.policy_status_callback(&oracle(), status, 4, 2),
            Err(EngineError::NoPayoutForBucket { category: 4, bucket: 2 })
        );
        assert_eq!(engine.events().len(), events);
        assert_eq!(engine.next_request_id(), next);
        assert_eq!(engine.ledger().payouts().count(), 0);
        assert!(engine.policy_status_callback(&oracle(), status, 5, 1).is_ok());
    }

    #[test]
    fn application_id_is_not_a_status_id() {
        let mut engine = category_engine();
        let (app, _) = underwritten(&mut engine);
        assert_eq!(
            engine.policy_status_callback(&oracle(), app, 7, 1),
            Err(EngineError::InvalidRequestId(app.0))
        );
        assert_eq!(
            engine.policy_status_callback(&oracle(), RequestId(0), 7, 1),
            Err(EngineError::InvalidRequestId(0))
        );
    }

    #[test]
    fn single_claim_closes_the_request() {
        let mut engine = category_engine();
        let (_, status) = underwritten(&mut engine);
        engine.policy_status_callback(&oracle(), status, 6, 1).unwrap();
        assert_eq!(
            engine.policy_status_callback(&oracle(), status, 6, 1),
            Err(EngineError::InvalidRequestId(status.0))
        );
    }

    #[test]
    fn repeated_claims_keep_the_request_open() {
        let config = EngineConfig::new(oracle()).with_claims(ClaimPolicy::Repeated);
        let mut engine = Engine::new(CategoryBucket, config);
        let app = engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
        let status = engine.application_callback(&oracle(), app, false).unwrap().unwrap();
        let (first, _) = engine.policy_status_callback(&oracle(), status, 6, 1).unwrap();
        let (second, _) = engine.policy_status_callback(&oracle(), status, 7, 3).unwrap();
        assert_ne!(first, second);
        assert_eq!(engine.ledger().payouts().count(), 2);
    }

    #[test]
    fn distance_regime_follows_season_product() {
        let mut engine = Engine::new(DistanceBand::default(), EngineConfig::new(oracle()));
        let options = vec![120_000, 140_000, 150_000, 90_000, 100_000, 110_000, 60_000, 70_000, 80_000];
        let app = engine.apply_for_policy(params("18.38,-66.13", options)).unwrap();
        let status = engine.application_callback(&oracle(), app, false).unwrap().unwrap();
        assert!(matches!(
            engine.policy_status_callback(&oracle(), status, 3, 50_000),
            Err(EngineError::TooFarForPayout { .. })
        ));
        assert!(matches!(
            engine.policy_status_callback(&oracle(), status, 2, 1_000),
            Err(EngineError::InvalidCategory { .. })
        ));
        let (_, amount) = engine.policy_status_callback(&oracle(), status, 3, 1_000).unwrap();
        assert_eq!(amount, 120_000);
    }

    // ── confirm_payout ───────────────────────────────────────────────────────

    #[test]
    fn confirm_unknown_payout_fails() {
        let mut engine = category_engine();
        assert_eq!(
            engine.confirm_payout(&oracle(), PayoutId(42), 1),
            Err(EngineError::InvalidPayoutId(42))
        );
        assert!(engine.events().is_empty());
    }

    #[test]
    fn confirm_records_last_written_amount() {
        let mut engine = category_engine();
        let (_, status) = underwritten(&mut engine);
        let (payout_id, amount) = engine.policy_status_callback(&oracle(), status, 7, 1).unwrap();
        engine.confirm_payout(&oracle(), payout_id, amount).unwrap();
        engine.confirm_payout(&oracle(), payout_id, amount - 1).unwrap();
        let payout = engine.payout(payout_id).unwrap();
        assert!(payout.is_confirmed());
        assert_eq!(payout.confirmed_amount, Some(amount - 1));
        assert_eq!(payout.amount, amount);
    }

    // ── authority ────────────────────────────────────────────────────────────

    #[test]
    fn callbacks_from_a_stranger_are_unauthorized() {
        let mut engine = category_engine();
        let app = engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
        let unauthorized = |e: &EngineError| matches!(e, EngineError::Unauthorized { .. });

        assert!(unauthorized(&engine.application_callback(&stranger(), app, false).unwrap_err()));
        assert_eq!(engine.application(app.into()).unwrap().status, ApplicationStatus::Applied);
        let status = engine.application_callback(&oracle(), app, false).unwrap().unwrap();
        assert!(unauthorized(&engine.policy_status_callback(&stranger(), status, 7, 1).unwrap_err()));
        assert_eq!(engine.ledger().payouts().count(), 0);
        let (payout_id, amount) = engine.policy_status_callback(&oracle(), status, 7, 1).unwrap();
        assert!(unauthorized(&engine.confirm_payout(&stranger(), payout_id, amount).unwrap_err()));
        assert!(!engine.payout(payout_id).unwrap().is_confirmed());
    }

    #[test]
    fn authority_is_checked_before_ids() {
        let mut engine = category_engine();
        assert!(matches!(
            engine.application_callback(&stranger(), RequestId(0), false),
            Err(EngineError::Unauthorized { .. })
        ));
        assert!(matches!(
            engine.confirm_payout(&stranger(), PayoutId(99), 0),
            Err(EngineError::Unauthorized { .. })
        ));
    }

    #[test]
    fn anyone_may_apply() {
        let mut engine = category_engine();
        assert!(engine.apply_for_policy(params("18.38,-66.13", brochure_options())).is_ok());
    }

    // ── properties ───────────────────────────────────────────────────────────

    proptest! {
        #[test]
        fn issued_ids_strictly_increase(decisions in prop::collection::vec(any::<bool>(), 1..20)) {
            let mut engine = category_engine();
            let mut last = RequestId(0);
            for decline in decisions {
                let app = engine.apply_for_policy(params("18.38,-66.13", brochure_options())).unwrap();
                prop_assert!(app > last);
                prop_assert_eq!(engine.application(app.into()).unwrap().status, ApplicationStatus::Applied);
                last = app;
                if let Some(status) = engine.application_callback(&oracle(), app, decline).unwrap() {
                    prop_assert!(!decline);
                    prop_assert!(status > last);
                    last = status;
                } else {
                    prop_assert!(decline);
                }
            }
        }

        #[test]
        fn emitted_amount_matches_cell_or_nothing_changes(
            options in prop::collection::vec(prop_oneof![Just(0u64), 1u64..5_000_000], 21),
            category in 1u32..=7,
            bucket in 1u32..=3,
        ) {
            let mut engine = category_engine();
            let app = engine.apply_for_policy(params("18.38,-66.13", options.clone())).unwrap();
            let status = engine.application_callback(&oracle(), app, false).unwrap().unwrap();
            let events = engine.events().len();
            let cell = options[((category - 1) * 3 + (bucket - 1)) as usize];
            match engine.policy_status_callback(&oracle(), status, category, bucket) {
                Ok((_, amount)) => {
                    prop_assert_ne!(cell, 0);
                    prop_assert_eq!(amount, cell);
                    prop_assert_eq!(engine.events().len(), events + 1);
                }
                Err(err) => {
                    prop_assert_eq!(cell, 0);
                    prop_assert_eq!(err, EngineError::NoPayoutForBucket { category, bucket });
                    prop_assert_eq!(engine.ledger().payouts().count(), 0);
                    prop_assert_eq!(engine.events().len(), events);
                }
            }
        }
    }
}
