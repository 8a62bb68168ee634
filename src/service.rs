use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::events::LedgerEvent;
use crate::ledger::ApplicationParams;
use crate::payout::PayoutRegime;
use crate::types::{AccountId, Amount, PayoutId, RequestId};

/// Thread-safe handle: one lock around the whole engine, so every call
/// lands in a single global order. Clones share the same engine.
#[derive(Debug)]
pub struct SharedEngine<R: PayoutRegime> {
    inner: Arc<Mutex<Engine<R>>>,
}

impl<R: PayoutRegime> Clone for SharedEngine<R> {
    fn clone(&self) -> Self {
        SharedEngine { inner: Arc::clone(&self.inner) }
    }
}

impl<R: PayoutRegime> SharedEngine<R> {
    pub fn new(regime: R, config: EngineConfig) -> Self {
        SharedEngine { inner: Arc::new(Mutex::new(Engine::new(regime, config))) }
    }

    /// Exclusive access for reads or batches that must not interleave.
    ///
    /// Poisoning is ignored: no entry point panics between validation and
    /// its last write.
    pub fn lock(&self) -> MutexGuard<'_, Engine<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply_for_policy(&self, params: ApplicationParams) -> Result<RequestId> {
        self.lock().apply_for_policy(params)
    }

    pub fn application_callback(
        &self,
        caller: &AccountId,
        request_id: RequestId,
        decline: bool,
    ) -> Result<Option<RequestId>> {
        self.lock().application_callback(caller, request_id, decline)
    }

    pub fn policy_status_callback(
        &self,
        caller: &AccountId,
        request_id: RequestId,
        category: u32,
        measure: u32,
    ) -> Result<(PayoutId, Amount)> {
        self.lock().policy_status_callback(caller, request_id, category, measure)
    }

    pub fn confirm_payout(&self, caller: &AccountId, payout_id: PayoutId, amount: Amount) -> Result<()> {
        self.lock().confirm_payout(caller, payout_id, amount)
    }

    /// Owned copy of the notifications with `seq >= cursor`.
    pub fn events_since(&self, cursor: u64) -> Vec<LedgerEvent> {
        self.lock().events_since(cursor).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::ledger::Coverage;
    use crate::payout::CategoryBucket;
    use crate::types::Currency;

    fn params(i: usize) -> ApplicationParams {
        ApplicationParams {
            location: format!("18.{i},-66.13"),
            peril_contract_id: "windstorm-atlantic".to_string(),
            coverage: Coverage::Duration { days: 180 },
            premium: 30_000,
            currency: Currency(1),
            payout_options: vec![100; 21],
            external_id: format!("customer-{i}"),
        }
    }

    #[test]
    fn concurrent_applicants_get_unique_ids() {
        let shared = SharedEngine::new(CategoryBucket, EngineConfig::new(AccountId::new("0xoracle")));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    (0..25).map(|i| shared.apply_for_policy(params(t * 25 + i)).unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<RequestId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let unique: HashSet<RequestId> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 200);
        assert_eq!(shared.events_since(0).len(), 200);
        assert_eq!(shared.lock().next_request_id(), RequestId(201));
    }

    #[test]
    fn shared_handle_runs_the_full_lifecycle() {
        let oracle = AccountId::new("0xoracle");
        let shared = SharedEngine::new(CategoryBucket, EngineConfig::new(oracle.clone()));
        let app = shared.apply_for_policy(params(0)).unwrap();
        let status = shared.application_callback(&oracle, app, false).unwrap().unwrap();
        let (payout_id, amount) = shared.policy_status_callback(&oracle, status, 1, 1).unwrap();
        assert_eq!(amount, 100);
        shared.confirm_payout(&oracle, payout_id, amount).unwrap();
        assert!(shared.lock().payout(payout_id).unwrap().is_confirmed());
        assert_eq!(shared.events_since(2).len(), 2);
    }
}
