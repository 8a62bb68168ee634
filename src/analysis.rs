use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::events::{Event, LedgerEvent};
use crate::types::{Amount, ApplicationId, PayoutId, RequestId};

/// Totals derived from an event log alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub applications: usize,
    pub underwritten: usize,
    pub payouts_requested: usize,
    pub requested_amount: Amount,
    pub payouts_confirmed: usize,
    pub confirmed_amount: Amount,
    /// Confirmations whose amount differs from the requested one.
    pub adjusted_confirmations: usize,
}

impl LedgerStats {
    pub fn unconfirmed(&self) -> usize {
        self.payouts_requested - self.payouts_confirmed.min(self.payouts_requested)
    }
}

pub fn summarise(events: &[LedgerEvent]) -> LedgerStats {
    let mut stats = LedgerStats::default();
    let mut requested: HashMap<PayoutId, Amount> = HashMap::new();
    // Last confirmed amount per payout; repeats overwrite.
    let mut confirmed: BTreeMap<PayoutId, Amount> = BTreeMap::new();

    for ev in events {
        match &ev.event {
            Event::ApplicationRequested { .. } => stats.applications += 1,
            Event::PolicyStatusRequested { .. } => stats.underwritten += 1,
            Event::PayoutRequested { payout_id, amount, .. } => {
                stats.payouts_requested += 1;
                stats.requested_amount = stats.requested_amount.saturating_add(*amount);
                requested.insert(*payout_id, *amount);
            }
            Event::PayoutConfirmed { payout_id, amount } => {
                confirmed.insert(*payout_id, *amount);
            }
        }
    }

    for (payout_id, amount) in &confirmed {
        stats.payouts_confirmed += 1;
        stats.confirmed_amount = stats.confirmed_amount.saturating_add(*amount);
        if requested.get(payout_id) != Some(amount) {
            stats.adjusted_confirmations += 1;
        }
    }
    stats
}

/// A broken ledger invariant found by [`verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// `seq` does not equal the entry's position in the log.
    SequenceGap { position: usize, seq: u64 },
    /// A correlation id not strictly greater than every id before it.
    IdNotIncreasing { seq: u64, id: u64, previous: u64 },
    /// A correlation id issued twice.
    DuplicateId { seq: u64, id: u64 },
    /// `PolicyStatusRequested` for an application never requested.
    StatusWithoutApplication { seq: u64, application_id: u64 },
    /// An application underwritten more than once.
    DuplicateUnderwriting { seq: u64, application_id: u64 },
    /// `PayoutRequested` for an application never underwritten.
    PayoutWithoutStatus { seq: u64, payout_id: u64, application_id: u64 },
    /// A payout requested for a zero amount.
    ZeroPayout { seq: u64, payout_id: u64 },
    /// `PayoutConfirmed` for a payout never requested.
    ConfirmationWithoutPayout { seq: u64, payout_id: u64 },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceGap { position, seq } => {
                write!(f, "SequenceGap position={position} seq={seq}")
            }
            Self::IdNotIncreasing { seq, id, previous } => {
                write!(f, "IdNotIncreasing seq={seq} id={id} previous={previous}")
            }
            Self::DuplicateId { seq, id } => write!(f, "DuplicateId seq={seq} id={id}"),
            Self::StatusWithoutApplication { seq, application_id } => {
                write!(f, "StatusWithoutApplication seq={seq} application={application_id}")
            }
            Self::DuplicateUnderwriting { seq, application_id } => {
                write!(f, "DuplicateUnderwriting seq={seq} application={application_id}")
            }
            Self::PayoutWithoutStatus { seq, payout_id, application_id } => {
                write!(f, "PayoutWithoutStatus seq={seq} payout={payout_id} application={application_id}")
            }
            Self::ZeroPayout { seq, payout_id } => write!(f, "ZeroPayout seq={seq} payout={payout_id}"),
            Self::ConfirmationWithoutPayout { seq, payout_id } => {
                write!(f, "ConfirmationWithoutPayout seq={seq} payout={payout_id}")
            }
        }
    }
}

/// Replay the log and report every broken invariant. An empty result means
/// the log is consistent with a single engine issuing ids from one counter.
pub fn verify_integrity(events: &[LedgerEvent]) -> Vec<IntegrityViolation> {
    let mut violations = Vec::new();
    let mut highest_id: u64 = 0;
    let mut seen_ids: HashSet<RequestId> = HashSet::new();
    let mut applications: HashSet<ApplicationId> = HashSet::new();
    let mut underwritten: HashSet<ApplicationId> = HashSet::new();
    let mut payouts: HashSet<PayoutId> = HashSet::new();

    for (position, ev) in events.iter().enumerate() {
        let seq = ev.seq;
        if seq != position as u64 {
            violations.push(IntegrityViolation::SequenceGap { position, seq });
        }

        if let Some(id) = ev.event.correlation_id() {
            if !seen_ids.insert(id) {
                violations.push(IntegrityViolation::DuplicateId { seq, id: id.0 });
            } else if id.0 <= highest_id {
                violations.push(IntegrityViolation::IdNotIncreasing { seq, id: id.0, previous: highest_id });
            }
            highest_id = highest_id.max(id.0);
        }

        match &ev.event {
            Event::ApplicationRequested { request_id } => {
                applications.insert(ApplicationId::from(*request_id));
            }
            Event::PolicyStatusRequested { application_id, .. } => {
                if !applications.contains(application_id) {
                    violations.push(IntegrityViolation::StatusWithoutApplication {
                        seq,
                        application_id: application_id.0,
                    });
                }
                if !underwritten.insert(*application_id) {
                    violations.push(IntegrityViolation::DuplicateUnderwriting {
                        seq,
                        application_id: application_id.0,
                    });
                }
            }
            Event::PayoutRequested { payout_id, application_id, amount } => {
                if !underwritten.contains(application_id) {
                    violations.push(IntegrityViolation::PayoutWithoutStatus {
                        seq,
                        payout_id: payout_id.0,
                        application_id: application_id.0,
                    });
                }
                if *amount == 0 {
                    violations.push(IntegrityViolation::ZeroPayout { seq, payout_id: payout_id.0 });
                }
                payouts.insert(*payout_id);
            }
            Event::PayoutConfirmed { payout_id, .. } => {
                if !payouts.contains(payout_id) {
                    violations.push(IntegrityViolation::ConfirmationWithoutPayout {
                        seq,
                        payout_id: payout_id.0,
                    });
                }
            }
        }
    }
    violations
}
