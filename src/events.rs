use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::types::{Amount, ApplicationId, PayoutId, RequestId};

/// Notifications the engine publishes for the off-ledger oracle. Every
/// request-kind event carries the correlation id the oracle must echo back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A new application awaits underwriting. `request_id` is also the
    /// application's id.
    ApplicationRequested { request_id: RequestId },
    /// An underwritten application awaits storm resolution under a fresh id.
    PolicyStatusRequested { request_id: RequestId, application_id: ApplicationId },
    /// Settlement should disburse `amount` and then confirm `payout_id`.
    PayoutRequested { payout_id: PayoutId, application_id: ApplicationId, amount: Amount },
    /// Settlement has been recorded. Not a request; nothing answers it.
    PayoutConfirmed { payout_id: PayoutId, amount: Amount },
}

impl Event {
    /// The correlation id this event asks a callback to echo, if any.
    pub fn correlation_id(&self) -> Option<RequestId> {
        match self {
            Event::ApplicationRequested { request_id }
            | Event::PolicyStatusRequested { request_id, .. } => Some(*request_id),
            Event::PayoutRequested { payout_id, .. } => Some(RequestId(payout_id.0)),
            Event::PayoutConfirmed { .. } => None,
        }
    }
}

/// Log entry: the event plus its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub seq: u64,
    pub event: Event,
}

/// Append-only outbound channel. `entries[i].seq == i`, so an oracle can
/// poll with the last sequence number it has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    entries: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the assigned sequence number.
    pub fn emit(&mut self, event: Event) -> u64 {
        let seq = self.entries.len() as u64;
        self.entries.push(LedgerEvent { seq, event });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[LedgerEvent] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LedgerEvent> {
        self.entries.last()
    }

    /// Entries with `seq >= cursor`.
    pub fn since(&self, cursor: u64) -> &[LedgerEvent] {
        let start = (cursor as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LedgerEvent> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a LedgerEvent;
    type IntoIter = std::slice::Iter<'a, LedgerEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Write one JSON object per line.
pub fn write_ndjson<'a>(
    writer: &mut impl Write,
    events: impl IntoIterator<Item = &'a LedgerEvent>,
) -> io::Result<()> {
    for ev in events {
        serde_json::to_writer(&mut *writer, ev)?;
        writeln!(writer)?;
    }
    writer.flush()
}

/// Inverse of [`write_ndjson`]. Blank lines are skipped.
pub fn read_ndjson(reader: impl BufRead) -> io::Result<Vec<LedgerEvent>> {
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}
