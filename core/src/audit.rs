//! Roster/history reconciliation.

use crate::types::{Event, EventId, HistoryRecord, UserId};
use std::collections::BTreeMap;

/// Differences between an event roster and the history records for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    /// Event audited
    pub event_id: EventId,
    /// On the roster without a history record
    pub roster_only: Vec<UserId>,
    /// With a history record but not on the roster
    pub history_only: Vec<UserId>,
    /// On both sides, but the roster status is missing or differs from history
    pub status_mismatch: Vec<UserId>,
}

impl AuditReport {
    /// Compares `event`'s roster against `history`.
    ///
    /// Records for other events are ignored.
    #[must_use]
    pub fn reconcile(event: &Event, history: &[HistoryRecord]) -> Self {
        let by_user: BTreeMap<UserId, &HistoryRecord> = history
            .iter()
            .filter(|record| record.event_id == event.id)
            .map(|record| (record.user_id, record))
            .collect();

        let mut roster_only = Vec::new();
        let mut status_mismatch = Vec::new();
        for user_id in &event.roll {
            match by_user.get(user_id) {
                None => roster_only.push(*user_id),
                Some(record) if event.status.get(user_id) != Some(&record.status) => {
                    status_mismatch.push(*user_id);
                }
                Some(_) => {}
            }
        }

        let history_only = by_user
            .keys()
            .filter(|user_id| !event.is_member(user_id))
            .copied()
            .collect();

        Self {
            event_id: event.id,
            roster_only,
            history_only,
            status_mismatch,
        }
    }

    /// Whether roster and history mirror each other exactly.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.roster_only.is_empty()
            && self.history_only.is_empty()
            && self.status_mismatch.is_empty()
    }
}
