//! In-memory attendance store for fast, deterministic testing.

use attendance_core::StoreError;
use attendance_core::store::{
    AttendanceStore, EnrollOutcome, Enrollment, StatusChange, StatusOutcome, StoreFuture,
    WithdrawOutcome,
};
use attendance_core::types::{
    Event, EventForm, EventId, EventView, HistoryRecord, ParticipationStatus, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct StoreState {
    events: BTreeMap<EventId, Event>,
    history: BTreeMap<(UserId, EventId), HistoryRecord>,
}

/// `BTreeMap`-backed [`AttendanceStore`].
///
/// One mutex guards both collections, so every store call is atomic, the
/// same guarantee the Postgres store gets from a row-locking transaction.
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use attendance_core::store::AttendanceStore;
/// use attendance_core::types::{EventForm, UserId};
/// use attendance_testing::InMemoryAttendanceStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryAttendanceStore::new();
/// let event_id = store.insert_event(UserId::new(), EventForm::default()).await?;
/// assert!(store.find_event(event_id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryAttendanceStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryAttendanceStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut state))
    }

    /// Snapshot of an event document, roster included.
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<Event> {
        self.with_state(|state| state.events.get(&event_id).cloned())
            .ok()
            .flatten()
    }

    /// Snapshot of a history record.
    #[must_use]
    pub fn history_record(&self, user_id: UserId, event_id: EventId) -> Option<HistoryRecord> {
        self.with_state(|state| state.history.get(&(user_id, event_id)).copied())
            .ok()
            .flatten()
    }

    /// Total number of history records.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.with_state(|state| state.history.len()).unwrap_or_default()
    }

    /// Store an event document as-is, bypassing every guard.
    ///
    /// Lets tests seed rosters that disagree with history.
    pub fn put_event(&self, event: Event) {
        let _ = self.with_state(|state| state.events.insert(event.id, event));
    }

    /// Delete a history record without touching the roster.
    ///
    /// Simulates a half-applied write for audit tests.
    pub fn drop_history(&self, user_id: UserId, event_id: EventId) {
        let _ = self.with_state(|state| state.history.remove(&(user_id, event_id)));
    }
}

impl AttendanceStore for InMemoryAttendanceStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        let result = self.with_state(|state| state.events.get(&event_id).cloned());
        Box::pin(async move { result })
    }

    fn list_events(&self, viewer: Option<UserId>) -> StoreFuture<'_, Vec<EventView>> {
        let result = self.with_state(|state| {
            state
                .events
                .values()
                .rev()
                .map(|event| event.view(viewer))
                .collect()
        });
        Box::pin(async move { result })
    }

    fn insert_event(&self, owner_id: UserId, form: EventForm) -> StoreFuture<'_, EventId> {
        let result = self.with_state(|state| {
            let event = Event::new(EventId::new(), owner_id, form.to_details());
            let event_id = event.id;
            state.events.insert(event_id, event);
            event_id
        });
        Box::pin(async move { result })
    }

    fn update_event(&self, event_id: EventId, form: EventForm) -> StoreFuture<'_, bool> {
        let result = self.with_state(|state| {
            state.events.get_mut(&event_id).is_some_and(|event| {
                form.merge_into(&mut event.details);
                true
            })
        });
        Box::pin(async move { result })
    }

    fn stop_event(&self, event_id: EventId, at: DateTime<Utc>) -> StoreFuture<'_, bool> {
        let result = self.with_state(|state| {
            match state.events.get_mut(&event_id) {
                Some(event) if event.details.manual_stop && event.details.end.is_none() => {
                    event.details.end = Some(at);
                    true
                }
                _ => false,
            }
        });
        Box::pin(async move { result })
    }

    fn restart_event(&self, event_id: EventId) -> StoreFuture<'_, bool> {
        let result = self.with_state(|state| {
            match state.events.get_mut(&event_id) {
                Some(event) if event.details.manual_stop && event.details.end.is_some() => {
                    event.details.end = None;
                    true
                }
                _ => false,
            }
        });
        Box::pin(async move { result })
    }

    fn enroll(&self, enrollment: Enrollment) -> StoreFuture<'_, EnrollOutcome> {
        let Enrollment {
            event_id,
            user_id,
            status,
        } = enrollment;

        let result = self.with_state(|state| {
            let Some(event) = state.events.get_mut(&event_id) else {
                return EnrollOutcome::EventMissing;
            };
            if let Some(max_count) = event.capacity().filter(|_| event.is_full()) {
                return EnrollOutcome::Full { max_count };
            }
            if !event.roll.insert(user_id) {
                return EnrollOutcome::AlreadyEnrolled;
            }
            event.status.insert(user_id, status);
            state.history.insert(
                (user_id, event_id),
                HistoryRecord {
                    user_id,
                    event_id,
                    status,
                },
            );
            EnrollOutcome::Enrolled
        });
        Box::pin(async move { result })
    }

    fn withdraw(&self, event_id: EventId, user_id: UserId) -> StoreFuture<'_, WithdrawOutcome> {
        let result = self.with_state(|state| {
            let Some(event) = state.events.get_mut(&event_id) else {
                return WithdrawOutcome::EventMissing;
            };
            if !event.roll.remove(&user_id) {
                return WithdrawOutcome::NotEnrolled;
            }
            event.status.remove(&user_id);
            state.history.remove(&(user_id, event_id));
            WithdrawOutcome::Withdrawn
        });
        Box::pin(async move { result })
    }

    fn record_status(&self, change: StatusChange) -> StoreFuture<'_, StatusOutcome> {
        let StatusChange {
            event_id,
            user_id,
            expected,
            status,
        } = change;

        let result = self.with_state(|state| {
            let Some(event) = state.events.get_mut(&event_id) else {
                return StatusOutcome::NotEnrolled;
            };
            let Some(current) = event.status.get_mut(&user_id) else {
                return StatusOutcome::NotEnrolled;
            };
            if *current != expected {
                return StatusOutcome::Stale { current: *current };
            }
            *current = status;
            state.history.insert(
                (user_id, event_id),
                HistoryRecord {
                    user_id,
                    event_id,
                    status,
                },
            );
            StatusOutcome::Recorded
        });
        Box::pin(async move { result })
    }

    fn joined_event_ids(&self, user_id: UserId) -> StoreFuture<'_, Vec<EventId>> {
        let result = self.with_state(|state| {
            state
                .history
                .values()
                .filter(|record| record.user_id == user_id)
                .map(|record| record.event_id)
                .collect()
        });
        Box::pin(async move { result })
    }

    fn event_history(&self, event_id: EventId) -> StoreFuture<'_, Vec<HistoryRecord>> {
        let result = self.with_state(|state| {
            state
                .history
                .values()
                .filter(|record| record.event_id == event_id)
                .copied()
                .collect()
        });
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enroll_and_withdraw_touch_both_sides() {
        let store = InMemoryAttendanceStore::new();
        let event_id = store
            .insert_event(UserId::new(), EventForm::default())
            .await
            .unwrap();
        let user_id = UserId::new();

        let outcome = store
            .enroll(Enrollment {
                event_id,
                user_id,
                status: ParticipationStatus::initial(false),
            })
            .await
            .unwrap();
        assert_eq!(outcome, EnrollOutcome::Enrolled);
        assert!(store.event(event_id).unwrap().is_member(&user_id));
        assert!(store.history_record(user_id, event_id).is_some());

        let outcome = store.withdraw(event_id, user_id).await.unwrap();
        assert_eq!(outcome, WithdrawOutcome::Withdrawn);
        assert!(store.event(event_id).unwrap().roll.is_empty());
        assert!(store.event(event_id).unwrap().status.is_empty());
        assert_eq!(store.history_len(), 0);
    }

    #[tokio::test]
    async fn test_enroll_reports_full_before_duplicate() {
        let store = InMemoryAttendanceStore::new();
        let single = EventForm {
            limit_count: Some(true),
            max_count: Some(1),
            ..EventForm::default()
        };
        let event_id = store.insert_event(UserId::new(), single).await.unwrap();
        let enrollment = Enrollment {
            event_id,
            user_id: UserId::new(),
            status: ParticipationStatus::initial(false),
        };

        assert_eq!(store.enroll(enrollment).await.unwrap(), EnrollOutcome::Enrolled);
        assert_eq!(
            store.enroll(enrollment).await.unwrap(),
            EnrollOutcome::Full { max_count: 1 }
        );

        let raised = EventForm {
            max_count: Some(2),
            ..EventForm::default()
        };
        assert!(store.update_event(event_id, raised).await.unwrap());
        assert_eq!(
            store.enroll(enrollment).await.unwrap(),
            EnrollOutcome::AlreadyEnrolled
        );
    }

    #[tokio::test]
    async fn test_record_status_requires_expected_status() {
        let store = InMemoryAttendanceStore::new();
        let event_id = store
            .insert_event(UserId::new(), EventForm::default())
            .await
            .unwrap();
        let user_id = UserId::new();
        let initial = ParticipationStatus::initial(true);
        store
            .enroll(Enrollment {
                event_id,
                user_id,
                status: initial,
            })
            .await
            .unwrap();

        let now = DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap();
        let checked_in = initial.checked_in(now).unwrap();
        let change = StatusChange {
            event_id,
            user_id,
            expected: initial,
            status: checked_in,
        };
        assert_eq!(store.record_status(change).await.unwrap(), StatusOutcome::Recorded);
        assert_eq!(
            store.record_status(change).await.unwrap(),
            StatusOutcome::Stale {
                current: checked_in
            }
        );
        assert_eq!(store.history_record(user_id, event_id).unwrap().status, checked_in);

        let stranger = StatusChange {
            user_id: UserId::new(),
            ..change
        };
        assert_eq!(
            store.record_status(stranger).await.unwrap(),
            StatusOutcome::NotEnrolled
        );
    }

    #[tokio::test]
    async fn test_lists_newest_first() {
        let store = InMemoryAttendanceStore::new();
        let owner = UserId::new();
        let older = store.insert_event(owner, EventForm::default()).await.unwrap();
        let newer = store.insert_event(owner, EventForm::default()).await.unwrap();

        let ids: Vec<EventId> = store
            .list_events(None)
            .await
            .unwrap()
            .into_iter()
            .map(|view| view.id)
            .collect();
        assert_eq!(ids, vec![newer, older]);
    }
}
