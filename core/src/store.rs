//! Store trait for events, rosters and participation history.
//!
//! The store holds two collections: event documents (each with its roster
//! and status map) and user-event history records. Every method is one
//! store round trip; the compound methods ([`AttendanceStore::enroll`],
//! [`AttendanceStore::withdraw`], [`AttendanceStore::record_status`]) must
//! apply their roster and history writes atomically, so the two sides can
//! never diverge and concurrent joins cannot overshoot a roster limit.
//!
//! # Implementations
//!
//! - `PostgresAttendanceStore` (in `attendance-postgres` crate): Production implementation
//! - `InMemoryAttendanceStore` (in `attendance-testing` crate): Fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the services
//! can hold an `Arc<dyn AttendanceStore>`.

use crate::error::StoreError;
use crate::types::{
    Event, EventForm, EventId, EventView, HistoryRecord, ParticipationStatus, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A guarded request to add a user to an event roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enrollment {
    /// Event joined
    pub event_id: EventId,
    /// Joining user
    pub user_id: UserId,
    /// Status written to both the roster and the history record
    pub status: ParticipationStatus,
}

/// A guarded request to overwrite a participant's status.
///
/// Applied only if the roster still holds `expected`, so a status computed
/// from a stale read never overwrites a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Event referenced
    pub event_id: EventId,
    /// Participant
    pub user_id: UserId,
    /// Status the change was computed from
    pub expected: ParticipationStatus,
    /// Status to write to both the roster and the history record
    pub status: ParticipationStatus,
}

/// Result of [`AttendanceStore::enroll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// User added to the roster and history record inserted.
    Enrolled,
    /// Event does not exist.
    EventMissing,
    /// Roster already holds `max_count` users, the limit read under the
    /// same lock as the roster. Checked before membership.
    Full {
        /// Effective roster limit
        max_count: u32,
    },
    /// User already on the roster.
    AlreadyEnrolled,
}

/// Result of [`AttendanceStore::withdraw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// User removed from the roster and history record deleted.
    Withdrawn,
    /// Event does not exist.
    EventMissing,
    /// User was not on the roster.
    NotEnrolled,
}

/// Result of [`AttendanceStore::record_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Roster and history status overwritten.
    Recorded,
    /// Event does not exist or the user is not on its roster.
    NotEnrolled,
    /// The roster status no longer matches `expected`; nothing written.
    Stale {
        /// Status currently on the roster
        current: ParticipationStatus,
    },
}

/// Persistence for events, rosters and participation history.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across tasks.
pub trait AttendanceStore: Send + Sync {
    /// Load an event document, roster included.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails.
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Load public views of all events, newest first.
    ///
    /// `joined` is computed for `viewer` and is `false` when there is none.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails.
    fn list_events(&self, viewer: Option<UserId>) -> StoreFuture<'_, Vec<EventView>>;

    /// Insert a new event owned by `owner_id`, storing only the set form
    /// fields, and return its generated id.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn insert_event(&self, owner_id: UserId, form: EventForm) -> StoreFuture<'_, EventId>;

    /// Merge the set form fields into an existing event.
    ///
    /// Returns `false` if no event matched.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_event(&self, event_id: EventId, form: EventForm) -> StoreFuture<'_, bool>;

    /// Set `end = at` if the event has `manual_stop` and no `end` yet.
    ///
    /// Returns `false` if the guard did not hold.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn stop_event(&self, event_id: EventId, at: DateTime<Utc>) -> StoreFuture<'_, bool>;

    /// Clear `end` if the event has `manual_stop` and an `end`.
    ///
    /// Returns `false` if the guard did not hold.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn restart_event(&self, event_id: EventId) -> StoreFuture<'_, bool>;

    /// Atomically add the user to the roster, set their status and insert
    /// the mirrored history record.
    ///
    /// The roster limit (`max_count` when `limit_count` is set) is read
    /// under the same lock as the roster, so concurrent joins and updates
    /// cannot push the roster past it.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails; nothing is written in that case.
    fn enroll(&self, enrollment: Enrollment) -> StoreFuture<'_, EnrollOutcome>;

    /// Atomically remove the user from the roster, drop their status entry
    /// and delete the history record.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails; nothing is written in that case.
    fn withdraw(&self, event_id: EventId, user_id: UserId) -> StoreFuture<'_, WithdrawOutcome>;

    /// Atomically overwrite the user's status on the roster and in history,
    /// provided the roster still holds `change.expected`.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn record_status(&self, change: StatusChange) -> StoreFuture<'_, StatusOutcome>;

    /// Ids of all events the user has a history record for.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails.
    fn joined_event_ids(&self, user_id: UserId) -> StoreFuture<'_, Vec<EventId>>;

    /// All history records referring to an event.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails.
    fn event_history(&self, event_id: EventId) -> StoreFuture<'_, Vec<HistoryRecord>>;
}
