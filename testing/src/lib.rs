//! # Attendance Testing
//!
//! Testing utilities for the attendance services.
//!
//! This crate provides:
//! - [`InMemoryAttendanceStore`]: an atomic in-memory store
//! - [`FixedClock`] and [`test_clock`]: deterministic time
//! - [`EventFormBuilder`]: terse event forms for test scenarios
//! - [`TestHarness`]: store plus services wired to a fixed clock
//!
//! ## Example
//!
//! ```ignore
//! use attendance_testing::{EventFormBuilder, TestHarness};
//!
//! #[tokio::test]
//! async fn test_join() {
//!     let harness = TestHarness::new();
//!     let event_id = harness.create(EventFormBuilder::new("Meetup").build()).await;
//!     harness.roster.join(user, event_id).await.unwrap();
//! }
//! ```

use attendance_core::environment::{AttendanceEnvironment, Clock};
use attendance_core::types::{EventForm, EventId, UserId};
use attendance_core::{EventDirectory, RosterManager};
use chrono::{DateTime, Utc};
use std::sync::Arc;

mod store_mocks;

pub use store_mocks::InMemoryAttendanceStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use attendance_testing::mocks::FixedClock;
    /// use attendance_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(super::test_time())
    }
}

pub use mocks::{FixedClock, test_clock};

/// The instant [`test_clock`] is frozen at: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

/// Fluent builder for [`EventForm`]s.
///
/// Starts from an open event: titled, no deadline, no roster limit, no
/// check tracking, no manual stop.
#[derive(Clone, Debug, Default)]
pub struct EventFormBuilder {
    form: EventForm,
}

impl EventFormBuilder {
    /// Start a form with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            form: EventForm {
                title: Some(title.into()),
                ..EventForm::default()
            },
        }
    }

    /// Set the join cutoff
    #[must_use]
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.form.deadline = Some(deadline);
        self
    }

    /// Limit the roster to `max_count` participants
    #[must_use]
    pub fn capacity(mut self, max_count: u32) -> Self {
        self.form.limit_count = Some(true);
        self.form.max_count = Some(max_count);
        self
    }

    /// Track check-in/check-out
    #[must_use]
    pub fn need_check(mut self) -> Self {
        self.form.need_check = Some(true);
        self
    }

    /// Allow manual stop/restart
    #[must_use]
    pub fn manual_stop(mut self) -> Self {
        self.form.manual_stop = Some(true);
        self
    }

    /// Preset the closure time
    #[must_use]
    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.form.end = Some(end);
        self
    }

    /// Finish the form
    #[must_use]
    pub fn build(self) -> EventForm {
        self.form
    }
}

/// An in-memory store with a directory and roster manager on top.
#[derive(Clone)]
pub struct TestHarness {
    /// Shared store, inspectable from tests
    pub store: InMemoryAttendanceStore,
    /// Event directory over `store`
    pub directory: EventDirectory,
    /// Roster manager over `store`
    pub roster: RosterManager,
    /// Organizer used by [`TestHarness::create`]
    pub organizer: UserId,
}

impl TestHarness {
    /// Harness with a clock frozen at [`test_time`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(InMemoryAttendanceStore::new(), test_time())
    }

    /// Harness over an existing store with a clock frozen at `now`.
    #[must_use]
    pub fn with_store(store: InMemoryAttendanceStore, now: DateTime<Utc>) -> Self {
        let env = AttendanceEnvironment::new(
            Arc::new(store.clone()),
            Arc::new(FixedClock::new(now)),
        );
        Self {
            store,
            directory: EventDirectory::new(env.clone()),
            roster: RosterManager::new(env),
            organizer: UserId::new(),
        }
    }

    /// The same store seen from another point in time.
    #[must_use]
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        Self {
            organizer: self.organizer,
            ..Self::with_store(self.store.clone(), now)
        }
    }

    /// Create an event owned by the harness organizer.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory store fails, which only happens after a
    /// panic poisoned its lock.
    #[allow(clippy::expect_used)]
    pub async fn create(&self, form: EventForm) -> EventId {
        self.directory
            .create(self.organizer, form)
            .await
            .expect("in-memory store should accept events")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a `tracing` subscriber for test output, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_builder_sets_only_requested_fields() {
        let form = EventFormBuilder::new("Meetup").capacity(10).need_check().build();
        assert_eq!(form.title.as_deref(), Some("Meetup"));
        assert_eq!(form.limit_count, Some(true));
        assert_eq!(form.max_count, Some(10));
        assert_eq!(form.need_check, Some(true));
        assert_eq!(form.manual_stop, None);
        assert_eq!(form.deadline, None);
    }
}
