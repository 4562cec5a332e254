//! Environment module - Dependency injection traits
//!
//! External dependencies the services need besides the store are abstracted
//! behind traits and injected at construction.

use crate::store::AttendanceStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use attendance_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Dependencies shared by the event directory and the roster manager.
#[derive(Clone)]
pub struct AttendanceEnvironment {
    /// Event and history persistence
    pub store: Arc<dyn AttendanceStore>,
    /// Clock for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
}

impl AttendanceEnvironment {
    /// Creates a new `AttendanceEnvironment`
    #[must_use]
    pub fn new(store: Arc<dyn AttendanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}
