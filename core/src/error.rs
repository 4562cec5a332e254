//! Error types for attendance operations.
//!
//! Every [`ServiceError`] carries a machine-readable [`code`](ServiceError::code)
//! and an [`ErrorClass`] the API layer maps onto transport status codes.
//! Nothing in this crate retries or recovers; errors reach the caller as-is.

use crate::types::{EventId, UserId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for attendance operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by an [`AttendanceStore`](crate::store::AttendanceStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An in-process store lock was poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Severity class of a [`ServiceError`], modelled on HTTP status classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Request is invalid for the current state (400).
    BadRequest,
    /// Request is understood but refused (403).
    Forbidden,
    /// Referenced resource does not exist (404).
    NotFound,
    /// Resource is temporarily unable to accept the request (503).
    Unavailable,
    /// Data inconsistency or infrastructure failure (500).
    Internal,
}

impl ErrorClass {
    /// HTTP status code for this class.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }
}

/// Why a check-in or check-out was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// The event did not track check-in/check-out when the user joined.
    #[error("attendance is not tracked for this participation")]
    NotTracked,

    /// Check-in already recorded.
    #[error("already checked in")]
    AlreadyCheckedIn,

    /// Check-out attempted before check-in.
    #[error("not checked in")]
    NotCheckedIn,

    /// Check-out already recorded.
    #[error("already checked out")]
    AlreadyCheckedOut,
}

impl CheckError {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotTracked => "CHECK_NOT_TRACKED",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::NotCheckedIn => "NOT_CHECKED_IN",
            Self::AlreadyCheckedOut => "ALREADY_CHECKED_OUT",
        }
    }
}

/// Domain faults of the event directory and roster manager.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Referenced event does not exist.
    #[error("Event {event_id} not found")]
    NotFound {
        /// Missing event
        event_id: EventId,
    },

    /// Join attempted after the deadline.
    #[error("Deadline {deadline} of event {event_id} has passed")]
    DeadlinePassed {
        /// Event joined
        event_id: EventId,
        /// Join cutoff
        deadline: DateTime<Utc>,
    },

    /// Join attempted on a full roster.
    #[error("Event {event_id} is full ({max_count} participants)")]
    CapacityExceeded {
        /// Event joined
        event_id: EventId,
        /// Roster limit
        max_count: u32,
    },

    /// User is already on the roster.
    #[error("User {user_id} already joined event {event_id}")]
    AlreadyJoined {
        /// Event joined
        event_id: EventId,
        /// Joining user
        user_id: UserId,
    },

    /// User is not on the roster.
    ///
    /// The public flow never offers exit or check-in to non-members, so
    /// this signals inconsistent data rather than a user mistake.
    #[error("User {user_id} is not on the roster of event {event_id}")]
    NotJoined {
        /// Event referenced
        event_id: EventId,
        /// User referenced
        user_id: UserId,
    },

    /// Stop/restart requested on an event without `manual_stop`.
    #[error("Event {event_id} cannot be stopped manually")]
    IsNotManualStop {
        /// Event referenced
        event_id: EventId,
    },

    /// Stop requested on an event that is already stopped.
    #[error("Event {event_id} has already stopped")]
    HasStopped {
        /// Event referenced
        event_id: EventId,
    },

    /// Restart requested on an event that is not stopped.
    #[error("Event {event_id} is not stopped")]
    NotStopped {
        /// Event referenced
        event_id: EventId,
    },

    /// Check-in or check-out refused.
    #[error("Attendance check for user {user_id} on event {event_id} refused: {reason}")]
    Check {
        /// Event referenced
        event_id: EventId,
        /// User referenced
        user_id: UserId,
        /// Why the check was refused
        #[source]
        reason: CheckError,
    },

    /// Underlying store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DeadlinePassed { .. } => "DEADLINE_PASSED",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::AlreadyJoined { .. } => "ALREADY_JOINED",
            Self::NotJoined { .. } => "NOT_JOINED",
            Self::IsNotManualStop { .. } => "IS_NOT_MANUAL_STOP",
            Self::HasStopped { .. } => "HAS_STOPPED",
            Self::NotStopped { .. } => "NOT_STOPPED",
            Self::Check { reason, .. } => reason.code(),
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Severity class of the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::DeadlinePassed { .. } | Self::AlreadyJoined { .. } => ErrorClass::Forbidden,
            Self::CapacityExceeded { .. } => ErrorClass::Unavailable,
            Self::IsNotManualStop { .. }
            | Self::HasStopped { .. }
            | Self::NotStopped { .. }
            | Self::Check { .. } => ErrorClass::BadRequest,
            Self::NotJoined { .. } | Self::Store(_) => ErrorClass::Internal,
        }
    }

    /// HTTP status code of the error's class.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.class().status_code()
    }

    /// Whether the error indicates corrupt data or a failed store rather
    /// than a rejected request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_classes() {
        let event_id = EventId::new();
        let user_id = UserId::new();

        let cases = [
            (ServiceError::NotFound { event_id }, "NOT_FOUND", 404),
            (
                ServiceError::CapacityExceeded {
                    event_id,
                    max_count: 3,
                },
                "CAPACITY_EXCEEDED",
                503,
            ),
            (
                ServiceError::AlreadyJoined { event_id, user_id },
                "ALREADY_JOINED",
                403,
            ),
            (
                ServiceError::NotJoined { event_id, user_id },
                "NOT_JOINED",
                500,
            ),
            (
                ServiceError::IsNotManualStop { event_id },
                "IS_NOT_MANUAL_STOP",
                400,
            ),
            (ServiceError::HasStopped { event_id }, "HAS_STOPPED", 400),
            (ServiceError::NotStopped { event_id }, "NOT_STOPPED", 400),
            (
                ServiceError::Check {
                    event_id,
                    user_id,
                    reason: CheckError::NotTracked,
                },
                "CHECK_NOT_TRACKED",
                400,
            ),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status_code(), status, "{code}");
        }
    }

    #[test]
    fn test_only_internal_errors_are_fatal() {
        let event_id = EventId::new();
        let user_id = UserId::new();

        assert!(ServiceError::NotJoined { event_id, user_id }.is_fatal());
        assert!(ServiceError::from(StoreError::LockPoisoned).is_fatal());
        assert!(!ServiceError::NotFound { event_id }.is_fatal());
        assert!(!ServiceError::AlreadyJoined { event_id, user_id }.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let event_id = EventId::new();
        let err = ServiceError::HasStopped { event_id };
        assert_eq!(err.to_string(), format!("Event {event_id} has already stopped"));
    }
}
