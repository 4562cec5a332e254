//! Domain types for event attendance.
//!
//! An [`Event`] carries its roster (`roll`) and a per-participant status map.
//! Each enrolled user also owns a [`HistoryRecord`] mirroring that status.
//! Callers only ever see events through [`EventView`], which never exposes
//! the roster.

use crate::error::{CheckError, ServiceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event.
///
/// Backed by a UUIDv7, so ids sort by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new time-ordered `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a user.
///
/// Users are owned by the identity layer; this crate only stores their ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new time-ordered `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Participation status
// ============================================================================

/// Attendance status of one participant in one event.
///
/// The shape is chosen at join time from the event's `need_check` flag and
/// never changes for that participation. Serialized as a bare boolean or as
/// `{"checkIn": ..., "checkOut": ...}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipationStatus {
    /// No check-in/check-out tracking.
    Untracked(bool),
    /// Check-in/check-out timestamps, `None` until recorded.
    Tracked {
        /// When the participant checked in
        #[serde(rename = "checkIn")]
        check_in: Option<DateTime<Utc>>,
        /// When the participant checked out
        #[serde(rename = "checkOut")]
        check_out: Option<DateTime<Utc>>,
    },
}

impl ParticipationStatus {
    /// Status stored for a fresh participation.
    #[must_use]
    pub const fn initial(need_check: bool) -> Self {
        if need_check {
            Self::Tracked {
                check_in: None,
                check_out: None,
            }
        } else {
            Self::Untracked(false)
        }
    }

    /// Whether check-in/check-out timestamps are tracked.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked { .. })
    }

    /// Whether both statuses use the same variant.
    #[must_use]
    pub const fn same_shape(&self, other: &Self) -> bool {
        self.is_tracked() == other.is_tracked()
    }

    /// Returns the status with `check_in` recorded at `at`.
    ///
    /// # Errors
    ///
    /// - [`CheckError::NotTracked`] for untracked participations
    /// - [`CheckError::AlreadyCheckedIn`] if a check-in is already recorded
    pub fn checked_in(self, at: DateTime<Utc>) -> Result<Self, CheckError> {
        match self {
            Self::Untracked(_) => Err(CheckError::NotTracked),
            Self::Tracked {
                check_in: Some(_), ..
            } => Err(CheckError::AlreadyCheckedIn),
            Self::Tracked {
                check_in: None,
                check_out,
            } => Ok(Self::Tracked {
                check_in: Some(at),
                check_out,
            }),
        }
    }

    /// Returns the status with `check_out` recorded at `at`.
    ///
    /// # Errors
    ///
    /// - [`CheckError::NotTracked`] for untracked participations
    /// - [`CheckError::NotCheckedIn`] if no check-in was recorded yet
    /// - [`CheckError::AlreadyCheckedOut`] if a check-out is already recorded
    pub fn checked_out(self, at: DateTime<Utc>) -> Result<Self, CheckError> {
        match self {
            Self::Untracked(_) => Err(CheckError::NotTracked),
            Self::Tracked { check_in: None, .. } => Err(CheckError::NotCheckedIn),
            Self::Tracked {
                check_out: Some(_), ..
            } => Err(CheckError::AlreadyCheckedOut),
            Self::Tracked {
                check_in,
                check_out: None,
            } => Ok(Self::Tracked {
                check_in,
                check_out: Some(at),
            }),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Public settings of an event: everything except identity and roster.
///
/// Fields left unset at creation stay `None` (or `false`); they are never
/// filled with placeholders, and unset fields are left out of the
/// serialized document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct EventDetails {
    /// Event title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Organizing party, as displayed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    /// Venue address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Scheduled start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    /// Closure time: preset, or set by a manual stop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Long-running event without a fixed schedule
    pub longtime: bool,
    /// Whether participation awards points
    pub with_point: bool,
    /// Description of the points awarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_detail: Option<String>,
    /// Whether participation carries a reward
    pub with_reward: bool,
    /// Description of the reward
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_detail: Option<String>,
    /// Whether the event is a competition
    pub is_competition: bool,
    /// Enforce `max_count` on the roster size
    pub limit_count: bool,
    /// Maximum roster size when `limit_count` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    /// Track check-in/check-out per participant
    pub need_check: bool,
    /// Join cutoff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Organizer may stop and restart the event by hand
    pub manual_stop: bool,
}

impl EventDetails {
    /// Effective roster limit.
    ///
    /// `limit_count` without a `max_count` imposes no limit.
    #[must_use]
    pub fn capacity(&self) -> Option<u32> {
        self.max_count.filter(|_| self.limit_count)
    }
}

/// An event document as held by the store, roster included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Organizer account that created the event
    pub owner_id: UserId,
    /// Public settings
    #[serde(flatten)]
    pub details: EventDetails,
    /// Enrolled participants
    pub roll: BTreeSet<UserId>,
    /// Per-participant status, keyed like `roll`
    pub status: BTreeMap<UserId, ParticipationStatus>,
}

impl Event {
    /// Creates an event with an empty roster.
    #[must_use]
    pub const fn new(id: EventId, owner_id: UserId, details: EventDetails) -> Self {
        Self {
            id,
            owner_id,
            details,
            roll: BTreeSet::new(),
            status: BTreeMap::new(),
        }
    }

    /// Whether `user_id` is on the roster.
    #[must_use]
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.roll.contains(user_id)
    }

    /// Effective roster limit, see [`EventDetails::capacity`].
    #[must_use]
    pub fn capacity(&self) -> Option<u32> {
        self.details.capacity()
    }

    /// Whether the roster has reached its limit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity()
            .is_some_and(|max| self.roll.len() >= usize::try_from(max).unwrap_or(usize::MAX))
    }

    /// Whether `now` is past the join cutoff. Joining exactly at the deadline
    /// is still allowed.
    #[must_use]
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.details.deadline.is_some_and(|deadline| deadline < now)
    }

    /// Whether `now` is past the closure time.
    #[must_use]
    pub fn is_stopped_at(&self, now: DateTime<Utc>) -> bool {
        self.details.end.is_some_and(|end| now > end)
    }

    /// Checks whether `user_id` may join at `now` and returns the status the
    /// participation starts with.
    ///
    /// Checks run in order: deadline, capacity, membership.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::DeadlinePassed`]
    /// - [`ServiceError::CapacityExceeded`]
    /// - [`ServiceError::AlreadyJoined`]
    pub fn admit(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ParticipationStatus, ServiceError> {
        if let Some(deadline) = self.details.deadline.filter(|d| *d < now) {
            return Err(ServiceError::DeadlinePassed {
                event_id: self.id,
                deadline,
            });
        }

        if self.is_full() {
            return Err(ServiceError::CapacityExceeded {
                event_id: self.id,
                max_count: self.capacity().unwrap_or_default(),
            });
        }

        if self.is_member(&user_id) {
            return Err(ServiceError::AlreadyJoined {
                event_id: self.id,
                user_id,
            });
        }

        Ok(ParticipationStatus::initial(self.details.need_check))
    }

    /// Public projection of the event for `viewer`.
    #[must_use]
    pub fn view(&self, viewer: Option<UserId>) -> EventView {
        EventView {
            id: self.id,
            owner_id: self.owner_id,
            details: self.details.clone(),
            joined: viewer.is_some_and(|user_id| self.is_member(&user_id)),
        }
    }
}

/// Public projection of an event.
///
/// `joined` is `false` whenever no viewer was supplied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    /// Event identifier
    pub id: EventId,
    /// Organizer account that created the event
    pub owner_id: UserId,
    /// Public settings
    #[serde(flatten)]
    pub details: EventDetails,
    /// Whether the viewer is on the roster
    pub joined: bool,
}

/// Create/update form. Only `Some` fields are written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventForm {
    /// Event title
    pub title: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Organizing party
    pub organizer: Option<String>,
    /// Venue address
    pub address: Option<String>,
    /// Scheduled start
    pub start: Option<DateTime<Utc>>,
    /// Preset closure time
    pub end: Option<DateTime<Utc>>,
    /// Long-running event
    pub longtime: Option<bool>,
    /// Whether participation awards points
    pub with_point: Option<bool>,
    /// Description of the points awarded
    pub point_detail: Option<String>,
    /// Whether participation carries a reward
    pub with_reward: Option<bool>,
    /// Description of the reward
    pub reward_detail: Option<String>,
    /// Whether the event is a competition
    pub is_competition: Option<bool>,
    /// Enforce `max_count`
    pub limit_count: Option<bool>,
    /// Maximum roster size
    pub max_count: Option<u32>,
    /// Track check-in/check-out
    pub need_check: Option<bool>,
    /// Join cutoff
    pub deadline: Option<DateTime<Utc>>,
    /// Allow manual stop/restart
    pub manual_stop: Option<bool>,
}

impl EventForm {
    /// Writes every set field into `details`, leaving the rest untouched.
    pub fn merge_into(&self, details: &mut EventDetails) {
        fn set<T: Clone>(target: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        set_opt(&mut details.title, self.title.as_ref());
        set_opt(&mut details.description, self.description.as_ref());
        set_opt(&mut details.organizer, self.organizer.as_ref());
        set_opt(&mut details.address, self.address.as_ref());
        set_opt(&mut details.start, self.start.as_ref());
        set_opt(&mut details.end, self.end.as_ref());
        set(&mut details.longtime, self.longtime.as_ref());
        set(&mut details.with_point, self.with_point.as_ref());
        set_opt(&mut details.point_detail, self.point_detail.as_ref());
        set(&mut details.with_reward, self.with_reward.as_ref());
        set_opt(&mut details.reward_detail, self.reward_detail.as_ref());
        set(&mut details.is_competition, self.is_competition.as_ref());
        set(&mut details.limit_count, self.limit_count.as_ref());
        set_opt(&mut details.max_count, self.max_count.as_ref());
        set(&mut details.need_check, self.need_check.as_ref());
        set_opt(&mut details.deadline, self.deadline.as_ref());
        set(&mut details.manual_stop, self.manual_stop.as_ref());
    }

    /// Settings of a freshly created event.
    #[must_use]
    pub fn to_details(&self) -> EventDetails {
        let mut details = EventDetails::default();
        self.merge_into(&mut details);
        details
    }
}

// ============================================================================
// History
// ============================================================================

/// A user's record of one participation, mirroring the roster status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Participant
    pub user_id: UserId,
    /// Event joined
    pub event_id: EventId,
    /// Mirror of the event-side status
    pub status: ParticipationStatus,
}
