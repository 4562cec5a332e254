//! # Attendance Core
//!
//! Event registration and attendance tracking.
//!
//! Organizers create events with capacity and deadline rules; users browse,
//! join and leave them. Every enrollment is recorded twice: on the event's
//! roster and in the user's participation history. This crate keeps the two
//! in sync and runs the manual stop/restart lifecycle.
//!
//! ## Components
//!
//! - [`directory::EventDirectory`]: create, update, get, list, stop, restart
//! - [`roster::RosterManager`]: join, exit, joined list, check-in/out, audit
//! - [`store::AttendanceStore`]: persistence, injected via
//!   [`environment::AttendanceEnvironment`]
//!
//! HTTP routing, authentication and permission checks belong to the caller.
//!
//! ## Example
//!
//! ```ignore
//! use attendance_core::environment::{AttendanceEnvironment, SystemClock};
//! use attendance_core::{EventDirectory, EventForm, RosterManager};
//! use std::sync::Arc;
//!
//! let env = AttendanceEnvironment::new(Arc::new(store), Arc::new(SystemClock));
//! let directory = EventDirectory::new(env.clone());
//! let roster = RosterManager::new(env);
//!
//! let event_id = directory.create(organizer, EventForm::default()).await?;
//! roster.join(user, event_id).await?;
//! assert!(directory.get(event_id, Some(user)).await?.joined);
//! ```

pub mod audit;
pub mod directory;
pub mod environment;
pub mod error;
pub mod roster;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use directory::EventDirectory;
pub use error::{ErrorClass, Result, ServiceError, StoreError};
pub use roster::RosterManager;
pub use types::{
    Event, EventDetails, EventForm, EventId, EventView, HistoryRecord, ParticipationStatus, UserId,
};
