//! Event directory: creation, lookup, listing and the manual stop/restart
//! lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!            stop (manual_stop, end unset)
//!   open ─────────────────────────────────▶ stopped (end = now)
//!     ▲                                        │
//!     └────────────────────────────────────────┘
//!            restart (manual_stop, end set)
//! ```
//!
//! Deadline closure is evaluated on demand and never written back.

use crate::environment::AttendanceEnvironment;
use crate::error::{Result, ServiceError};
use crate::types::{Event, EventForm, EventId, EventView, UserId};
use chrono::{DateTime, Utc};

/// Owns event documents on behalf of organizers and browsing users.
#[derive(Clone)]
pub struct EventDirectory {
    env: AttendanceEnvironment,
}

impl EventDirectory {
    /// Creates a new `EventDirectory`
    #[must_use]
    pub const fn new(env: AttendanceEnvironment) -> Self {
        Self { env }
    }

    /// Loads an event or fails with `NOT_FOUND`.
    async fn load(&self, event_id: EventId) -> Result<Event> {
        self.env
            .store
            .find_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound { event_id })
    }

    /// Fetch a single event.
    ///
    /// With a viewer, `joined` tells whether the viewer is on the roster.
    /// The roster itself is never returned.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn get(&self, event_id: EventId, viewer: Option<UserId>) -> Result<EventView> {
        let event = self.load(event_id).await?;
        tracing::debug!("Event loaded");
        Ok(event.view(viewer))
    }

    /// List all events, newest first, annotated with `joined` for `viewer`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, viewer: Option<UserId>) -> Result<Vec<EventView>> {
        let events = self.env.store.list_events(viewer).await?;
        tracing::debug!(count = events.len(), "Events listed");
        Ok(events)
    }

    /// Create an event owned by `owner_id` and return its id.
    ///
    /// Only the fields set on `form` are stored.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    #[tracing::instrument(skip(self, form), fields(owner_id = %owner_id))]
    pub async fn create(&self, owner_id: UserId, form: EventForm) -> Result<EventId> {
        let event_id = self.env.store.insert_event(owner_id, form).await?;
        tracing::info!(event_id = %event_id, "Event created");
        Ok(event_id)
    }

    /// Merge the fields set on `form` into an existing event.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self, form), fields(event_id = %event_id))]
    pub async fn update(&self, event_id: EventId, form: EventForm) -> Result<()> {
        if !self.env.store.update_event(event_id, form).await? {
            tracing::warn!("Update of unknown event rejected");
            return Err(ServiceError::NotFound { event_id });
        }
        tracing::info!("Event updated");
        Ok(())
    }

    /// Whether the current time is past the event's `end`.
    ///
    /// Events without an `end` are never stopped, whatever `manual_stop` says.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn is_stopped(&self, event_id: EventId) -> Result<bool> {
        let event = self.load(event_id).await?;
        Ok(event.is_stopped_at(self.env.clock.now()))
    }

    /// Stop a manually stoppable event now and return the recorded `end`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::IsNotManualStop`] if `manual_stop` is off
    /// - [`ServiceError::HasStopped`] if `end` is already set
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn stop(&self, event_id: EventId) -> Result<DateTime<Utc>> {
        let event = self.load(event_id).await?;
        if !event.details.manual_stop {
            tracing::warn!("Stop of non-manual event rejected");
            return Err(ServiceError::IsNotManualStop { event_id });
        }
        if event.details.end.is_some() {
            tracing::warn!("Stop of stopped event rejected");
            return Err(ServiceError::HasStopped { event_id });
        }

        let now = self.env.clock.now();
        // Guarded write: a concurrent stop may have won since the read.
        if !self.env.store.stop_event(event_id, now).await? {
            tracing::warn!("Concurrent stop detected");
            return Err(ServiceError::HasStopped { event_id });
        }

        metrics::counter!("attendance_lifecycle_total", "action" => "stop").increment(1);
        tracing::info!(end = %now, "Event stopped");
        Ok(now)
    }

    /// Restart a manually stopped event by clearing its `end`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::IsNotManualStop`] if `manual_stop` is off
    /// - [`ServiceError::NotStopped`] if `end` is not set
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn restart(&self, event_id: EventId) -> Result<()> {
        let event = self.load(event_id).await?;
        if !event.details.manual_stop {
            tracing::warn!("Restart of non-manual event rejected");
            return Err(ServiceError::IsNotManualStop { event_id });
        }
        if event.details.end.is_none() {
            tracing::warn!("Restart of running event rejected");
            return Err(ServiceError::NotStopped { event_id });
        }

        if !self.env.store.restart_event(event_id).await? {
            tracing::warn!("Concurrent restart detected");
            return Err(ServiceError::NotStopped { event_id });
        }

        metrics::counter!("attendance_lifecycle_total", "action" => "restart").increment(1);
        tracing::info!("Event restarted");
        Ok(())
    }
}
