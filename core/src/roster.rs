//! Roster/history manager: the join/exit protocol.
//!
//! An enrollment lives in two places: the event's roster (with a status
//! entry) and the user's history record. Each join, exit and attendance
//! check goes through a single guarded store call so both sides always
//! change together.

use crate::audit::AuditReport;
use crate::environment::AttendanceEnvironment;
use crate::error::{CheckError, Result, ServiceError};
use crate::store::{EnrollOutcome, Enrollment, StatusChange, StatusOutcome, WithdrawOutcome};
use crate::types::{Event, EventId, ParticipationStatus, UserId};
use chrono::{DateTime, Utc};

/// A check-in or check-out applied to a participant's current status.
type CheckTransition =
    fn(ParticipationStatus, DateTime<Utc>) -> std::result::Result<ParticipationStatus, CheckError>;

/// Keeps event rosters and user participation history in sync.
#[derive(Clone)]
pub struct RosterManager {
    env: AttendanceEnvironment,
}

impl RosterManager {
    /// Creates a new `RosterManager`
    #[must_use]
    pub const fn new(env: AttendanceEnvironment) -> Self {
        Self { env }
    }

    async fn load(&self, event_id: EventId) -> Result<Event> {
        self.env
            .store
            .find_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound { event_id })
    }

    /// Add `user_id` to the event and return the status it starts with.
    ///
    /// Checks run in order: existence, deadline, capacity, membership. The
    /// capacity and membership checks are repeated atomically by the store
    /// against the limit it holds at that moment, so neither racing joins
    /// nor a concurrent update can push the roster past its limit.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::DeadlinePassed`] if the deadline is behind us
    /// - [`ServiceError::CapacityExceeded`] if the roster is full
    /// - [`ServiceError::AlreadyJoined`] if the user is already enrolled
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(user_id = %user_id, event_id = %event_id))]
    pub async fn join(&self, user_id: UserId, event_id: EventId) -> Result<ParticipationStatus> {
        let result = self.try_join(user_id, event_id).await;
        let outcome = match &result {
            Ok(_) => "joined",
            Err(error) => error.code(),
        };
        metrics::counter!("attendance_join_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_join(&self, user_id: UserId, event_id: EventId) -> Result<ParticipationStatus> {
        let event = self.load(event_id).await?;
        let status = event
            .admit(user_id, self.env.clock.now())
            .inspect_err(|error| tracing::warn!(code = error.code(), "Join rejected"))?;

        let enrollment = Enrollment {
            event_id,
            user_id,
            status,
        };

        match self.env.store.enroll(enrollment).await? {
            EnrollOutcome::Enrolled => {
                tracing::info!(tracked = status.is_tracked(), "User joined event");
                Ok(status)
            }
            EnrollOutcome::EventMissing => Err(ServiceError::NotFound { event_id }),
            EnrollOutcome::Full { max_count } => {
                tracing::warn!(max_count, "Join lost capacity race");
                Err(ServiceError::CapacityExceeded {
                    event_id,
                    max_count,
                })
            }
            EnrollOutcome::AlreadyEnrolled => {
                tracing::warn!("Concurrent duplicate join");
                Err(ServiceError::AlreadyJoined { event_id, user_id })
            }
        }
    }

    /// Remove `user_id` from the event and delete their history record.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::NotJoined`] if the user is not enrolled (fatal class)
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(user_id = %user_id, event_id = %event_id))]
    pub async fn exit(&self, user_id: UserId, event_id: EventId) -> Result<()> {
        let event = self.load(event_id).await?;
        if !event.is_member(&user_id) {
            tracing::error!("Exit requested by user missing from roster");
            metrics::counter!("attendance_exit_total", "outcome" => "NOT_JOINED").increment(1);
            return Err(ServiceError::NotJoined { event_id, user_id });
        }

        let result = match self.env.store.withdraw(event_id, user_id).await? {
            WithdrawOutcome::Withdrawn => {
                tracing::info!("User left event");
                Ok(())
            }
            WithdrawOutcome::EventMissing => Err(ServiceError::NotFound { event_id }),
            WithdrawOutcome::NotEnrolled => {
                tracing::error!("User vanished from roster during exit");
                Err(ServiceError::NotJoined { event_id, user_id })
            }
        };

        let outcome = result.as_ref().map_or_else(ServiceError::code, |_| "left");
        metrics::counter!("attendance_exit_total", "outcome" => outcome).increment(1);
        result
    }

    /// Ids of the events `user_id` has joined.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn joined_list(&self, user_id: UserId) -> Result<Vec<EventId>> {
        Ok(self.env.store.joined_event_ids(user_id).await?)
    }

    /// Ids of the events `user_id` has joined, in string form.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store fails.
    pub async fn joined_list_strings(&self, user_id: UserId) -> Result<Vec<String>> {
        let ids = self.joined_list(user_id).await?;
        Ok(ids.iter().map(ToString::to_string).collect())
    }

    /// Record the current time as the user's check-in.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::NotJoined`] if the user is not enrolled
    /// - [`ServiceError::Check`] if attendance is untracked or already checked in
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(user_id = %user_id, event_id = %event_id))]
    pub async fn check_in(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<ParticipationStatus> {
        self.record_check(user_id, event_id, ParticipationStatus::checked_in)
            .await
    }

    /// Record the current time as the user's check-out.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::NotJoined`] if the user is not enrolled
    /// - [`ServiceError::Check`] if attendance is untracked, not checked in
    ///   yet, or already checked out
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(user_id = %user_id, event_id = %event_id))]
    pub async fn check_out(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<ParticipationStatus> {
        self.record_check(user_id, event_id, ParticipationStatus::checked_out)
            .await
    }

    // The store only applies a transition to the status it was computed
    // from. When another check wins the race, the transition is retried on
    // the status that won.
    async fn record_check(
        &self,
        user_id: UserId,
        event_id: EventId,
        transition: CheckTransition,
    ) -> Result<ParticipationStatus> {
        let event = self.load(event_id).await?;
        let Some(mut current) = event.status.get(&user_id).copied() else {
            tracing::error!("Attendance check for user missing from roster");
            return Err(ServiceError::NotJoined { event_id, user_id });
        };

        loop {
            let next = transition(current, self.env.clock.now()).map_err(|reason| {
                tracing::warn!(code = reason.code(), "Attendance check rejected");
                ServiceError::Check {
                    event_id,
                    user_id,
                    reason,
                }
            })?;

            let change = StatusChange {
                event_id,
                user_id,
                expected: current,
                status: next,
            };
            match self.env.store.record_status(change).await? {
                StatusOutcome::Recorded => {
                    tracing::info!(status = ?next, "Attendance recorded");
                    return Ok(next);
                }
                StatusOutcome::NotEnrolled => {
                    tracing::error!("User vanished from roster during attendance check");
                    return Err(ServiceError::NotJoined { event_id, user_id });
                }
                StatusOutcome::Stale { current: latest } => {
                    tracing::debug!(status = ?latest, "Attendance changed concurrently");
                    current = latest;
                }
            }
        }
    }

    /// Compare the event roster with the history records pointing at it.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the event does not exist
    /// - [`ServiceError::Store`] if the store fails
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn audit(&self, event_id: EventId) -> Result<AuditReport> {
        let event = self.load(event_id).await?;
        let history = self.env.store.event_history(event_id).await?;
        let report = AuditReport::reconcile(&event, &history);

        if report.is_consistent() {
            tracing::debug!(participants = event.roll.len(), "Roster consistent");
        } else {
            tracing::error!(
                roster_only = report.roster_only.len(),
                history_only = report.history_only.len(),
                status_mismatch = report.status_mismatch.len(),
                "Roster and history diverged"
            );
        }
        Ok(report)
    }
}
