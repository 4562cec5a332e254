//! `PostgreSQL` attendance store.
//!
//! Implements [`AttendanceStore`] on three tables:
//!
//! - `attendance_events`: one row per event, settings as JSONB
//! - `event_roster`: one row per enrolled user, with their status
//! - `participation_history`: the per-user mirror of `event_roster`
//!
//! Every compound write runs in a single transaction that first locks the
//! event row with `SELECT ... FOR UPDATE`. Concurrent joins on one event are
//! serialized there, so the capacity check reads the limit and the roster
//! as of the same moment, and both inserts either all land or none do.
//! Status overwrites are guarded the same way: the roster status is compared
//! with the expected one under the lock before anything is written.
//!
//! # Example
//!
//! ```ignore
//! use attendance_postgres::{PostgresAttendanceStore, PostgresConfig};
//!
//! let store = PostgresAttendanceStore::connect(&PostgresConfig::from_env()).await?;
//! store.migrate().await?;
//! // ... hand `Arc::new(store.clone())` to the services ...
//! store.close().await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;

pub use config::{DEFAULT_DATABASE_URL, PostgresConfig};

use attendance_core::StoreError;
use attendance_core::store::{
    AttendanceStore, EnrollOutcome, Enrollment, StatusChange, StatusOutcome, StoreFuture,
    WithdrawOutcome,
};
use attendance_core::types::{
    Event, EventDetails, EventForm, EventId, EventView, HistoryRecord, ParticipationStatus, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

type Tx = Transaction<'static, Postgres>;

/// Maps a sqlx error onto [`StoreError`], keeping decode failures apart.
fn store_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match e {
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
            StoreError::Serialization(format!("{context}: {e}"))
        }
        _ => StoreError::Database(format!("{context}: {e}")),
    }
}

/// PostgreSQL-backed [`AttendanceStore`].
///
/// Cloning shares the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresAttendanceStore {
    pool: PgPool,
}

impl PostgresAttendanceStore {
    /// Open a connection pool with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .map_err(store_error("Failed to connect"))?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connected to attendance database"
        );

        Ok(Self::from_pool(pool))
    }

    /// Use an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create or upgrade the attendance tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Attendance migrations applied");
        Ok(())
    }

    /// Close every pooled connection. Pending calls finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Attendance database pool closed");
    }

    async fn begin(&self) -> Result<Tx, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(store_error("Failed to begin transaction"))
    }

    async fn commit(tx: Tx) -> Result<(), StoreError> {
        tx.commit()
            .await
            .map_err(store_error("Failed to commit transaction"))
    }

    /// Locks the event row for the rest of `tx` and returns its settings.
    async fn lock_event(
        tx: &mut Tx,
        event_id: EventId,
    ) -> Result<Option<EventDetails>, StoreError> {
        let row: Option<(Json<EventDetails>,)> =
            sqlx::query_as("SELECT details FROM attendance_events WHERE id = $1 FOR UPDATE")
                .bind(event_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(store_error("Failed to lock event"))?;
        Ok(row.map(|(Json(details),)| details))
    }

    async fn write_details(
        tx: &mut Tx,
        event_id: EventId,
        details: &EventDetails,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE attendance_events SET details = $2 WHERE id = $1")
            .bind(event_id.as_uuid())
            .bind(Json(details))
            .execute(&mut **tx)
            .await
            .map_err(store_error("Failed to update event"))?;
        Ok(())
    }

    async fn upsert_history(
        tx: &mut Tx,
        event_id: EventId,
        user_id: UserId,
        status: ParticipationStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO participation_history (user_id, event_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, event_id)
            DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            ",
        )
        .bind(user_id.as_uuid())
        .bind(event_id.as_uuid())
        .bind(Json(status))
        .execute(&mut **tx)
        .await
        .map_err(store_error("Failed to write history"))?;
        Ok(())
    }

    /// Runs `change` on the locked settings and persists them if it
    /// returns `true`.
    async fn modify_details(
        &self,
        event_id: EventId,
        change: impl FnOnce(&mut EventDetails) -> bool + Send,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let Some(mut details) = Self::lock_event(&mut tx, event_id).await? else {
            return Ok(false);
        };
        if !change(&mut details) {
            return Ok(false);
        }
        Self::write_details(&mut tx, event_id, &details).await?;
        Self::commit(tx).await?;
        Ok(true)
    }

    async fn load_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        // One statement, one snapshot: settings and roster agree.
        let rows: Vec<(
            Uuid,
            Uuid,
            Json<EventDetails>,
            Option<Uuid>,
            Option<Json<ParticipationStatus>>,
        )> = sqlx::query_as(
            r"
            SELECT e.id, e.owner_id, e.details, r.user_id, r.status
            FROM attendance_events e
            LEFT JOIN event_roster r ON r.event_id = e.id
            WHERE e.id = $1
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Failed to load event"))?;

        let mut rows = rows.into_iter();
        let Some((id, owner_id, Json(details), first_user, first_status)) = rows.next() else {
            return Ok(None);
        };

        let mut event = Event::new(EventId::from_uuid(id), UserId::from_uuid(owner_id), details);
        let members = std::iter::once((first_user, first_status))
            .chain(rows.map(|(_, _, _, user, status)| (user, status)));
        for (user, status) in members {
            if let (Some(user), Some(Json(status))) = (user, status) {
                let user_id = UserId::from_uuid(user);
                event.roll.insert(user_id);
                event.status.insert(user_id, status);
            }
        }
        Ok(Some(event))
    }

    async fn load_views(&self, viewer: Option<UserId>) -> Result<Vec<EventView>, StoreError> {
        let rows: Vec<(Uuid, Uuid, Json<EventDetails>, bool)> = sqlx::query_as(
            r"
            SELECT e.id, e.owner_id, e.details,
                   EXISTS (
                       SELECT 1 FROM event_roster r
                       WHERE r.event_id = e.id AND r.user_id = $1
                   ) AS joined
            FROM attendance_events e
            ORDER BY e.id DESC
            ",
        )
        .bind(viewer.map(|user_id| *user_id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Failed to list events"))?;

        Ok(rows
            .into_iter()
            .map(|(id, owner_id, Json(details), joined)| EventView {
                id: EventId::from_uuid(id),
                owner_id: UserId::from_uuid(owner_id),
                details,
                joined,
            })
            .collect())
    }

    async fn insert(&self, owner_id: UserId, form: EventForm) -> Result<EventId, StoreError> {
        let event_id = EventId::new();
        sqlx::query("INSERT INTO attendance_events (id, owner_id, details) VALUES ($1, $2, $3)")
            .bind(event_id.as_uuid())
            .bind(owner_id.as_uuid())
            .bind(Json(form.to_details()))
            .execute(&self.pool)
            .await
            .map_err(store_error("Failed to insert event"))?;
        Ok(event_id)
    }

    async fn enroll_user(&self, enrollment: Enrollment) -> Result<EnrollOutcome, StoreError> {
        let Enrollment {
            event_id,
            user_id,
            status,
        } = enrollment;

        let mut tx = self.begin().await?;
        let Some(details) = Self::lock_event(&mut tx, event_id).await? else {
            return Ok(EnrollOutcome::EventMissing);
        };

        if let Some(max_count) = details.capacity() {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM event_roster WHERE event_id = $1")
                    .bind(event_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(store_error("Failed to count roster"))?;
            if count >= i64::from(max_count) {
                return Ok(EnrollOutcome::Full { max_count });
            }
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO event_roster (event_id, user_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id, user_id) DO NOTHING
            ",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(Json(status))
        .execute(&mut *tx)
        .await
        .map_err(store_error("Failed to insert roster entry"))?
        .rows_affected();
        if inserted == 0 {
            return Ok(EnrollOutcome::AlreadyEnrolled);
        }

        Self::upsert_history(&mut tx, event_id, user_id, status).await?;
        Self::commit(tx).await?;
        Ok(EnrollOutcome::Enrolled)
    }

    async fn withdraw_user(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<WithdrawOutcome, StoreError> {
        let mut tx = self.begin().await?;
        if Self::lock_event(&mut tx, event_id).await?.is_none() {
            return Ok(WithdrawOutcome::EventMissing);
        }

        let removed = sqlx::query("DELETE FROM event_roster WHERE event_id = $1 AND user_id = $2")
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error("Failed to delete roster entry"))?
            .rows_affected();
        if removed == 0 {
            return Ok(WithdrawOutcome::NotEnrolled);
        }

        sqlx::query("DELETE FROM participation_history WHERE user_id = $1 AND event_id = $2")
            .bind(user_id.as_uuid())
            .bind(event_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error("Failed to delete history"))?;

        Self::commit(tx).await?;
        Ok(WithdrawOutcome::Withdrawn)
    }

    async fn overwrite_status(&self, change: StatusChange) -> Result<StatusOutcome, StoreError> {
        let StatusChange {
            event_id,
            user_id,
            expected,
            status,
        } = change;

        let mut tx = self.begin().await?;
        if Self::lock_event(&mut tx, event_id).await?.is_none() {
            return Ok(StatusOutcome::NotEnrolled);
        }

        let row: Option<(Json<ParticipationStatus>,)> = sqlx::query_as(
            "SELECT status FROM event_roster WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error("Failed to read roster status"))?;
        let Some((Json(current),)) = row else {
            return Ok(StatusOutcome::NotEnrolled);
        };
        if current != expected {
            return Ok(StatusOutcome::Stale { current });
        }

        sqlx::query("UPDATE event_roster SET status = $3 WHERE event_id = $1 AND user_id = $2")
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(Json(status))
            .execute(&mut *tx)
            .await
            .map_err(store_error("Failed to update roster status"))?;

        Self::upsert_history(&mut tx, event_id, user_id, status).await?;
        Self::commit(tx).await?;
        Ok(StatusOutcome::Recorded)
    }

    async fn history_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT event_id FROM participation_history WHERE user_id = $1 ORDER BY event_id",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Failed to load history"))?;

        Ok(rows.into_iter().map(|(id,)| EventId::from_uuid(id)).collect())
    }

    async fn history_for_event(&self, event_id: EventId) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows: Vec<(Uuid, Json<ParticipationStatus>)> = sqlx::query_as(
            r"
            SELECT user_id, status FROM participation_history
            WHERE event_id = $1
            ORDER BY user_id
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Failed to load event history"))?;

        Ok(rows
            .into_iter()
            .map(|(user_id, Json(status))| HistoryRecord {
                user_id: UserId::from_uuid(user_id),
                event_id,
                status,
            })
            .collect())
    }
}

impl AttendanceStore for PostgresAttendanceStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(self.load_event(event_id))
    }

    fn list_events(&self, viewer: Option<UserId>) -> StoreFuture<'_, Vec<EventView>> {
        Box::pin(self.load_views(viewer))
    }

    fn insert_event(&self, owner_id: UserId, form: EventForm) -> StoreFuture<'_, EventId> {
        Box::pin(self.insert(owner_id, form))
    }

    fn update_event(&self, event_id: EventId, form: EventForm) -> StoreFuture<'_, bool> {
        Box::pin(self.modify_details(event_id, move |details| {
            form.merge_into(details);
            true
        }))
    }

    fn stop_event(&self, event_id: EventId, at: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(self.modify_details(event_id, move |details| {
            if !details.manual_stop || details.end.is_some() {
                return false;
            }
            details.end = Some(at);
            true
        }))
    }

    fn restart_event(&self, event_id: EventId) -> StoreFuture<'_, bool> {
        Box::pin(self.modify_details(event_id, |details| {
            if !details.manual_stop || details.end.is_none() {
                return false;
            }
            details.end = None;
            true
        }))
    }

    fn enroll(&self, enrollment: Enrollment) -> StoreFuture<'_, EnrollOutcome> {
        Box::pin(self.enroll_user(enrollment))
    }

    fn withdraw(&self, event_id: EventId, user_id: UserId) -> StoreFuture<'_, WithdrawOutcome> {
        Box::pin(self.withdraw_user(event_id, user_id))
    }

    fn record_status(&self, change: StatusChange) -> StoreFuture<'_, StatusOutcome> {
        Box::pin(self.overwrite_status(change))
    }

    fn joined_event_ids(&self, user_id: UserId) -> StoreFuture<'_, Vec<EventId>> {
        Box::pin(self.history_event_ids(user_id))
    }

    fn event_history(&self, event_id: EventId) -> StoreFuture<'_, Vec<HistoryRecord>> {
        Box::pin(self.history_for_event(event_id))
    }
}
