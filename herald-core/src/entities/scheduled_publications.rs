use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

/// A deferred publication. At most one row per event.
///
/// A pending row (`sent = false`) is either promoted to `sent` or deleted
/// when cancelled; there is no retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduledPublicationEntry {
    pub event_id: Uuid,
    pub scheduled_time: OffsetDateTime,
    pub sent: bool,
}

#[derive(Debug, Clone)]
/// Insert or replace the schedule of an event. Resets `sent`.
pub struct UpsertScheduledPublication {
    pub event_id: Uuid,
    pub scheduled_time: OffsetDateTime,
}

impl Processor<UpsertScheduledPublication> for DatabaseProcessor {
    type Output = ScheduledPublicationEntry;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertScheduledPublication")]
    async fn process(
        &self,
        cmd: UpsertScheduledPublication,
    ) -> Result<ScheduledPublicationEntry, sqlx::Error> {
        sqlx::query_as::<_, ScheduledPublicationEntry>(
            r#"
            INSERT INTO scheduled_publications (event_id, scheduled_time, sent)
            VALUES ($1, $2, false)
            ON CONFLICT (event_id) DO UPDATE
            SET scheduled_time = EXCLUDED.scheduled_time, sent = false
            RETURNING event_id, scheduled_time, sent
            "#,
        )
        .bind(cmd.event_id)
        .bind(cmd.scheduled_time)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetScheduledPublication {
    pub event_id: Uuid,
}

impl Processor<GetScheduledPublication> for DatabaseProcessor {
    type Output = Option<ScheduledPublicationEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetScheduledPublication")]
    async fn process(
        &self,
        query: GetScheduledPublication,
    ) -> Result<Option<ScheduledPublicationEntry>, sqlx::Error> {
        sqlx::query_as::<_, ScheduledPublicationEntry>(
            "SELECT event_id, scheduled_time, sent FROM scheduled_publications WHERE event_id = $1",
        )
        .bind(query.event_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Delete the pending schedule of an event. Sent rows are kept.
pub struct DeleteScheduledPublication {
    pub event_id: Uuid,
}

impl Processor<DeleteScheduledPublication> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteScheduledPublication")]
    async fn process(&self, cmd: DeleteScheduledPublication) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM scheduled_publications WHERE event_id = $1 AND sent = false",
        )
        .bind(cmd.event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Pending rows whose due time has passed, oldest first.
pub struct GetDueScheduledPublications {
    pub now: OffsetDateTime,
}

impl Processor<GetDueScheduledPublications> for DatabaseProcessor {
    type Output = Vec<ScheduledPublicationEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDueScheduledPublications")]
    async fn process(
        &self,
        query: GetDueScheduledPublications,
    ) -> Result<Vec<ScheduledPublicationEntry>, sqlx::Error> {
        sqlx::query_as::<_, ScheduledPublicationEntry>(
            r#"
            SELECT event_id, scheduled_time, sent
            FROM scheduled_publications
            WHERE sent = false AND scheduled_time <= $1
            ORDER BY scheduled_time ASC
            "#,
        )
        .bind(query.now)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Flip a pending row to sent.
///
/// Returns `false` when there was no pending row, which is how a
/// concurrent or repeated promotion is detected.
pub struct MarkScheduledPublicationSent {
    pub event_id: Uuid,
}

impl Processor<MarkScheduledPublicationSent> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkScheduledPublicationSent")]
    async fn process(&self, cmd: MarkScheduledPublicationSent) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scheduled_publications SET sent = true WHERE event_id = $1 AND sent = false",
        )
        .bind(cmd.event_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct GetNextPendingScheduleTime;

impl Processor<GetNextPendingScheduleTime> for DatabaseProcessor {
    type Output = Option<OffsetDateTime>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetNextPendingScheduleTime")]
    async fn process(
        &self,
        _: GetNextPendingScheduleTime,
    ) -> Result<Option<OffsetDateTime>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<OffsetDateTime>>(
            "SELECT MIN(scheduled_time) FROM scheduled_publications WHERE sent = false",
        )
        .fetch_one(&self.pool)
        .await
    }
}
