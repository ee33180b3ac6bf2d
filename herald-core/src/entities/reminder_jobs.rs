use crate::entities::{ReminderJobStatus, ReminderSlot};
use crate::framework::DatabaseProcessor;
use herald_sdk::objects::RecipientFilter;
use kanau::processor::Processor;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted reminder fire-time.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ReminderJob {
    pub job_id: Uuid,
    pub event_id: Uuid,
    pub slot: ReminderSlot,
    pub fire_at: OffsetDateTime,
    #[sqlx(json)]
    pub recipients: RecipientFilter,
    pub status: ReminderJobStatus,
    pub created_at: OffsetDateTime,
}

/// Data for inserting a new reminder job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminderJob {
    pub slot: ReminderSlot,
    pub fire_at: OffsetDateTime,
    pub recipients: RecipientFilter,
    pub status: ReminderJobStatus,
}

impl NewReminderJob {
    pub fn into_job(self, event_id: Uuid, now: OffsetDateTime) -> ReminderJob {
        ReminderJob {
            job_id: Uuid::now_v7(),
            event_id,
            slot: self.slot,
            fire_at: self.fire_at,
            recipients: self.recipients,
            status: self.status,
            created_at: now,
        }
    }
}

const JOB_COLUMNS: &str = "job_id, event_id, slot, fire_at, recipients, status, created_at";

#[derive(Debug, Clone)]
/// Replace every not-yet-fired job of an event in one transaction.
///
/// Fired rows are history and survive the replacement.
pub struct ReplaceReminderJobs {
    pub event_id: Uuid,
    pub jobs: Vec<NewReminderJob>,
    pub now: OffsetDateTime,
}

impl Processor<ReplaceReminderJobs> for DatabaseProcessor {
    type Output = Vec<ReminderJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ReplaceReminderJobs")]
    async fn process(&self, cmd: ReplaceReminderJobs) -> Result<Vec<ReminderJob>, sqlx::Error> {
        let ReplaceReminderJobs {
            event_id,
            jobs,
            now,
        } = cmd;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM reminder_jobs WHERE event_id = $1 AND status IN ('pending', 'skipped')",
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        if jobs.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let jobs: Vec<ReminderJob> = jobs
            .into_iter()
            .map(|job| job.into_job(event_id, now))
            .collect();

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO reminder_jobs \
            (job_id, event_id, slot, fire_at, recipients, status, created_at) ",
        );
        query_builder.push_values(&jobs, |mut b, job| {
            b.push_bind(job.job_id)
                .push_bind(job.event_id)
                .push_bind(job.slot)
                .push_bind(job.fire_at)
                .push_bind(Json(job.recipients))
                .push_bind(job.status)
                .push_bind(job.created_at);
        });
        query_builder.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(jobs)
    }
}

#[derive(Debug, Clone)]
/// Pending jobs whose fire-time has passed, oldest first.
pub struct GetDueReminderJobs {
    pub now: OffsetDateTime,
}

impl Processor<GetDueReminderJobs> for DatabaseProcessor {
    type Output = Vec<ReminderJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDueReminderJobs")]
    async fn process(&self, query: GetDueReminderJobs) -> Result<Vec<ReminderJob>, sqlx::Error> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM reminder_jobs \
             WHERE status = 'pending' AND fire_at <= $1 \
             ORDER BY fire_at ASC"
        );
        sqlx::query_as::<_, ReminderJob>(&sql)
            .bind(query.now)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Move a pending job to its final status.
pub struct MarkReminderJob {
    pub job_id: Uuid,
    pub status: ReminderJobStatus,
}

impl Processor<MarkReminderJob> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkReminderJob")]
    async fn process(&self, cmd: MarkReminderJob) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE reminder_jobs SET status = $2 WHERE job_id = $1 AND status = 'pending'",
        )
        .bind(cmd.job_id)
        .bind(cmd.status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct CancelPendingReminderJobs {
    pub event_id: Uuid,
}

impl Processor<CancelPendingReminderJobs> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CancelPendingReminderJobs")]
    async fn process(&self, cmd: CancelPendingReminderJobs) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM reminder_jobs WHERE event_id = $1 AND status = 'pending'")
                .bind(cmd.event_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Whether reminders were ever scheduled for an event.
pub struct HasReminderHistory {
    pub event_id: Uuid,
}

impl Processor<HasReminderHistory> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:HasReminderHistory")]
    async fn process(&self, query: HasReminderHistory) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reminder_jobs WHERE event_id = $1)",
        )
        .bind(query.event_id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListReminderJobs {
    pub event_id: Uuid,
}

impl Processor<ListReminderJobs> for DatabaseProcessor {
    type Output = Vec<ReminderJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListReminderJobs")]
    async fn process(&self, query: ListReminderJobs) -> Result<Vec<ReminderJob>, sqlx::Error> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM reminder_jobs WHERE event_id = $1 ORDER BY fire_at ASC"
        );
        sqlx::query_as::<_, ReminderJob>(&sql)
            .bind(query.event_id)
            .fetch_all(&self.pool)
            .await
    }
}
