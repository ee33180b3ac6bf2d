use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use herald_sdk::objects::{CycleResponse, CycleStatus};
use kanau::processor::Processor;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// A named time window grouping events.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CycleRecord {
    pub cycle_id: Uuid,
    pub name: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    /// Groups that events created in this cycle inherit.
    #[sqlx(json)]
    pub default_participant_groups: Vec<CompactString>,
}

impl CycleRecord {
    /// Status is never stored; it follows from `now` and the window.
    pub fn status(&self, now: OffsetDateTime) -> CycleStatus {
        if now < self.starts_at {
            CycleStatus::Upcoming
        } else if now > self.ends_at {
            CycleStatus::Completed
        } else {
            CycleStatus::Active
        }
    }

    pub fn to_response(&self, now: OffsetDateTime) -> CycleResponse {
        CycleResponse {
            cycle_id: self.cycle_id,
            name: self.name.clone(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            default_participant_groups: self
                .default_participant_groups
                .iter()
                .map(|group| group.to_string())
                .collect(),
            status: self.status(now),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertCycle {
    pub cycle: CycleRecord,
}

impl Processor<InsertCycle> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertCycle")]
    async fn process(&self, cmd: InsertCycle) -> Result<(), sqlx::Error> {
        let cycle = cmd.cycle;
        sqlx::query(
            r#"
            INSERT INTO cycles (cycle_id, name, starts_at, ends_at, default_participant_groups)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(cycle.cycle_id)
        .bind(cycle.name)
        .bind(cycle.starts_at)
        .bind(cycle.ends_at)
        .bind(Json(cycle.default_participant_groups))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetCycle {
    pub cycle_id: Uuid,
}

impl Processor<GetCycle> for DatabaseProcessor {
    type Output = Option<CycleRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCycle")]
    async fn process(&self, query: GetCycle) -> Result<Option<CycleRecord>, sqlx::Error> {
        sqlx::query_as::<_, CycleRecord>(
            r#"
            SELECT cycle_id, name, starts_at, ends_at, default_participant_groups
            FROM cycles
            WHERE cycle_id = $1
            "#,
        )
        .bind(query.cycle_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListCycles;

impl Processor<ListCycles> for DatabaseProcessor {
    type Output = Vec<CycleRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListCycles")]
    async fn process(&self, _: ListCycles) -> Result<Vec<CycleRecord>, sqlx::Error> {
        sqlx::query_as::<_, CycleRecord>(
            r#"
            SELECT cycle_id, name, starts_at, ends_at, default_participant_groups
            FROM cycles
            ORDER BY starts_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Delete a cycle. Its events stay and lose their cycle reference.
pub struct DeleteCycle {
    pub cycle_id: Uuid,
}

impl Processor<DeleteCycle> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteCycle")]
    async fn process(&self, cmd: DeleteCycle) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cycles WHERE cycle_id = $1")
            .bind(cmd.cycle_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn status_follows_window() {
        let cycle = CycleRecord {
            cycle_id: Uuid::now_v7(),
            name: "Spring".to_string(),
            starts_at: datetime!(2026-03-01 00:00 UTC),
            ends_at: datetime!(2026-05-31 23:59 UTC),
            default_participant_groups: Vec::new(),
        };
        assert_eq!(
            cycle.status(datetime!(2026-02-28 12:00 UTC)),
            CycleStatus::Upcoming
        );
        assert_eq!(cycle.status(cycle.starts_at), CycleStatus::Active);
        assert_eq!(cycle.status(cycle.ends_at), CycleStatus::Active);
        assert_eq!(
            cycle.status(datetime!(2026-06-01 00:00 UTC)),
            CycleStatus::Completed
        );
    }
}
