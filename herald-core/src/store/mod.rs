//! Persistence seams.
//!
//! Components never talk to a database directly; they hold an
//! `Arc<dyn Store>`. [`DatabaseProcessor`](crate::framework::DatabaseProcessor)
//! implements the traits on top of the SQL commands in `entities`, and
//! [`MemoryStore`] keeps everything in process.

mod images;
mod memory;
mod postgres;

pub use images::{HttpImageStore, ImageError, ImageStore, NoopImageStore};
pub use memory::MemoryStore;

use crate::entities::ReminderJobStatus;
use crate::entities::cycle_records::CycleRecord;
use crate::entities::event_records::{ChannelPublications, EventChanges, EventRecord};
use crate::entities::participants::Participant;
use crate::entities::reminder_jobs::{NewReminderJob, ReminderJob};
use crate::entities::scheduled_publications::ScheduledPublicationEntry;
use async_trait::async_trait;
use compact_str::CompactString;
use herald_sdk::objects::ReminderConfig;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store did not respond within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, record: &EventRecord) -> Result<(), StoreError>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRecord>, StoreError>;

    async fn list_events(&self, cycle_id: Option<Uuid>) -> Result<Vec<EventRecord>, StoreError>;

    /// Apply field edits and return the stored result.
    async fn update_event_fields(
        &self,
        event_id: Uuid,
        changes: &EventChanges,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError>;

    /// Merge `added` into the publication map as it is stored right now and
    /// clear `scheduled_publication`.
    async fn merge_channel_publications(
        &self,
        event_id: Uuid,
        added: &ChannelPublications,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError>;

    async fn set_reminder_config(
        &self,
        event_id: Uuid,
        config: Option<ReminderConfig>,
    ) -> Result<bool, StoreError>;

    async fn set_scheduled_publication(
        &self,
        event_id: Uuid,
        scheduled_publication: Option<OffsetDateTime>,
    ) -> Result<bool, StoreError>;

    async fn set_event_images(
        &self,
        event_id: Uuid,
        header_image_url: Option<String>,
        image_urls: Vec<String>,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError>;

    async fn delete_event(&self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn create_cycle(&self, cycle: &CycleRecord) -> Result<(), StoreError>;

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError>;

    async fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError>;

    async fn delete_cycle(&self, cycle_id: Uuid) -> Result<bool, StoreError>;

    /// Members of the given participant groups, deduplicated by person.
    async fn participants(&self, groups: &[CompactString])
    -> Result<Vec<Participant>, StoreError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn upsert_schedule(
        &self,
        event_id: Uuid,
        scheduled_time: OffsetDateTime,
    ) -> Result<ScheduledPublicationEntry, StoreError>;

    async fn get_schedule(
        &self,
        event_id: Uuid,
    ) -> Result<Option<ScheduledPublicationEntry>, StoreError>;

    /// Remove a pending row. Returns `false` if there was none.
    async fn delete_schedule(&self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn due_schedules(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ScheduledPublicationEntry>, StoreError>;

    /// Mark a pending row as sent. Also used to supersede a schedule when the
    /// event got published another way. Returns `false` if nothing was pending.
    async fn mark_schedule_sent(&self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn next_pending_schedule(&self) -> Result<Option<OffsetDateTime>, StoreError>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Drop pending and skipped jobs of the event and insert `jobs`.
    async fn replace_pending_jobs(
        &self,
        event_id: Uuid,
        jobs: Vec<NewReminderJob>,
        now: OffsetDateTime,
    ) -> Result<Vec<ReminderJob>, StoreError>;

    async fn due_jobs(&self, now: OffsetDateTime) -> Result<Vec<ReminderJob>, StoreError>;

    async fn mark_job(&self, job_id: Uuid, status: ReminderJobStatus) -> Result<bool, StoreError>;

    async fn cancel_pending_jobs(&self, event_id: Uuid) -> Result<u64, StoreError>;

    async fn has_reminder_history(&self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn jobs_for_event(&self, event_id: Uuid) -> Result<Vec<ReminderJob>, StoreError>;
}

/// Everything the engine persists.
pub trait Store: EventStore + ScheduleStore + ReminderStore {}

impl<T: EventStore + ScheduleStore + ReminderStore> Store for T {}
