use super::{EventStore, ReminderStore, ScheduleStore, StoreError};
use crate::entities::ReminderJobStatus;
use crate::entities::cycle_records::{CycleRecord, DeleteCycle, GetCycle, InsertCycle, ListCycles};
use crate::entities::event_records::{
    ChannelPublications, DeleteEvent, EventChanges, EventRecord, GetEvent, InsertEvent,
    ListEvents, MergeChannelPublications, SetEventImages, SetEventReminderConfig,
    SetEventScheduledPublication, UpdateEventFields,
};
use crate::entities::participants::{GetParticipantsForGroups, Participant};
use crate::entities::reminder_jobs::{
    CancelPendingReminderJobs, GetDueReminderJobs, HasReminderHistory, ListReminderJobs,
    MarkReminderJob, NewReminderJob, ReminderJob, ReplaceReminderJobs,
};
use crate::entities::scheduled_publications::{
    DeleteScheduledPublication, GetDueScheduledPublications, GetNextPendingScheduleTime,
    GetScheduledPublication, MarkScheduledPublicationSent, ScheduledPublicationEntry,
    UpsertScheduledPublication,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use compact_str::CompactString;
use herald_sdk::objects::ReminderConfig;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
impl EventStore for DatabaseProcessor {
    async fn create_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        self.process(InsertEvent {
            record: record.clone(),
        })
        .await?;
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.process(GetEvent { event_id }).await?)
    }

    async fn list_events(&self, cycle_id: Option<Uuid>) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self.process(ListEvents { cycle_id }).await?)
    }

    async fn update_event_fields(
        &self,
        event_id: Uuid,
        changes: &EventChanges,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        Ok(self
            .process(UpdateEventFields {
                event_id,
                changes: changes.clone(),
                now,
            })
            .await?)
    }

    async fn merge_channel_publications(
        &self,
        event_id: Uuid,
        added: &ChannelPublications,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        Ok(self
            .process(MergeChannelPublications {
                event_id,
                added: added.clone(),
                now,
            })
            .await?)
    }

    async fn set_reminder_config(
        &self,
        event_id: Uuid,
        config: Option<ReminderConfig>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(SetEventReminderConfig { event_id, config })
            .await?)
    }

    async fn set_scheduled_publication(
        &self,
        event_id: Uuid,
        scheduled_publication: Option<OffsetDateTime>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(SetEventScheduledPublication {
                event_id,
                scheduled_publication,
            })
            .await?)
    }

    async fn set_event_images(
        &self,
        event_id: Uuid,
        header_image_url: Option<String>,
        image_urls: Vec<String>,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        Ok(self
            .process(SetEventImages {
                event_id,
                header_image_url,
                image_urls,
                now,
            })
            .await?)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(DeleteEvent { event_id }).await?)
    }

    async fn create_cycle(&self, cycle: &CycleRecord) -> Result<(), StoreError> {
        self.process(InsertCycle {
            cycle: cycle.clone(),
        })
        .await?;
        Ok(())
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        Ok(self.process(GetCycle { cycle_id }).await?)
    }

    async fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError> {
        Ok(self.process(ListCycles).await?)
    }

    async fn delete_cycle(&self, cycle_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(DeleteCycle { cycle_id }).await?)
    }

    async fn participants(
        &self,
        groups: &[CompactString],
    ) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .process(GetParticipantsForGroups {
                groups: groups.to_vec(),
            })
            .await?)
    }
}

#[async_trait]
impl ScheduleStore for DatabaseProcessor {
    async fn upsert_schedule(
        &self,
        event_id: Uuid,
        scheduled_time: OffsetDateTime,
    ) -> Result<ScheduledPublicationEntry, StoreError> {
        Ok(self
            .process(UpsertScheduledPublication {
                event_id,
                scheduled_time,
            })
            .await?)
    }

    async fn get_schedule(
        &self,
        event_id: Uuid,
    ) -> Result<Option<ScheduledPublicationEntry>, StoreError> {
        Ok(self.process(GetScheduledPublication { event_id }).await?)
    }

    async fn delete_schedule(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(DeleteScheduledPublication { event_id }).await?)
    }

    async fn due_schedules(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ScheduledPublicationEntry>, StoreError> {
        Ok(self.process(GetDueScheduledPublications { now }).await?)
    }

    async fn mark_schedule_sent(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(MarkScheduledPublicationSent { event_id }).await?)
    }

    async fn next_pending_schedule(&self) -> Result<Option<OffsetDateTime>, StoreError> {
        Ok(self.process(GetNextPendingScheduleTime).await?)
    }
}

#[async_trait]
impl ReminderStore for DatabaseProcessor {
    async fn replace_pending_jobs(
        &self,
        event_id: Uuid,
        jobs: Vec<NewReminderJob>,
        now: OffsetDateTime,
    ) -> Result<Vec<ReminderJob>, StoreError> {
        Ok(self
            .process(ReplaceReminderJobs {
                event_id,
                jobs,
                now,
            })
            .await?)
    }

    async fn due_jobs(&self, now: OffsetDateTime) -> Result<Vec<ReminderJob>, StoreError> {
        Ok(self.process(GetDueReminderJobs { now }).await?)
    }

    async fn mark_job(&self, job_id: Uuid, status: ReminderJobStatus) -> Result<bool, StoreError> {
        Ok(self.process(MarkReminderJob { job_id, status }).await?)
    }

    async fn cancel_pending_jobs(&self, event_id: Uuid) -> Result<u64, StoreError> {
        Ok(self.process(CancelPendingReminderJobs { event_id }).await?)
    }

    async fn has_reminder_history(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(HasReminderHistory { event_id }).await?)
    }

    async fn jobs_for_event(&self, event_id: Uuid) -> Result<Vec<ReminderJob>, StoreError> {
        Ok(self.process(ListReminderJobs { event_id }).await?)
    }
}
