use super::{EventStore, ReminderStore, ScheduleStore, StoreError};
use crate::entities::ReminderJobStatus;
use crate::entities::cycle_records::CycleRecord;
use crate::entities::event_records::{ChannelPublications, EventChanges, EventRecord};
use crate::entities::participants::Participant;
use crate::entities::reminder_jobs::{NewReminderJob, ReminderJob};
use crate::entities::scheduled_publications::ScheduledPublicationEntry;
use async_trait::async_trait;
use compact_str::CompactString;
use herald_sdk::objects::ReminderConfig;
use itertools::Itertools;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    events: BTreeMap<Uuid, EventRecord>,
    cycles: BTreeMap<Uuid, CycleRecord>,
    schedules: BTreeMap<Uuid, ScheduledPublicationEntry>,
    jobs: Vec<ReminderJob>,
    participants: Vec<(CompactString, Participant)>,
}

/// Process-local store. Used by tests and `--in-memory` server runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to a participant group, replacing an earlier entry for
    /// the same person in that group.
    pub async fn add_participant(&self, group: impl Into<CompactString>, participant: Participant) {
        let group = group.into();
        let mut state = self.state.lock().await;
        state
            .participants
            .retain(|(g, p)| !(g == &group && p.person_id == participant.person_id));
        state.participants.push((group, participant));
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.events.insert(record.event_id, record.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.state.lock().await.events.get(&event_id).cloned())
    }

    async fn list_events(&self, cycle_id: Option<Uuid>) -> Result<Vec<EventRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|record| cycle_id.is_none() || record.cycle_id == cycle_id)
            .sorted_by_key(|record| (record.starts_at, record.event_id))
            .cloned()
            .collect())
    }

    async fn update_event_fields(
        &self,
        event_id: Uuid,
        changes: &EventChanges,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.events.get_mut(&event_id).map(|record| {
            changes.apply_to(record);
            record.updated_at = now;
            record.clone()
        }))
    }

    async fn merge_channel_publications(
        &self,
        event_id: Uuid,
        added: &ChannelPublications,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.events.get_mut(&event_id).map(|record| {
            record.channel_publications.merge_missing(added);
            record.scheduled_publication = None;
            record.updated_at = now;
            record.clone()
        }))
    }

    async fn set_reminder_config(
        &self,
        event_id: Uuid,
        config: Option<ReminderConfig>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .events
            .get_mut(&event_id)
            .map(|record| record.reminder_config = config)
            .is_some())
    }

    async fn set_scheduled_publication(
        &self,
        event_id: Uuid,
        scheduled_publication: Option<OffsetDateTime>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .events
            .get_mut(&event_id)
            .map(|record| record.scheduled_publication = scheduled_publication)
            .is_some())
    }

    async fn set_event_images(
        &self,
        event_id: Uuid,
        header_image_url: Option<String>,
        image_urls: Vec<String>,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.events.get_mut(&event_id).map(|record| {
            record.header_image_url = header_image_url;
            record.image_urls = image_urls;
            record.updated_at = now;
            record.clone()
        }))
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let existed = state.events.remove(&event_id).is_some();
        // Mirror the ON DELETE CASCADE of the SQL schema.
        state.schedules.remove(&event_id);
        state.jobs.retain(|job| job.event_id != event_id);
        Ok(existed)
    }

    async fn create_cycle(&self, cycle: &CycleRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.cycles.insert(cycle.cycle_id, cycle.clone());
        Ok(())
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<CycleRecord>, StoreError> {
        Ok(self.state.lock().await.cycles.get(&cycle_id).cloned())
    }

    async fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .cycles
            .values()
            .sorted_by_key(|cycle| std::cmp::Reverse(cycle.starts_at))
            .cloned()
            .collect())
    }

    async fn delete_cycle(&self, cycle_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let existed = state.cycles.remove(&cycle_id).is_some();
        for record in state.events.values_mut() {
            if record.cycle_id == Some(cycle_id) {
                record.cycle_id = None;
            }
        }
        Ok(existed)
    }

    async fn participants(
        &self,
        groups: &[CompactString],
    ) -> Result<Vec<Participant>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|(group, _)| groups.contains(group))
            .map(|(_, participant)| participant.clone())
            .unique_by(|participant| participant.person_id.clone())
            .sorted_by(|a, b| a.person_id.cmp(&b.person_id))
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert_schedule(
        &self,
        event_id: Uuid,
        scheduled_time: OffsetDateTime,
    ) -> Result<ScheduledPublicationEntry, StoreError> {
        let entry = ScheduledPublicationEntry {
            event_id,
            scheduled_time,
            sent: false,
        };
        let mut state = self.state.lock().await;
        state.schedules.insert(event_id, entry.clone());
        Ok(entry)
    }

    async fn get_schedule(
        &self,
        event_id: Uuid,
    ) -> Result<Option<ScheduledPublicationEntry>, StoreError> {
        Ok(self.state.lock().await.schedules.get(&event_id).cloned())
    }

    async fn delete_schedule(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.schedules.get(&event_id) {
            Some(entry) if !entry.sent => {
                state.schedules.remove(&event_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_schedules(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ScheduledPublicationEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .schedules
            .values()
            .filter(|entry| !entry.sent && entry.scheduled_time <= now)
            .sorted_by_key(|entry| entry.scheduled_time)
            .cloned()
            .collect())
    }

    async fn mark_schedule_sent(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.schedules.get_mut(&event_id) {
            Some(entry) if !entry.sent => {
                entry.sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn next_pending_schedule(&self) -> Result<Option<OffsetDateTime>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .schedules
            .values()
            .filter(|entry| !entry.sent)
            .map(|entry| entry.scheduled_time)
            .min())
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn replace_pending_jobs(
        &self,
        event_id: Uuid,
        jobs: Vec<NewReminderJob>,
        now: OffsetDateTime,
    ) -> Result<Vec<ReminderJob>, StoreError> {
        let mut state = self.state.lock().await;
        state
            .jobs
            .retain(|job| job.event_id != event_id || job.status == ReminderJobStatus::Fired);
        let jobs: Vec<ReminderJob> = jobs
            .into_iter()
            .map(|job| job.into_job(event_id, now))
            .collect();
        state.jobs.extend(jobs.iter().cloned());
        Ok(jobs)
    }

    async fn due_jobs(&self, now: OffsetDateTime) -> Result<Vec<ReminderJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.status == ReminderJobStatus::Pending && job.fire_at <= now)
            .sorted_by_key(|job| job.fire_at)
            .cloned()
            .collect())
    }

    async fn mark_job(&self, job_id: Uuid, status: ReminderJobStatus) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state
            .jobs
            .iter_mut()
            .find(|job| job.job_id == job_id && job.status == ReminderJobStatus::Pending)
        {
            Some(job) => {
                job.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel_pending_jobs(&self, event_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|job| job.event_id != event_id || job.status != ReminderJobStatus::Pending);
        Ok((before - state.jobs.len()) as u64)
    }

    async fn has_reminder_history(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().any(|job| job.event_id == event_id))
    }

    async fn jobs_for_event(&self, event_id: Uuid) -> Result<Vec<ReminderJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job.event_id == event_id)
            .sorted_by_key(|job| job.fire_at)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn mark_sent_only_flips_pending_rows_once() {
        let store = MemoryStore::new();
        let event_id = Uuid::now_v7();
        let due = datetime!(2026-04-01 18:00 UTC);
        store.upsert_schedule(event_id, due).await.unwrap();

        assert_eq!(store.next_pending_schedule().await.unwrap(), Some(due));
        assert!(store.mark_schedule_sent(event_id).await.unwrap());
        assert!(!store.mark_schedule_sent(event_id).await.unwrap());
        assert!(store.due_schedules(due).await.unwrap().is_empty());
        assert_eq!(store.next_pending_schedule().await.unwrap(), None);
        // Sent rows are not cancellable.
        assert!(!store.delete_schedule(event_id).await.unwrap());
    }

    #[tokio::test]
    async fn participants_are_deduplicated_across_groups() {
        let store = MemoryStore::new();
        let alice = Participant {
            person_id: "1".to_string(),
            display_name: "Alice".to_string(),
        };
        store.add_participant("core", alice.clone()).await;
        store.add_participant("subs", alice.clone()).await;
        store
            .add_participant(
                "other",
                Participant {
                    person_id: "2".to_string(),
                    display_name: "Bob".to_string(),
                },
            )
            .await;

        let members = store
            .participants(&[CompactString::from("core"), CompactString::from("subs")])
            .await
            .unwrap();
        assert_eq!(members, [alice]);
    }
}
