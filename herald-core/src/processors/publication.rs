//! PublicationOrchestrator processor.
//!
//! The PublicationOrchestrator is responsible for:
//! - Creating event records, with best-effort image upload
//! - Publishing an event to several channels concurrently and persisting the
//!   channel to message map
//! - Pushing edits to every channel an event was published to
//! - Deleting an event together with its channel messages, reminders and
//!   pending schedule
//!
//! Channels fail independently. A failing channel is reported next to the
//! others' successes and never rolls back what did succeed; record CRUD
//! always completes even when every channel effect fails.

use crate::channels::{ChannelAdapter, ChannelDirectory, ChannelError, ChannelFailure};
use crate::config::EngineConfig;
use crate::entities::event_records::{
    ChannelPublications, EventChanges, EventDraft, EventRecord, PublishedMessage,
    ValidationError,
};
use crate::events::{StateChange, StateChangeSender};
use crate::processors::attendance::AttendanceReconciler;
use crate::processors::reminders::ReminderScheduler;
use crate::store::{ImageError, ImageStore, Store, StoreError};
use crate::utils::timebox::timebox;
use futures_util::future::join_all;
use herald_sdk::objects::{ChannelId, ImageBatch, ImageMode, ReminderConfig};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a publish call.
#[derive(Debug)]
pub struct PublicationResult {
    /// The event has at least one publication after the call.
    pub success: bool,
    pub publications: ChannelPublications,
    /// Channels a message was created on by this call.
    pub published: Vec<ChannelId>,
    pub errors: Vec<ChannelFailure>,
    pub reminder_error: Option<String>,
    pub record: EventRecord,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Publish right away if the event has not been published yet.
    pub publish_now: bool,
    pub channels: Option<Vec<ChannelId>>,
    pub reminder_config: Option<ReminderConfig>,
    pub images: Option<ImageBatch>,
}

#[derive(Debug)]
pub struct UpdateResult {
    pub record: EventRecord,
    /// Channels whose message now shows the edit.
    pub updated_channels: Vec<ChannelId>,
    pub errors: Vec<ChannelFailure>,
    /// Set when the update fell through to a first publish.
    pub publication: Option<PublicationResult>,
    pub image_error: Option<String>,
    pub reminder_error: Option<String>,
}

#[derive(Debug)]
pub struct DeleteResult {
    pub deleted_channels: Vec<ChannelId>,
    pub errors: Vec<ChannelFailure>,
    pub reminder_error: Option<String>,
}

#[derive(Debug)]
pub struct CreatedRecord {
    pub record: EventRecord,
    pub image_error: Option<String>,
}

fn check_image_count(
    existing: usize,
    batch: &ImageBatch,
    max: usize,
) -> Result<(), ValidationError> {
    let count = match batch.mode {
        ImageMode::Merge => existing + batch.additional.len(),
        ImageMode::Replace => batch.additional.len(),
    };
    if count > max {
        return Err(ValidationError::TooManyImages { count, max });
    }
    Ok(())
}

pub struct PublicationOrchestrator {
    store: Arc<dyn Store>,
    channels: ChannelDirectory,
    images: Arc<dyn ImageStore>,
    reminders: Arc<ReminderScheduler>,
    reconciler: Arc<AttendanceReconciler>,
    changes: StateChangeSender,
    config: EngineConfig,
}

impl PublicationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        channels: ChannelDirectory,
        images: Arc<dyn ImageStore>,
        reminders: Arc<ReminderScheduler>,
        reconciler: Arc<AttendanceReconciler>,
        changes: StateChangeSender,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            channels,
            images,
            reminders,
            reconciler,
            changes,
            config,
        }
    }

    /// Publications of an event, including fallback cache hits.
    pub async fn publications(&self, record: &EventRecord) -> ChannelPublications {
        self.channels.publications_of(record).await
    }

    /// Validate and create the record, then attach images.
    ///
    /// Image upload is best effort: a failure is reported in the result and
    /// the record stays.
    pub async fn create_record(
        &self,
        draft: EventDraft,
        images: Option<&ImageBatch>,
    ) -> Result<CreatedRecord, PublishError> {
        draft.validate()?;
        if let Some(batch) = images {
            check_image_count(0, batch, self.config.max_additional_images)?;
        }
        let inherited = match draft.cycle_id {
            Some(cycle_id) => {
                self.store
                    .get_cycle(cycle_id)
                    .await?
                    .ok_or(ValidationError::CycleNotFound(cycle_id))?
                    .default_participant_groups
            }
            None => Vec::new(),
        };

        let now = OffsetDateTime::now_utc();
        let mut record = draft.into_record(Uuid::now_v7(), inherited, now);
        timebox(
            self.config.record_create_timeout,
            self.store.create_event(&record),
            StoreError::Timeout,
        )
        .await?;
        info!(event_id = %record.event_id, title = %record.title, "Event created");

        let mut image_error = None;
        if let Some(batch) = images.filter(|batch| !batch.is_empty()) {
            match self.attach_images(&record, batch, now).await {
                Ok(Some(updated)) => record = updated,
                Ok(None) => {}
                Err(e) => image_error = Some(e),
            }
        }

        let _ = self.changes.send(StateChange::Updated {
            event_id: record.event_id,
        });
        Ok(CreatedRecord {
            record,
            image_error,
        })
    }

    /// Publish an event to `channels` (all configured channels for `None`).
    ///
    /// Channels that already carry the event are skipped. On at least one
    /// new message the merged map is written back, a pending schedule is
    /// superseded and reminders are scheduled when a configuration is
    /// supplied or stored.
    pub async fn publish(
        &self,
        event_id: Uuid,
        channels: Option<&[ChannelId]>,
        reminder_config: Option<ReminderConfig>,
    ) -> Result<PublicationResult, PublishError> {
        if let Some(config) = &reminder_config {
            config.validate().map_err(ValidationError::from)?;
        }
        let record = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;
        let existing = self.channels.publications_of(&record).await;
        let registry = self.channels.registry().await;
        let selection = registry.select(channels);

        let mut errors: Vec<ChannelFailure> = selection
            .unknown
            .into_iter()
            .map(|channel_id| {
                let error = ChannelError::UnknownChannel(channel_id.clone());
                ChannelFailure::new(channel_id, error)
            })
            .collect();
        let targets: Vec<Arc<dyn ChannelAdapter>> = selection
            .adapters
            .into_iter()
            .filter(|adapter| {
                let already = existing.contains(adapter.id());
                if already {
                    debug!(event_id = %event_id, channel = %adapter.id(), "Already published, skipping");
                }
                !already
            })
            .collect();

        let message = record.to_message();
        let attempts = targets.iter().map(|adapter| {
            let message = &message;
            async move {
                let result = timebox(
                    self.config.channel_call_timeout,
                    adapter.create_message(message),
                    ChannelError::Timeout,
                )
                .await;
                (adapter.id().clone(), result)
            }
        });
        let outcomes = join_all(attempts).await;

        let now = OffsetDateTime::now_utc();
        let mut added = ChannelPublications::new();
        for (channel_id, result) in outcomes {
            match result {
                Ok(message_id) => {
                    info!(event_id = %event_id, channel = %channel_id, message_id = %message_id, "Published");
                    added.insert(
                        channel_id,
                        PublishedMessage {
                            message_id,
                            published_at: now,
                        },
                    );
                }
                Err(error) => {
                    warn!(event_id = %event_id, channel = %channel_id, error = %error, "Publish failed");
                    errors.push(ChannelFailure::new(channel_id, error));
                }
            }
        }

        // Cache hits become authoritative with the next write.
        let migrate_cache = record.channel_publications.is_empty() && !existing.is_empty();
        if added.is_empty() && !migrate_cache {
            return Ok(PublicationResult {
                success: !existing.is_empty(),
                publications: existing,
                published: Vec::new(),
                errors,
                reminder_error: None,
                record,
            });
        }

        let mut combined = existing;
        combined.merge_missing(&added);
        let mut updated = self
            .store
            .merge_channel_publications(event_id, &combined, now)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;

        for (channel_id, message) in added.iter() {
            let stored = updated.channel_publications.get(channel_id);
            if stored.is_some_and(|stored| stored.message_id != message.message_id) {
                warn!(
                    event_id = %event_id,
                    channel = %channel_id,
                    orphaned_message_id = %message.message_id,
                    "Channel was published concurrently, keeping the first message"
                );
            }
        }

        let published: Vec<ChannelId> = added.channel_ids().cloned().collect();
        if published.is_empty() {
            return Ok(PublicationResult {
                success: true,
                publications: updated.channel_publications.clone(),
                published,
                errors,
                reminder_error: None,
                record: updated,
            });
        }

        if self.store.mark_schedule_sent(event_id).await? {
            debug!(event_id = %event_id, "Superseded pending scheduled publication");
        }
        if updated.scheduled_publication.is_some() {
            self.store.set_scheduled_publication(event_id, None).await?;
            updated.scheduled_publication = None;
        }

        let mut reminder_error = None;
        if let Some(config) = reminder_config.or(updated.reminder_config) {
            match self.reminders.schedule(&updated, config, now).await {
                Ok(_) => updated.reminder_config = Some(config),
                Err(e) => {
                    warn!(event_id = %event_id, error = %e, "Failed to schedule reminders");
                    reminder_error = Some(e.to_string());
                }
            }
        }

        let _ = self.changes.send(StateChange::Published {
            event_id,
            channels: published.clone(),
        });

        Ok(PublicationResult {
            success: true,
            publications: updated.channel_publications.clone(),
            published,
            errors,
            reminder_error,
            record: updated,
        })
    }

    /// Write field edits, then bring channels and reminders in line.
    pub async fn update(
        &self,
        event_id: Uuid,
        changes: EventChanges,
        options: UpdateOptions,
    ) -> Result<UpdateResult, PublishError> {
        let current = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;
        changes.validate_against(&current)?;
        if let Some(config) = &options.reminder_config {
            config.validate().map_err(ValidationError::from)?;
        }
        if let Some(batch) = &options.images {
            check_image_count(
                current.image_urls.len(),
                batch,
                self.config.max_additional_images,
            )?;
        }

        let now = OffsetDateTime::now_utc();
        let written = self
            .store
            .update_event_fields(event_id, &changes, now)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;

        let mut image_error = None;
        if let Some(batch) = options.images.as_ref().filter(|batch| !batch.is_empty()) {
            if let Err(e) = self.attach_images(&written, batch, now).await {
                image_error = Some(e);
            }
        }

        let mut record = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;
        let publications = self.channels.publications_of(&record).await;

        let mut updated_channels = Vec::new();
        let mut errors = Vec::new();
        let mut publication = None;

        if publications.is_empty() {
            if options.publish_now {
                let result = self
                    .publish(event_id, options.channels.as_deref(), options.reminder_config)
                    .await?;
                record = result.record.clone();
                publication = Some(result);
            }
        } else {
            (updated_channels, errors) = self.push_update(&record, &publications).await;
            if record.channel_publications.is_empty() {
                if let Some(migrated) = self
                    .store
                    .merge_channel_publications(event_id, &publications, now)
                    .await?
                {
                    record = migrated;
                }
            }
        }

        let mut reminder_error = None;
        match self
            .reminders
            .reschedule(&record, options.reminder_config, now)
            .await
        {
            Ok(jobs) => debug!(event_id = %event_id, jobs = jobs.len(), "Reminders recomputed"),
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to reschedule reminders");
                reminder_error = Some(e.to_string());
            }
        }

        let record = self.store.get_event(event_id).await?.unwrap_or(record);
        let _ = self.changes.send(StateChange::Updated { event_id });

        Ok(UpdateResult {
            record,
            updated_channels,
            errors,
            publication,
            image_error,
            reminder_error,
        })
    }

    /// Delete an event everywhere.
    ///
    /// Reminders, the pending schedule and attendance tracking go first.
    /// Every channel message is then attempted, and the record is deleted
    /// no matter how many of those attempts failed.
    pub async fn delete(&self, event_id: Uuid) -> Result<DeleteResult, PublishError> {
        let record = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;

        let reminder_error = match self.reminders.cancel(event_id).await {
            Ok(_) => None,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to cancel reminders");
                Some(e.to_string())
            }
        };
        if self.store.delete_schedule(event_id).await? {
            debug!(event_id = %event_id, "Cancelled pending scheduled publication");
        }
        self.reconciler.forget(event_id).await;

        let publications = self.channels.publications_of(&record).await;
        let registry = self.channels.registry().await;
        let attempts = publications.iter().map(|(channel_id, message)| {
            let adapter = registry.get(channel_id);
            async move {
                let result = match adapter {
                    Some(adapter) => {
                        timebox(
                            self.config.channel_call_timeout,
                            adapter.delete_message(&message.message_id),
                            ChannelError::Timeout,
                        )
                        .await
                    }
                    None => Err(ChannelError::UnknownChannel(channel_id.clone())),
                };
                (channel_id.clone(), result)
            }
        });

        let mut deleted_channels = Vec::new();
        let mut errors = Vec::new();
        for (channel_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => deleted_channels.push(channel_id),
                Err(error) => {
                    warn!(event_id = %event_id, channel = %channel_id, error = %error, "Failed to delete channel message");
                    errors.push(ChannelFailure::new(channel_id, error));
                }
            }
        }

        self.store.delete_event(event_id).await?;
        if let Err(e) = self.channels.evict(event_id).await {
            warn!(event_id = %event_id, error = %e, "Failed to evict fallback cache entries");
        }
        info!(
            event_id = %event_id,
            deleted = deleted_channels.len(),
            failed = errors.len(),
            "Event deleted"
        );
        let _ = self.changes.send(StateChange::Deleted { event_id });

        Ok(DeleteResult {
            deleted_channels,
            errors,
            reminder_error,
        })
    }

    async fn push_update(
        &self,
        record: &EventRecord,
        publications: &ChannelPublications,
    ) -> (Vec<ChannelId>, Vec<ChannelFailure>) {
        let registry = self.channels.registry().await;
        let message = record.to_message();
        let attempts = publications.iter().map(|(channel_id, published)| {
            let adapter = registry.get(channel_id);
            let message = &message;
            async move {
                let result = match adapter {
                    Some(adapter) => {
                        timebox(
                            self.config.channel_call_timeout,
                            adapter.update_message(&published.message_id, message),
                            ChannelError::Timeout,
                        )
                        .await
                    }
                    None => Err(ChannelError::UnknownChannel(channel_id.clone())),
                };
                (channel_id.clone(), result)
            }
        });

        let mut updated = Vec::new();
        let mut errors = Vec::new();
        for (channel_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => updated.push(channel_id),
                Err(error) => {
                    warn!(event_id = %record.event_id, channel = %channel_id, error = %error, "Failed to update channel message");
                    errors.push(ChannelFailure::new(channel_id, error));
                }
            }
        }
        (updated, errors)
    }

    /// Upload a batch and store the resulting URLs on the event.
    async fn attach_images(
        &self,
        record: &EventRecord,
        batch: &ImageBatch,
        now: OffsetDateTime,
    ) -> Result<Option<EventRecord>, String> {
        let stored = timebox(
            self.config.image_upload_timeout,
            self.images.upload(record.event_id, batch),
            ImageError::Timeout,
        )
        .await
        .map_err(|e| {
            warn!(event_id = %record.event_id, error = %e, "Image upload failed");
            e.to_string()
        })?;

        let (header_image_url, image_urls) = match batch.mode {
            ImageMode::Replace => (stored.header_url, stored.image_urls),
            ImageMode::Merge => (
                stored.header_url.or_else(|| record.header_image_url.clone()),
                record
                    .image_urls
                    .iter()
                    .cloned()
                    .chain(stored.image_urls)
                    .collect(),
            ),
        };
        self.store
            .set_event_images(record.event_id, header_image_url, image_urls, now)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MessageIdCache;
    use crate::store::{EventStore, ReminderStore, ScheduleStore};
    use crate::testing::{Harness, STARTS_AT, draft, draft_with_reminders};
    use crate::entities::ReminderJobStatus;
    use bytes::Bytes;
    use herald_sdk::objects::{ImageUpload, OffsetUnit, ReminderSpec};
    use std::sync::atomic::Ordering;

    fn upload() -> ImageUpload {
        ImageUpload {
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"png"),
        }
    }

    #[test]
    fn image_limit_counts_existing_images_on_merge() {
        let batch = ImageBatch {
            header: Some(upload()),
            additional: vec![upload(), upload()],
            mode: ImageMode::Merge,
        };
        assert_eq!(check_image_count(8, &batch, 10), Ok(()));
        assert_eq!(
            check_image_count(9, &batch, 10),
            Err(ValidationError::TooManyImages { count: 11, max: 10 })
        );

        let replace = ImageBatch {
            mode: ImageMode::Replace,
            ..batch
        };
        assert_eq!(check_image_count(9, &replace, 10), Ok(()));
    }

    async fn published_event(h: &Harness, title: &str) -> EventRecord {
        let created = h
            .engine
            .orchestrator()
            .create_record(draft(title), None)
            .await
            .unwrap();
        h.engine
            .orchestrator()
            .publish(created.record.event_id, None, None)
            .await
            .unwrap()
            .record
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_fail_the_others() {
        let h = Harness::new(&["chat", "forum", "mail"]);
        h.channel("mail").fail_create.store(true, Ordering::SeqCst);
        let orchestrator = h.engine.orchestrator();

        let created = orchestrator.create_record(draft("Raid"), None).await.unwrap();
        let event_id = created.record.event_id;
        let result = orchestrator.publish(event_id, None, None).await.unwrap();

        assert!(result.success);
        assert_eq!(result.publications.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].channel_id, ChannelId::from("mail"));
        let stored = h.store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.channel_publications.len(), 2);

        // A retry only targets the channel that is still missing.
        h.channel("mail").fail_create.store(false, Ordering::SeqCst);
        let retry = orchestrator.publish(event_id, None, None).await.unwrap();
        assert_eq!(retry.published, vec![ChannelId::from("mail")]);
        assert_eq!(retry.publications.len(), 3);
        assert_eq!(h.channel("chat").created().len(), 1);
        assert_eq!(h.channel("forum").created().len(), 1);
    }

    #[tokio::test]
    async fn unknown_channels_are_reported_not_published() {
        let h = Harness::new(&["chat"]);
        let orchestrator = h.engine.orchestrator();
        let created = orchestrator.create_record(draft("Raid"), None).await.unwrap();

        let result = orchestrator
            .publish(
                created.record.event_id,
                Some(&[ChannelId::from("pigeon")]),
                None,
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.publications.is_empty());
        assert!(matches!(
            result.errors[0].error,
            ChannelError::UnknownChannel(_)
        ));
        assert!(h.channel("chat").created().is_empty());
    }

    #[tokio::test]
    async fn publishing_supersedes_a_pending_schedule() {
        let h = Harness::new(&["chat"]);
        let created = h
            .engine
            .orchestrator()
            .create_record(draft("Raid"), None)
            .await
            .unwrap();
        let event_id = created.record.event_id;
        h.engine
            .queue()
            .schedule(event_id, STARTS_AT - time::Duration::days(1))
            .await
            .unwrap();

        h.engine
            .orchestrator()
            .publish(event_id, None, None)
            .await
            .unwrap();

        let entry = h.store.get_schedule(event_id).await.unwrap().unwrap();
        assert!(entry.sent);
        assert_eq!(h.store.next_pending_schedule().await.unwrap(), None);
        let stored = h.store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_publication, None);
    }

    #[tokio::test]
    async fn editing_the_start_time_moves_pending_reminders() {
        let h = Harness::new(&["chat"]);
        let orchestrator = h.engine.orchestrator();
        let config = ReminderConfig {
            first: Some(ReminderSpec::minutes_before(60)),
            second: None,
        };
        let created = orchestrator
            .create_record(draft_with_reminders("Raid", config), None)
            .await
            .unwrap();
        let event_id = created.record.event_id;
        orchestrator.publish(event_id, None, None).await.unwrap();

        let jobs = h.store.jobs_for_event(event_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].fire_at, STARTS_AT - time::Duration::minutes(60));

        let changes = EventChanges {
            starts_at: Some(STARTS_AT + time::Duration::minutes(30)),
            ..Default::default()
        };
        let result = orchestrator
            .update(event_id, changes, UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.updated_channels, vec![ChannelId::from("chat")]);
        assert_eq!(h.channel("chat").updated(), vec!["chat-0".to_string()]);
        let jobs = h.store.jobs_for_event(event_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, ReminderJobStatus::Pending);
        assert_eq!(jobs[0].fire_at, STARTS_AT - time::Duration::minutes(30));
    }

    #[tokio::test]
    async fn invalid_edit_changes_nothing() {
        let h = Harness::new(&["chat"]);
        let record = published_event(&h, "Raid").await;

        let changes = EventChanges {
            ends_at: Some(STARTS_AT - time::Duration::hours(1)),
            ..Default::default()
        };
        let err = h
            .engine
            .orchestrator()
            .update(record.event_id, changes, UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Validation(ValidationError::EndsBeforeStart)
        ));
        assert!(h.channel("chat").updated().is_empty());
        let stored = h.store.get_event(record.event_id).await.unwrap().unwrap();
        assert_eq!(stored.ends_at, record.ends_at);
    }

    #[tokio::test]
    async fn update_can_publish_an_unpublished_event() {
        let h = Harness::new(&["chat"]);
        let orchestrator = h.engine.orchestrator();
        let created = orchestrator.create_record(draft("Raid"), None).await.unwrap();

        let options = UpdateOptions {
            publish_now: true,
            ..Default::default()
        };
        let result = orchestrator
            .update(created.record.event_id, EventChanges::default(), options)
            .await
            .unwrap();

        let publication = result.publication.unwrap();
        assert!(publication.success);
        assert!(result.record.is_published());
    }

    #[tokio::test]
    async fn delete_attempts_every_channel_and_removes_the_record() {
        let h = Harness::new(&["chat", "forum"]);
        h.channel("forum").fail_delete.store(true, Ordering::SeqCst);
        let orchestrator = h.engine.orchestrator();
        let config = ReminderConfig {
            first: Some(ReminderSpec::minutes_before(60)),
            second: None,
        };
        let created = orchestrator
            .create_record(draft_with_reminders("Raid", config), None)
            .await
            .unwrap();
        let event_id = created.record.event_id;
        orchestrator.publish(event_id, None, None).await.unwrap();
        assert_eq!(h.store.jobs_for_event(event_id).await.unwrap().len(), 1);

        // Park the chat delete so the store can be inspected mid-way.
        h.channel("chat").delete_gate.close();
        let deleting = {
            let orchestrator = Arc::clone(orchestrator);
            tokio::spawn(async move { orchestrator.delete(event_id).await })
        };
        h.channel("chat").delete_gate.until_waiting(1).await;
        assert!(h.store.get_event(event_id).await.unwrap().is_some());
        assert!(h.store.jobs_for_event(event_id).await.unwrap().is_empty());

        h.channel("chat").delete_gate.open();
        let result = deleting.await.unwrap().unwrap();

        assert_eq!(result.deleted_channels, vec![ChannelId::from("chat")]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].channel_id, ChannelId::from("forum"));
        assert_eq!(h.channel("chat").deleted(), vec!["chat-0".to_string()]);
        assert_eq!(h.channel("forum").deleted(), vec!["forum-0".to_string()]);
        assert!(h.store.get_event(event_id).await.unwrap().is_none());
        assert!(h.store.jobs_for_event(event_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_reminder_offset_is_rejected_before_any_effect() {
        let h = Harness::new(&["chat"]);
        let orchestrator = h.engine.orchestrator();
        let oversized = ReminderConfig {
            first: Some(ReminderSpec {
                value: u32::MAX,
                unit: OffsetUnit::Days,
                ..ReminderSpec::minutes_before(0)
            }),
            second: None,
        };

        let refused = orchestrator
            .create_record(draft_with_reminders("Raid", oversized), None)
            .await;
        assert!(matches!(
            refused,
            Err(PublishError::Validation(ValidationError::InvalidReminderOffset(_)))
        ));
        assert!(h.store.list_events(None).await.unwrap().is_empty());

        let event_id = orchestrator
            .create_record(draft("Raid"), None)
            .await
            .unwrap()
            .record
            .event_id;
        let refused = orchestrator.publish(event_id, None, Some(oversized)).await;
        assert!(matches!(
            refused,
            Err(PublishError::Validation(ValidationError::InvalidReminderOffset(_)))
        ));
        assert!(h.channel("chat").created().is_empty());

        let options = UpdateOptions {
            publish_now: true,
            reminder_config: Some(oversized),
            ..UpdateOptions::default()
        };
        let changes = EventChanges {
            title: Some("Renamed".to_string()),
            ..EventChanges::default()
        };
        let refused = orchestrator.update(event_id, changes, options).await;
        assert!(matches!(
            refused,
            Err(PublishError::Validation(ValidationError::InvalidReminderOffset(_)))
        ));
        let stored = h.store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Raid");
        assert!(!stored.is_published());
    }

    #[tokio::test]
    async fn fallback_cache_entries_count_as_published() {
        let event_id = Uuid::now_v7();
        let cache = MessageIdCache::in_memory([(
            event_id,
            ChannelId::from("forum"),
            "legacy-1".to_string(),
        )]);
        let h = Harness::with_fallback(&["chat", "forum"], cache);
        let record = draft("Raid").into_record(event_id, Vec::new(), OffsetDateTime::now_utc());
        h.store.create_event(&record).await.unwrap();

        let result = h
            .engine
            .orchestrator()
            .publish(event_id, None, None)
            .await
            .unwrap();

        assert_eq!(result.published, vec![ChannelId::from("chat")]);
        assert!(h.channel("forum").created().is_empty());
        let stored = h.store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(
            stored
                .channel_publications
                .get(&ChannelId::from("forum"))
                .map(|message| message.message_id.as_str()),
            Some("legacy-1")
        );
        assert_eq!(stored.channel_publications.len(), 2);
    }
}
