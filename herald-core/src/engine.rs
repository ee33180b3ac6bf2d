//! The `Engine` wires processors together and owns their background loops.
//!
//! ```text
//! Engine::builder(store, channels)
//!     .with_config(..).with_notifier(..)
//!     .build()
//!     .start(shutdown_rx, rsvp_rx)  ->  EngineHandles
//! ```
//!
//! Three loops are spawned: the scheduled publication queue, the reminder
//! checker and the push consumer of the attendance reconciler. The refresh
//! loop of the reconciler is spawned per selection. All of them stop when
//! the shutdown watch flips to `true`.

use crate::channels::{
    ChannelDirectory, ChannelRegistry, MessageIdCache, ReminderNotifier, TracingReminderNotifier,
};
use crate::config::{ConfigStore, EngineConfig};
use crate::entities::event_records::{EventDraft, EventRecord};
use crate::events::{
    RsvpUpdateReceiver, StateChangeReceiver, StateChangeSender, state_change_channel,
};
use crate::processors::{
    AttendanceReconciler, DeleteResult, PublicationOrchestrator, PublicationResult,
    PublishError, ReminderScheduler, ScheduledPublicationQueue,
};
use crate::store::{ImageStore, NoopImageStore, Store};
use herald_sdk::objects::{ChannelId, ImageBatch, PublishIntent};
use itertools::Itertools;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// What `create_event` did beyond creating the record.
#[derive(Debug)]
pub struct CreateOutcome {
    pub record: EventRecord,
    /// "created", "created and published", "created and scheduled" or a
    /// qualified variant naming what failed.
    pub message: String,
    pub publication: Option<PublicationResult>,
    pub image_error: Option<String>,
    pub publish_error: Option<String>,
}

pub struct EngineBuilder {
    store: Arc<dyn Store>,
    channels: ConfigStore<ChannelRegistry>,
    fallback: Option<Arc<MessageIdCache>>,
    images: Option<Arc<dyn ImageStore>>,
    notifier: Option<Arc<dyn ReminderNotifier>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fallback_cache(mut self, cache: Arc<MessageIdCache>) -> Self {
        self.fallback = Some(cache);
        self
    }

    pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReminderNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let (changes, _) = state_change_channel();

        let mut directory = ChannelDirectory::new(self.channels);
        if let Some(cache) = self.fallback {
            directory = directory.with_fallback(cache);
        }

        let reconciler = Arc::new(AttendanceReconciler::new(
            self.store.clone(),
            directory.clone(),
            config.channel_call_timeout,
            config.attendance_refresh_interval,
            changes.clone(),
        ));
        let reminders = Arc::new(ReminderScheduler::new(
            self.store.clone(),
            reconciler.clone(),
            self.notifier
                .unwrap_or_else(|| Arc::new(TracingReminderNotifier)),
            changes.clone(),
            config.reminder_delivery_timeout,
            config.reminder_check_interval,
        ));
        let orchestrator = Arc::new(PublicationOrchestrator::new(
            self.store.clone(),
            directory.clone(),
            self.images.unwrap_or_else(|| Arc::new(NoopImageStore)),
            reminders.clone(),
            reconciler.clone(),
            changes.clone(),
            config,
        ));
        let queue = Arc::new(ScheduledPublicationQueue::new(
            self.store.clone(),
            orchestrator.clone(),
            config.queue,
            changes.clone(),
        ));

        Engine {
            store: self.store,
            directory,
            orchestrator,
            queue,
            reminders,
            reconciler,
            changes,
            config,
        }
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    directory: ChannelDirectory,
    orchestrator: Arc<PublicationOrchestrator>,
    queue: Arc<ScheduledPublicationQueue>,
    reminders: Arc<ReminderScheduler>,
    reconciler: Arc<AttendanceReconciler>,
    changes: StateChangeSender,
    config: EngineConfig,
}

/// Join handles of the loops spawned by [`Engine::start`].
pub struct EngineHandles {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl EngineHandles {
    /// Wait for every loop to finish. Call after signaling shutdown.
    pub async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Engine task failed");
            }
        }
    }
}

impl Engine {
    pub fn builder(store: Arc<dyn Store>, channels: ConfigStore<ChannelRegistry>) -> EngineBuilder {
        EngineBuilder {
            store,
            channels,
            fallback: None,
            images: None,
            notifier: None,
            config: EngineConfig::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn orchestrator(&self) -> &Arc<PublicationOrchestrator> {
        &self.orchestrator
    }

    pub fn queue(&self) -> &Arc<ScheduledPublicationQueue> {
        &self.queue
    }

    pub fn reminders(&self) -> &Arc<ReminderScheduler> {
        &self.reminders
    }

    pub fn reconciler(&self) -> &Arc<AttendanceReconciler> {
        &self.reconciler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> StateChangeReceiver {
        self.changes.subscribe()
    }

    /// Spawn the background loops.
    pub fn start(
        &self,
        shutdown_rx: watch::Receiver<bool>,
        rsvp_rx: RsvpUpdateReceiver,
    ) -> EngineHandles {
        let handles = vec![
            (
                "scheduled_publication_queue",
                tokio::spawn(self.queue.clone().run(shutdown_rx.clone())),
            ),
            (
                "reminder_scheduler",
                tokio::spawn(self.reminders.clone().run(shutdown_rx.clone())),
            ),
            (
                "attendance_reconciler",
                tokio::spawn(self.reconciler.clone().run_push_consumer(shutdown_rx, rsvp_rx)),
            ),
        ];
        info!(tasks = handles.len(), "Engine started");
        EngineHandles { handles }
    }

    /// Create an event, then publish or schedule it per `intent`.
    ///
    /// Fails only when the record could not be created. Anything that goes
    /// wrong afterwards is reported in the outcome.
    pub async fn create_event(
        &self,
        draft: EventDraft,
        images: Option<ImageBatch>,
        intent: PublishIntent,
        channels: Option<Vec<ChannelId>>,
    ) -> Result<CreateOutcome, PublishError> {
        let reminder_config = draft.reminder_config;
        let created = self
            .orchestrator
            .create_record(draft, images.as_ref())
            .await?;
        let mut outcome = CreateOutcome {
            record: created.record,
            message: "created".to_string(),
            publication: None,
            image_error: created.image_error,
            publish_error: None,
        };
        let event_id = outcome.record.event_id;

        match intent {
            PublishIntent::Draft => {}
            PublishIntent::Now => {
                match self
                    .orchestrator
                    .publish(event_id, channels.as_deref(), reminder_config)
                    .await
                {
                    Ok(result) if result.success => {
                        outcome.message = "created and published".to_string();
                        outcome.record = result.record.clone();
                        outcome.publication = Some(result);
                    }
                    Ok(result) => {
                        let reason = if result.errors.is_empty() {
                            "no channels configured".to_string()
                        } else {
                            result
                                .errors
                                .iter()
                                .map(|failure| format!("{}: {}", failure.channel_id, failure.error))
                                .join("; ")
                        };
                        outcome.message = format!("created but failed to publish: {reason}");
                        outcome.publish_error = Some(reason);
                        outcome.publication = Some(result);
                    }
                    Err(e) => {
                        outcome.message = format!("created but failed to publish: {e}");
                        outcome.publish_error = Some(e.to_string());
                    }
                }
            }
            PublishIntent::At { due } => match self.queue.schedule(event_id, due).await {
                Ok(entry) => {
                    outcome.message = "created and scheduled".to_string();
                    outcome.record.scheduled_publication = Some(entry.scheduled_time);
                }
                Err(e) => {
                    outcome.message = format!("created but failed to schedule: {e}");
                    outcome.publish_error = Some(e.to_string());
                }
            },
        }

        if let Some(image_error) = &outcome.image_error {
            outcome.message = format!("{}; image upload failed: {image_error}", outcome.message);
        }
        Ok(outcome)
    }

    pub async fn delete_event(&self, event_id: Uuid) -> Result<DeleteResult, PublishError> {
        self.orchestrator.delete(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStore;
    use crate::testing::{Harness, STARTS_AT, draft};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn draft_intent_only_creates() {
        let h = Harness::new(&["chat"]);
        let outcome = h
            .engine
            .create_event(draft("Raid"), None, PublishIntent::Draft, None)
            .await
            .unwrap();
        assert_eq!(outcome.message, "created");
        assert!(!outcome.record.is_published());
        assert!(h.channel("chat").created().is_empty());
    }

    #[tokio::test]
    async fn failed_publish_keeps_the_record() {
        let h = Harness::new(&["chat"]);
        h.channel("chat").fail_create.store(true, Ordering::SeqCst);
        let outcome = h
            .engine
            .create_event(draft("Raid"), None, PublishIntent::Now, None)
            .await
            .unwrap();

        assert!(outcome.message.starts_with("created but failed to publish: chat"));
        assert!(outcome.publish_error.is_some());
        let stored = h
            .store
            .get_event(outcome.record.event_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_published());
    }

    #[tokio::test]
    async fn scheduled_intent_queues_the_event() {
        let h = Harness::new(&["chat"]);
        let due = STARTS_AT - time::Duration::days(2);
        let outcome = h
            .engine
            .create_event(draft("Raid"), None, PublishIntent::At { due }, None)
            .await
            .unwrap();
        assert_eq!(outcome.message, "created and scheduled");
        assert_eq!(outcome.record.scheduled_publication, Some(due));
    }

    #[tokio::test]
    async fn invalid_draft_creates_nothing() {
        let h = Harness::new(&["chat"]);
        let result = h
            .engine
            .create_event(draft("   "), None, PublishIntent::Now, None)
            .await;
        assert!(result.is_err());
        assert!(h.store.list_events(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loops_stop_on_shutdown() {
        let h = Harness::new(&["chat"]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_rsvp_tx, rsvp_rx) = crate::events::rsvp_update_channel();
        let handles = h.engine.start(shutdown_rx, rsvp_rx);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handles.join())
            .await
            .unwrap();
    }
}
