//! ScheduledPublicationQueue processor.
//!
//! The ScheduledPublicationQueue is responsible for:
//! - Accepting and cancelling "publish at T" requests for unpublished events
//! - Polling for due entries and publishing each one through the
//!   [`PublicationOrchestrator`]
//! - Adapting its poll interval to how soon the next entry is due
//!
//! An entry is marked sent only after a publish succeeded (or the event turned
//! out to be published already), so a failed attempt is retried on the next
//! poll. Polls never overlap, which keeps a due entry from being published
//! twice.

use crate::config::QueueIntervals;
use crate::entities::event_records::ValidationError;
use crate::entities::scheduled_publications::ScheduledPublicationEntry;
use crate::events::{StateChange, StateChangeSender};
use crate::processors::publication::{PublicationOrchestrator, PublishError};
use crate::store::{Store, StoreError};
use crate::utils::poll_interval::next_poll_interval;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a single poll did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub published: Vec<Uuid>,
    /// Entries whose event was already published another way.
    pub already_published: Vec<Uuid>,
    /// Entries whose event no longer exists.
    pub removed: Vec<Uuid>,
    /// Entries left pending for the next poll.
    pub failed: Vec<Uuid>,
}

pub struct ScheduledPublicationQueue {
    store: Arc<dyn Store>,
    orchestrator: Arc<PublicationOrchestrator>,
    intervals: QueueIntervals,
    changes: StateChangeSender,
    wake: Notify,
    poll_lock: Mutex<()>,
}

impl ScheduledPublicationQueue {
    pub fn new(
        store: Arc<dyn Store>,
        orchestrator: Arc<PublicationOrchestrator>,
        intervals: QueueIntervals,
        changes: StateChangeSender,
    ) -> Self {
        Self {
            store,
            orchestrator,
            intervals,
            changes,
            wake: Notify::new(),
            poll_lock: Mutex::new(()),
        }
    }

    /// Schedule (or reschedule) the publication of an unpublished event.
    ///
    /// A due time in the past is accepted and picked up by the next poll.
    pub async fn schedule(
        &self,
        event_id: Uuid,
        due: OffsetDateTime,
    ) -> Result<ScheduledPublicationEntry, ScheduleError> {
        let record = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ValidationError::EventNotFound(event_id))?;
        if !self.orchestrator.publications(&record).await.is_empty() {
            return Err(ValidationError::AlreadyPublished(event_id).into());
        }

        let entry = self.store.upsert_schedule(event_id, due).await?;
        self.store
            .set_scheduled_publication(event_id, Some(due))
            .await?;
        info!(event_id = %event_id, due = %due, "Publication scheduled");
        self.wake.notify_one();
        Ok(entry)
    }

    /// Remove the pending entry of an event. Returns `false` if there was none.
    pub async fn cancel(&self, event_id: Uuid) -> Result<bool, ScheduleError> {
        let removed = self.store.delete_schedule(event_id).await?;
        self.store.set_scheduled_publication(event_id, None).await?;
        if removed {
            info!(event_id = %event_id, "Scheduled publication cancelled");
            self.wake.notify_one();
        }
        Ok(removed)
    }

    /// Publish every entry due at `now`.
    pub async fn poll_once(&self, now: OffsetDateTime) -> Result<PollReport, ScheduleError> {
        let _guard = self.poll_lock.lock().await;
        let due = self.store.due_schedules(now).await?;
        let mut report = PollReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        debug!(count = due.len(), "Processing due scheduled publications");

        for entry in due {
            let event_id = entry.event_id;
            let Some(record) = self.store.get_event(event_id).await? else {
                warn!(event_id = %event_id, "Scheduled event no longer exists, dropping entry");
                self.store.delete_schedule(event_id).await?;
                report.removed.push(event_id);
                continue;
            };

            if !self.orchestrator.publications(&record).await.is_empty() {
                self.store.mark_schedule_sent(event_id).await?;
                self.store.set_scheduled_publication(event_id, None).await?;
                debug!(event_id = %event_id, "Event already published, entry superseded");
                report.already_published.push(event_id);
                continue;
            }

            match self.orchestrator.publish(event_id, None, None).await {
                Ok(result) if result.success => {
                    // Publishing already supersedes the entry; this covers a
                    // store that raced the orchestrator's write.
                    self.store.mark_schedule_sent(event_id).await?;
                    info!(
                        event_id = %event_id,
                        channels = result.published.len(),
                        failed = result.errors.len(),
                        "Scheduled publication sent"
                    );
                    let _ = self
                        .changes
                        .send(StateChange::ScheduledPublicationSent { event_id });
                    report.published.push(event_id);
                }
                Ok(result) => {
                    warn!(
                        event_id = %event_id,
                        failed = result.errors.len(),
                        "Scheduled publication reached no channel, retrying next poll"
                    );
                    report.failed.push(event_id);
                }
                Err(PublishError::Validation(ValidationError::EventNotFound(_))) => {
                    self.store.delete_schedule(event_id).await?;
                    report.removed.push(event_id);
                }
                Err(e) => {
                    error!(event_id = %event_id, error = %e, "Scheduled publication failed");
                    report.failed.push(event_id);
                }
            }
        }

        Ok(report)
    }

    async fn next_interval(&self) -> Duration {
        let now = OffsetDateTime::now_utc();
        match self.store.next_pending_schedule().await {
            Ok(next_due) => next_poll_interval(next_due, now, &self.intervals),
            Err(e) => {
                warn!(error = %e, "Failed to read next scheduled publication");
                self.intervals.fast
            }
        }
    }

    /// Run the poll loop until shutdown is signaled.
    ///
    /// Scheduling or cancelling an entry wakes the loop early so the interval
    /// is recomputed against the new earliest due time.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            slow = ?self.intervals.slow,
            fast = ?self.intervals.fast,
            "ScheduledPublicationQueue started"
        );

        loop {
            let interval = self.next_interval().await;
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ScheduledPublicationQueue received shutdown signal");
                        break;
                    }
                }

                _ = self.wake.notified() => {
                    debug!("Schedule changed, recomputing poll interval");
                }

                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.poll_once(OffsetDateTime::now_utc()).await {
                        error!(error = %e, "Scheduled publication poll failed");
                    }
                }
            }
        }

        info!("ScheduledPublicationQueue shutdown complete");
    }
}
