//! AttendanceReconciler processor.
//!
//! The AttendanceReconciler is responsible for:
//! - Polling every published channel of an event for its full RSVP state
//! - Applying pushed `RsvpUpdateNotification`s via the `Processor` trait,
//!   dropping redundant and out-of-order deliveries
//! - Running the refresh loop of the currently selected event, discarding
//!   results that arrive after the selection changed
//!
//! Attendance is never authored locally. Each channel's snapshot is replaced
//! wholesale; a channel that cannot be reached keeps its last-known snapshot
//! and the view carries a notice instead. Only the selected event keeps
//! state between refreshes.

use crate::channels::{ChannelDirectory, ChannelError};
use crate::entities::event_records::ChannelPublications;
use crate::events::{RsvpUpdateReceiver, StateChange, StateChangeSender};
use crate::store::{Store, StoreError};
use crate::utils::timebox::timebox;
use futures_util::future::join_all;
use herald_sdk::objects::{
    AttendancePartition, AttendanceRecord, AttendanceResponse, AttendanceSnapshot, ChannelId,
    RsvpUpdateNotification,
};
use kanau::processor::Processor;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    #[error("cannot serialize push identity: {0}")]
    Identity(#[from] serde_json::Error),
}

/// What happened to a pushed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        event_id: Uuid,
        channel_id: ChannelId,
    },
    /// Not about a message of the tracked event.
    Ignored,
    /// Identical to the last applied update.
    Duplicate,
    /// Older than the last applied push for the same message.
    Stale,
}

#[derive(Default)]
struct EventAttendance {
    snapshots: BTreeMap<ChannelId, AttendanceSnapshot>,
    last_identity: Option<String>,
    last_push_at: HashMap<String, OffsetDateTime>,
    notice: Option<String>,
    refreshed_at: Option<OffsetDateTime>,
}

impl EventAttendance {
    /// One record per person; for people on several channels the channel
    /// that sorts last wins.
    fn partition(&self) -> AttendancePartition {
        let mut by_person: HashMap<&str, &AttendanceRecord> = HashMap::new();
        for snapshot in self.snapshots.values() {
            for record in &snapshot.records {
                by_person.insert(record.person_id.as_str(), record);
            }
        }
        AttendancePartition::from_records(by_person.into_values().cloned())
    }

    fn view(&self, event_id: Uuid) -> AttendanceResponse {
        AttendanceResponse {
            event_id,
            partition: self.partition(),
            notice: self.notice.clone(),
            refreshed_at: self.refreshed_at,
        }
    }
}

struct Selection {
    event_id: Uuid,
    handle: JoinHandle<()>,
}

type FetchResult = (ChannelId, Result<Vec<AttendanceRecord>, ChannelError>);

pub struct AttendanceReconciler {
    store: Arc<dyn Store>,
    channels: ChannelDirectory,
    fetch_timeout: Duration,
    refresh_interval: Duration,
    changes: StateChangeSender,
    events: Mutex<HashMap<Uuid, EventAttendance>>,
    selection: Mutex<Option<Selection>>,
    generation: AtomicU64,
}

impl AttendanceReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        channels: ChannelDirectory,
        fetch_timeout: Duration,
        refresh_interval: Duration,
        changes: StateChangeSender,
    ) -> Self {
        Self {
            store,
            channels,
            fetch_timeout,
            refresh_interval,
            changes,
            events: Mutex::new(HashMap::new()),
            selection: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch every published channel and merge the results.
    ///
    /// The merged view is kept only if `event_id` is still the selected
    /// event when the fetch completes.
    pub async fn refresh(&self, event_id: Uuid) -> Result<AttendanceResponse, ReconcileError> {
        let (selected, generation) = self.tracked().await;
        let (publications, results) = self.fetch_all(event_id).await?;
        let mut events = self.events.lock().await;
        if selected == Some(event_id) && self.generation.load(Ordering::SeqCst) == generation {
            let state = events.entry(event_id).or_default();
            return Ok(self.merge_fetched(state, event_id, &publications, results));
        }
        drop(events);
        let mut transient = EventAttendance::default();
        Ok(self.merge_fetched(&mut transient, event_id, &publications, results))
    }

    /// Last-known view of an event, if it was ever refreshed or pushed.
    pub async fn snapshot(&self, event_id: Uuid) -> Option<AttendanceResponse> {
        self.events
            .lock()
            .await
            .get(&event_id)
            .map(|state| state.view(event_id))
    }

    pub async fn partition(&self, event_id: Uuid) -> Option<AttendancePartition> {
        self.events
            .lock()
            .await
            .get(&event_id)
            .map(|state| state.partition())
    }

    pub async fn selected_event(&self) -> Option<Uuid> {
        self.tracked().await.0
    }

    async fn tracked(&self) -> (Option<Uuid>, u64) {
        let selection = self.selection.lock().await;
        (
            selection.as_ref().map(|selection| selection.event_id),
            self.generation.load(Ordering::SeqCst),
        )
    }

    /// Start tracking `event_id`, replacing the previous selection.
    ///
    /// The refresh loop ticks immediately and then every refresh interval.
    /// Returns the generation of the new selection.
    pub async fn select(self: &Arc<Self>, event_id: Uuid) -> u64 {
        let mut selection = self.selection.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = selection.take() {
            previous.handle.abort();
        }
        self.events.lock().await.retain(|tracked, _| *tracked == event_id);
        let this = Arc::clone(self);
        let handle = tokio::spawn(this.refresh_loop(event_id, generation));
        *selection = Some(Selection { event_id, handle });
        info!(event_id = %event_id, generation, "Selected event for attendance tracking");
        generation
    }

    /// Stop the refresh loop. Returns the event that was selected.
    pub async fn deselect(&self) -> Option<Uuid> {
        let mut selection = self.selection.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.events.lock().await.clear();
        let previous = selection.take()?;
        previous.handle.abort();
        debug!(event_id = %previous.event_id, "Deselected event");
        Some(previous.event_id)
    }

    /// Drop all attendance state of a deleted event.
    pub async fn forget(&self, event_id: Uuid) {
        if self.selected_event().await == Some(event_id) {
            self.deselect().await;
        }
        self.events.lock().await.remove(&event_id);
    }

    /// Apply one pushed update.
    pub async fn apply_update(
        &self,
        notification: RsvpUpdateNotification,
    ) -> Result<ApplyOutcome, ReconcileError> {
        let (Some(event_id), generation) = self.tracked().await else {
            return Ok(ApplyOutcome::Ignored);
        };
        let Some(record) = self.store.get_event(event_id).await? else {
            return Ok(ApplyOutcome::Ignored);
        };
        let publications = self.channels.publications_of(&record).await;
        let Some(channel_id) = publications
            .channel_of_message(&notification.source_message_id)
            .cloned()
        else {
            debug!(
                event_id = %event_id,
                message_id = %notification.source_message_id,
                "Push is not about the tracked event"
            );
            return Ok(ApplyOutcome::Ignored);
        };

        let identity = notification.identity()?;
        let mut events = self.events.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(event_id = %event_id, "Selection changed while applying push");
            return Ok(ApplyOutcome::Ignored);
        }
        let state = events.entry(event_id).or_default();

        if state.last_identity.as_deref() == Some(identity.as_str()) {
            return Ok(ApplyOutcome::Duplicate);
        }
        if let Some(last) = state.last_push_at.get(&notification.source_message_id) {
            if notification.timestamp < *last {
                debug!(
                    event_id = %event_id,
                    channel = %channel_id,
                    "Dropping push older than the last applied one"
                );
                return Ok(ApplyOutcome::Stale);
            }
        }

        let before = state.partition();
        state.snapshots.insert(
            channel_id.clone(),
            AttendanceSnapshot {
                records: notification.snapshot,
                fetched_at: notification.timestamp,
            },
        );
        state.last_identity = Some(identity);
        state
            .last_push_at
            .insert(notification.source_message_id, notification.timestamp);
        let after = state.partition();
        drop(events);

        if before != after {
            let _ = self.changes.send(StateChange::AttendanceChanged {
                event_id,
                partition: after,
            });
        }
        debug!(event_id = %event_id, channel = %channel_id, "Applied pushed RSVP update");
        Ok(ApplyOutcome::Applied {
            event_id,
            channel_id,
        })
    }

    /// Consume pushed updates until shutdown, then stop the refresh loop.
    pub async fn run_push_consumer(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
        mut rsvp_rx: RsvpUpdateReceiver,
    ) {
        info!("AttendanceReconciler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("AttendanceReconciler received shutdown signal");
                        break;
                    }
                }

                Some(notification) = rsvp_rx.recv() => {
                    match self.process(notification).await {
                        Ok(outcome) => debug!(?outcome, "Processed RSVP push"),
                        Err(e) => warn!(error = %e, "Failed to apply RSVP push"),
                    }
                }

                else => {
                    info!("RSVP update channel closed");
                    break;
                }
            }
        }

        self.deselect().await;
        info!("AttendanceReconciler shutdown complete");
    }

    async fn refresh_loop(self: Arc<Self>, event_id: Uuid, generation: u64) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                break;
            }
            match self.fetch_all(event_id).await {
                Ok((publications, results)) => {
                    let mut events = self.events.lock().await;
                    if self.generation.load(Ordering::SeqCst) != generation {
                        debug!(event_id = %event_id, "Discarded refresh of a stale selection");
                        break;
                    }
                    let state = events.entry(event_id).or_default();
                    self.merge_fetched(state, event_id, &publications, results);
                }
                Err(ReconcileError::EventNotFound(_)) => {
                    info!(event_id = %event_id, "Selected event no longer exists");
                    break;
                }
                Err(e) => {
                    warn!(event_id = %event_id, error = %e, "Attendance refresh failed");
                }
            }
        }
    }

    async fn fetch_all(
        &self,
        event_id: Uuid,
    ) -> Result<(ChannelPublications, Vec<FetchResult>), ReconcileError> {
        let record = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(ReconcileError::EventNotFound(event_id))?;
        let publications = self.channels.publications_of(&record).await;
        let registry = self.channels.registry().await;

        let fetches = publications.iter().map(|(channel_id, message)| {
            let adapter = registry.get(channel_id);
            async move {
                let result = match adapter {
                    Some(adapter) => {
                        timebox(
                            self.fetch_timeout,
                            adapter.fetch_attendance(&message.message_id),
                            ChannelError::Timeout,
                        )
                        .await
                    }
                    None => Err(ChannelError::UnknownChannel(channel_id.clone())),
                };
                (channel_id.clone(), result)
            }
        });
        let results = join_all(fetches).await;
        Ok((publications, results))
    }

    fn merge_fetched(
        &self,
        state: &mut EventAttendance,
        event_id: Uuid,
        publications: &ChannelPublications,
        results: Vec<FetchResult>,
    ) -> AttendanceResponse {
        let now = OffsetDateTime::now_utc();
        let before = state.partition();
        state
            .snapshots
            .retain(|channel_id, _| publications.contains(channel_id));

        let mut failed = Vec::new();
        for (channel_id, result) in results {
            match result {
                Ok(records) => {
                    state.snapshots.insert(
                        channel_id,
                        AttendanceSnapshot {
                            records,
                            fetched_at: now,
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        event_id = %event_id,
                        channel = %channel_id,
                        error = %e,
                        "Keeping last known attendance"
                    );
                    failed.push(channel_id.to_string());
                }
            }
        }

        state.notice = if failed.is_empty() {
            None
        } else {
            Some(format!(
                "Attendance could not be refreshed from {}; showing last known data",
                failed.join(", ")
            ))
        };
        state.refreshed_at = Some(now);
        let view = state.view(event_id);

        if before != view.partition {
            let _ = self.changes.send(StateChange::AttendanceChanged {
                event_id,
                partition: view.partition.clone(),
            });
        }
        if let Some(message) = &view.notice {
            let _ = self.changes.send(StateChange::AttendanceNotice {
                event_id,
                message: message.clone(),
            });
        }
        view
    }
}

impl Processor<RsvpUpdateNotification> for AttendanceReconciler {
    type Output = ApplyOutcome;
    type Error = ReconcileError;

    async fn process(
        &self,
        notification: RsvpUpdateNotification,
    ) -> Result<ApplyOutcome, ReconcileError> {
        self.apply_update(notification).await
    }
}
