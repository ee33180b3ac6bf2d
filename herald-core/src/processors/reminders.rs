//! ReminderScheduler processor.
//!
//! The ReminderScheduler is responsible for:
//! - Turning an event's `ReminderConfig` into persisted fire-times relative
//!   to its start, recomputed on every edit
//! - Checking for due reminders on a fixed interval
//! - Resolving recipients at fire time against the event's attendance and
//!   participant roster, then delivering through a `ReminderNotifier`
//!
//! A fire-time that is already in the past when it is computed is stored as
//! `skipped` and never fires. A job that was pending when its time came fires
//! on the next tick, however late that is.

use crate::channels::{ChannelError, ReminderNotifier};
use crate::entities::ReminderJobStatus;
use crate::entities::event_records::EventRecord;
use crate::entities::participants::Participant;
use crate::entities::reminder_jobs::{NewReminderJob, ReminderJob};
use crate::events::{StateChange, StateChangeSender};
use crate::processors::attendance::AttendanceReconciler;
use crate::store::{Store, StoreError};
use crate::utils::timebox::timebox;
use herald_sdk::objects::{
    AttendancePartition, AttendanceRecord, RecipientFilter, ReminderConfig, ReminderNotice,
    ReminderRecipient,
};
use itertools::Itertools;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one fire-time check.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FireReport {
    pub fired: Vec<Uuid>,
    /// Delivery failed; the job stays pending for the next tick.
    pub failed: Vec<(Uuid, String)>,
    /// The event no longer exists.
    pub dropped: Vec<Uuid>,
}

/// Fire-times for every enabled slot of `config`.
///
/// A slot whose fire-time falls outside the representable calendar is left
/// out.
pub fn plan_reminders(
    starts_at: OffsetDateTime,
    config: &ReminderConfig,
    now: OffsetDateTime,
) -> Vec<NewReminderJob> {
    config
        .enabled_specs()
        .filter_map(|(slot, spec)| {
            let Some(fire_at) = starts_at.checked_sub(spec.offset()) else {
                warn!(
                    %slot,
                    value = spec.value,
                    unit = %spec.unit,
                    "Reminder offset is out of range, dropping slot"
                );
                return None;
            };
            let status = if fire_at < now {
                ReminderJobStatus::Skipped
            } else {
                ReminderJobStatus::Pending
            };
            Some(NewReminderJob {
                slot: slot.into(),
                fire_at,
                recipients: spec.recipients,
                status,
            })
        })
        .collect()
}

fn to_recipient(record: &AttendanceRecord) -> ReminderRecipient {
    ReminderRecipient {
        person_id: record.person_id.clone(),
        display_name: record.display_name.clone(),
    }
}

/// People a reminder goes to, each at most once.
///
/// `no_response` covers roster members that have no attendance record on
/// any channel.
pub fn resolve_recipients(
    filter: &RecipientFilter,
    partition: &AttendancePartition,
    roster: &[Participant],
) -> Vec<ReminderRecipient> {
    let mut chosen: Vec<ReminderRecipient> = Vec::new();
    if filter.accepted {
        chosen.extend(partition.accepted.iter().map(to_recipient));
    }
    if filter.tentative {
        chosen.extend(partition.tentative.iter().map(to_recipient));
    }
    if filter.declined {
        chosen.extend(partition.declined.iter().map(to_recipient));
    }
    if filter.no_response {
        chosen.extend(
            roster
                .iter()
                .filter(|member| partition.status_of(&member.person_id).is_none())
                .map(|member| ReminderRecipient {
                    person_id: member.person_id.clone(),
                    display_name: member.display_name.clone(),
                }),
        );
    }
    chosen
        .into_iter()
        .unique_by(|recipient| recipient.person_id.clone())
        .collect()
}

struct Audience {
    record: EventRecord,
    partition: AttendancePartition,
    roster: Vec<Participant>,
}

pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    reconciler: Arc<AttendanceReconciler>,
    notifier: Arc<dyn ReminderNotifier>,
    changes: StateChangeSender,
    delivery_timeout: Duration,
    check_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: Arc<AttendanceReconciler>,
        notifier: Arc<dyn ReminderNotifier>,
        changes: StateChangeSender,
        delivery_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            reconciler,
            notifier,
            changes,
            delivery_timeout,
            check_interval,
        }
    }

    /// Replace the event's pending reminders with ones computed from
    /// `config`, and store `config` on the event.
    ///
    /// Called once an event has been published.
    pub async fn schedule(
        &self,
        record: &EventRecord,
        config: ReminderConfig,
        now: OffsetDateTime,
    ) -> Result<Vec<ReminderJob>, ReminderError> {
        if record.reminder_config != Some(config) {
            self.store
                .set_reminder_config(record.event_id, Some(config))
                .await?;
        }
        let planned = plan_reminders(record.starts_at, &config, now);
        for job in planned
            .iter()
            .filter(|job| job.status == ReminderJobStatus::Skipped)
        {
            info!(
                event_id = %record.event_id,
                slot = ?job.slot,
                fire_at = %job.fire_at,
                "Reminder time already passed, skipping"
            );
        }
        let jobs = self
            .store
            .replace_pending_jobs(record.event_id, planned, now)
            .await?;
        debug!(event_id = %record.event_id, jobs = jobs.len(), "Scheduled reminders");
        Ok(jobs)
    }

    /// Recompute reminders after an edit.
    ///
    /// The configuration is the explicit one, else the stored one, else a
    /// single default reminder if the event ever had reminders, else none.
    /// Unpublished events only get their pending reminders cancelled.
    pub async fn reschedule(
        &self,
        record: &EventRecord,
        explicit: Option<ReminderConfig>,
        now: OffsetDateTime,
    ) -> Result<Vec<ReminderJob>, ReminderError> {
        let event_id = record.event_id;
        let resolved = match explicit.or(record.reminder_config) {
            Some(config) => Some(config),
            None if self.store.has_reminder_history(event_id).await? => {
                Some(ReminderConfig::default_single())
            }
            None => None,
        };

        if resolved.is_some() && resolved != record.reminder_config {
            self.store.set_reminder_config(event_id, resolved).await?;
        }

        let Some(config) = resolved.filter(|_| record.is_published()) else {
            let cancelled = self.store.cancel_pending_jobs(event_id).await?;
            if cancelled > 0 {
                debug!(event_id = %event_id, cancelled, "Cancelled pending reminders");
            }
            return Ok(Vec::new());
        };

        let planned = plan_reminders(record.starts_at, &config, now);
        let jobs = self
            .store
            .replace_pending_jobs(event_id, planned, now)
            .await?;
        debug!(event_id = %event_id, jobs = jobs.len(), "Rescheduled reminders");
        Ok(jobs)
    }

    pub async fn cancel(&self, event_id: Uuid) -> Result<u64, ReminderError> {
        Ok(self.store.cancel_pending_jobs(event_id).await?)
    }

    /// Deliver every pending reminder whose fire-time has passed.
    pub async fn fire_due(&self, now: OffsetDateTime) -> Result<FireReport, ReminderError> {
        let due = self.store.due_jobs(now).await?;
        let mut report = FireReport::default();
        let mut audiences: HashMap<Uuid, Option<Audience>> = HashMap::new();

        for job in due {
            let audience = match audiences.entry(job.event_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.load_audience(job.event_id).await?),
            };
            let Some(audience) = audience.as_ref() else {
                self.store
                    .mark_job(job.job_id, ReminderJobStatus::Skipped)
                    .await?;
                report.dropped.push(job.job_id);
                continue;
            };

            let recipients =
                resolve_recipients(&job.recipients, &audience.partition, &audience.roster);
            let recipient_count = recipients.len();
            if recipient_count == 0 {
                info!(event_id = %job.event_id, slot = ?job.slot, "Reminder has no recipients");
            } else {
                let notice = ReminderNotice {
                    event_id: job.event_id,
                    title: audience.record.title.clone(),
                    starts_at: audience.record.starts_at,
                    slot: job.slot.into(),
                    recipients,
                };
                let delivered = timebox(
                    self.delivery_timeout,
                    self.notifier.deliver(&notice),
                    ChannelError::Timeout,
                )
                .await;
                if let Err(e) = delivered {
                    warn!(
                        event_id = %job.event_id,
                        job_id = %job.job_id,
                        error = %e,
                        "Reminder delivery failed, will retry"
                    );
                    report.failed.push((job.job_id, e.to_string()));
                    continue;
                }
            }

            self.store
                .mark_job(job.job_id, ReminderJobStatus::Fired)
                .await?;
            let _ = self.changes.send(StateChange::ReminderFired {
                event_id: job.event_id,
                slot: job.slot,
                recipients: recipient_count,
            });
            info!(
                event_id = %job.event_id,
                slot = ?job.slot,
                recipients = recipient_count,
                "Reminder fired"
            );
            report.fired.push(job.job_id);
        }

        Ok(report)
    }

    /// Run the fire-time checker until shutdown is signaled.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.check_interval, "ReminderScheduler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ReminderScheduler received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(self.check_interval) => {
                    if let Err(e) = self.fire_due(OffsetDateTime::now_utc()).await {
                        error!(error = %e, "Failed to check due reminders");
                    }
                }
            }
        }

        info!("ReminderScheduler shutdown complete");
    }

    /// Attendance is fetched fresh; when that fails the last-known
    /// partition is used.
    async fn load_audience(&self, event_id: Uuid) -> Result<Option<Audience>, ReminderError> {
        let Some(record) = self.store.get_event(event_id).await? else {
            return Ok(None);
        };
        let partition = match self.reconciler.refresh(event_id).await {
            Ok(view) => view.partition,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Using last known attendance for reminder");
                self.reconciler
                    .partition(event_id)
                    .await
                    .unwrap_or_default()
            }
        };
        let roster = self.store.participants(&record.participant_groups).await?;
        Ok(Some(Audience {
            record,
            partition,
            roster,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ReminderSlot;
    use crate::entities::event_records::{EventChanges, EventDraft};
    use crate::processors::publication::UpdateOptions;
    use crate::store::{EventStore, ReminderStore};
    use crate::testing::{Harness, STARTS_AT, draft_with_reminders, rsvp};
    use std::sync::atomic::Ordering;
    use herald_sdk::objects::{AttendanceStatus, OffsetUnit, ReminderSpec};
    use time::macros::datetime;

    const START: OffsetDateTime = datetime!(2026-05-10 20:00 UTC);

    #[test]
    fn plan_follows_start_time() {
        let config = ReminderConfig {
            first: Some(ReminderSpec::minutes_before(60)),
            second: Some(ReminderSpec {
                enabled: true,
                value: 1,
                unit: OffsetUnit::Days,
                recipients: RecipientFilter::default(),
            }),
        };
        let jobs = plan_reminders(START, &config, datetime!(2026-05-01 00:00 UTC));
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].slot, ReminderSlot::First);
        assert_eq!(jobs[0].fire_at, datetime!(2026-05-10 19:00 UTC));
        assert_eq!(jobs[1].fire_at, datetime!(2026-05-09 20:00 UTC));
        assert!(jobs.iter().all(|j| j.status == ReminderJobStatus::Pending));
    }

    #[test]
    fn past_fire_times_are_skipped() {
        let config = ReminderConfig {
            first: Some(ReminderSpec::minutes_before(60)),
            second: Some(ReminderSpec::minutes_before(10)),
        };
        let jobs = plan_reminders(START, &config, datetime!(2026-05-10 19:30 UTC));
        assert_eq!(jobs[0].status, ReminderJobStatus::Skipped);
        assert_eq!(jobs[1].status, ReminderJobStatus::Pending);
    }

    #[test]
    fn out_of_range_offsets_are_dropped() {
        let config = ReminderConfig {
            first: Some(ReminderSpec {
                value: u32::MAX,
                unit: OffsetUnit::Days,
                ..ReminderSpec::minutes_before(0)
            }),
            second: Some(ReminderSpec::minutes_before(30)),
        };
        let jobs = plan_reminders(START, &config, datetime!(2026-05-01 00:00 UTC));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].slot, ReminderSlot::Second);
        assert_eq!(jobs[0].fire_at, datetime!(2026-05-10 19:30 UTC));
    }

    #[test]
    fn recipients_follow_filter() {
        let record = |id: &str, status| AttendanceRecord {
            person_id: id.to_string(),
            display_name: format!("P{id}"),
            status,
        };
        let partition = AttendancePartition::from_records(vec![
            record("1", AttendanceStatus::Accepted),
            record("2", AttendanceStatus::Tentative),
            record("3", AttendanceStatus::Declined),
        ]);
        let roster: Vec<Participant> = ["1", "3", "4"]
            .iter()
            .map(|id| Participant {
                person_id: id.to_string(),
                display_name: format!("P{id}"),
            })
            .collect();

        let ids = |filter: RecipientFilter| -> Vec<String> {
            resolve_recipients(&filter, &partition, &roster)
                .into_iter()
                .map(|r| r.person_id)
                .collect()
        };

        assert_eq!(ids(RecipientFilter::default()), ["1", "2"]);
        assert_eq!(
            ids(RecipientFilter {
                accepted: false,
                tentative: false,
                declined: true,
                no_response: true,
            }),
            ["3", "4"]
        );
        assert!(
            ids(RecipientFilter {
                accepted: false,
                tentative: false,
                declined: false,
                no_response: false,
            })
            .is_empty()
        );
    }

    fn member(id: &str) -> Participant {
        Participant {
            person_id: id.to_string(),
            display_name: format!("Person {id}"),
        }
    }

    async fn published_with_reminder(h: &Harness, recipients: RecipientFilter) -> Uuid {
        let config = ReminderConfig {
            first: Some(ReminderSpec {
                recipients,
                ..ReminderSpec::minutes_before(60)
            }),
            second: None,
        };
        let orchestrator = h.engine.orchestrator();
        let draft = EventDraft {
            participant_groups: Some(vec!["core".into()]),
            ..draft_with_reminders("Raid", config)
        };
        let created = orchestrator.create_record(draft, None).await.unwrap();
        orchestrator
            .publish(created.record.event_id, None, None)
            .await
            .unwrap();
        created.record.event_id
    }

    #[tokio::test]
    async fn no_response_is_resolved_when_the_reminder_fires() {
        let h = Harness::new(&["chat"]);
        h.store.add_participant("core", member("1")).await;
        h.store.add_participant("core", member("2")).await;
        let filter = RecipientFilter {
            accepted: true,
            tentative: false,
            declined: false,
            no_response: true,
        };
        let event_id = published_with_reminder(&h, filter).await;
        h.channel("chat").set_attendance(vec![
            rsvp("1", AttendanceStatus::Accepted),
            rsvp("2", AttendanceStatus::Declined),
        ]);
        // Joined the group after the reminder was scheduled.
        h.store.add_participant("core", member("3")).await;

        let report = h.engine.reminders().fire_due(STARTS_AT).await.unwrap();
        assert_eq!(report.fired.len(), 1);

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].event_id, event_id);
        let ids: Vec<&str> = notices[0]
            .recipients
            .iter()
            .map(|r| r.person_id.as_str())
            .collect();
        assert_eq!(ids, ["1", "3"]);

        let jobs = h.store.jobs_for_event(event_id).await.unwrap();
        assert_eq!(jobs[0].status, ReminderJobStatus::Fired);
        let again = h.engine.reminders().fire_due(STARTS_AT).await.unwrap();
        assert_eq!(again, FireReport::default());
    }

    #[tokio::test]
    async fn failed_delivery_is_retried() {
        let h = Harness::new(&["chat"]);
        h.store.add_participant("core", member("1")).await;
        h.channel("chat")
            .set_attendance(vec![rsvp("1", AttendanceStatus::Accepted)]);
        let event_id = published_with_reminder(&h, RecipientFilter::default()).await;
        h.notifier.fail.store(true, Ordering::SeqCst);

        let report = h.engine.reminders().fire_due(STARTS_AT).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        let jobs = h.store.jobs_for_event(event_id).await.unwrap();
        assert_eq!(jobs[0].status, ReminderJobStatus::Pending);

        h.notifier.fail.store(false, Ordering::SeqCst);
        let report = h.engine.reminders().fire_due(STARTS_AT).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn edit_without_any_config_falls_back_to_a_single_default_reminder() {
        let h = Harness::new(&["chat"]);
        let event_id = published_with_reminder(&h, RecipientFilter::default()).await;
        h.store.set_reminder_config(event_id, None).await.unwrap();

        let changes = EventChanges {
            starts_at: Some(STARTS_AT + time::Duration::minutes(30)),
            ..EventChanges::default()
        };
        let result = h
            .engine
            .orchestrator()
            .update(event_id, changes, UpdateOptions::default())
            .await
            .unwrap();
        assert!(result.reminder_error.is_none());
        assert_eq!(
            result.record.reminder_config,
            Some(ReminderConfig::default_single())
        );

        let pending: Vec<_> = h
            .store
            .jobs_for_event(event_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|job| job.status == ReminderJobStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].slot, ReminderSlot::First);
        assert_eq!(pending[0].fire_at, datetime!(2030-05-01 19:15 UTC));
    }

    #[tokio::test]
    async fn unpublished_events_lose_pending_reminders_on_edit() {
        let h = Harness::new(&["chat"]);
        let event_id = published_with_reminder(&h, RecipientFilter::default()).await;
        let mut record = h.store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(h.store.jobs_for_event(event_id).await.unwrap().len(), 1);

        record.channel_publications = Default::default();
        let jobs = h
            .engine
            .reminders()
            .reschedule(&record, None, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(jobs.is_empty());
        assert!(h.store.jobs_for_event(event_id).await.unwrap().is_empty());
    }
}
