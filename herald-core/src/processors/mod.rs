//! Processors that drive events through their lifecycle.
//!
//! - `PublicationOrchestrator`: creates, publishes, updates and deletes events
//!   across channels, emits `Published`, `Updated` and `Deleted`
//! - `ScheduledPublicationQueue`: polls due entries and publishes them through
//!   the orchestrator, emits `ScheduledPublicationSent`
//! - `AttendanceReconciler`: receives `RsvpUpdateNotification`, refreshes the
//!   selected event's attendance, emits `AttendanceChanged`
//! - `ReminderScheduler`: computes reminder jobs and delivers them when due,
//!   emits `ReminderFired`

pub mod attendance;
pub mod publication;
pub mod reminders;
pub mod schedule_queue;

pub use attendance::{ApplyOutcome, AttendanceReconciler, ReconcileError};
pub use publication::{
    CreatedRecord, DeleteResult, PublicationOrchestrator, PublicationResult, PublishError,
    UpdateOptions, UpdateResult,
};
pub use reminders::{FireReport, ReminderError, ReminderScheduler};
pub use schedule_queue::{PollReport, ScheduleError, ScheduledPublicationQueue};
