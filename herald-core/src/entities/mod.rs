pub mod cycle_records;
pub mod event_records;
pub mod participants;
pub mod reminder_jobs;
pub mod scheduled_publications;

use herald_sdk::objects::ReminderSlot as SdkReminderSlot;

/// Reminder slot for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `herald_sdk::objects::ReminderSlot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "reminder_slot")]
pub enum ReminderSlot {
    First,
    Second,
}

impl From<ReminderSlot> for SdkReminderSlot {
    fn from(value: ReminderSlot) -> Self {
        match value {
            ReminderSlot::First => SdkReminderSlot::First,
            ReminderSlot::Second => SdkReminderSlot::Second,
        }
    }
}

impl From<SdkReminderSlot> for ReminderSlot {
    fn from(value: SdkReminderSlot) -> Self {
        match value {
            SdkReminderSlot::First => ReminderSlot::First,
            SdkReminderSlot::Second => ReminderSlot::Second,
        }
    }
}

/// Lifecycle of a persisted reminder fire-time.
///
/// `Fired` and `Skipped` rows are kept as reminder history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "reminder_job_status")]
pub enum ReminderJobStatus {
    Pending,
    Fired,
    Skipped,
}

impl std::fmt::Display for ReminderJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderJobStatus::Pending => write!(f, "pending"),
            ReminderJobStatus::Fired => write!(f, "fired"),
            ReminderJobStatus::Skipped => write!(f, "skipped"),
        }
    }
}
