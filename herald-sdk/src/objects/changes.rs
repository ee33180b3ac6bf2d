//! State change frames pushed to UI collaborators over WebSocket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attendance::AttendancePartition;
use super::publication::ChannelId;
use super::reminder::ReminderSlot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateChangeFrame {
    Published {
        event_id: Uuid,
        channels: Vec<ChannelId>,
    },
    Updated {
        event_id: Uuid,
    },
    Deleted {
        event_id: Uuid,
    },
    ScheduledPublicationSent {
        event_id: Uuid,
    },
    AttendanceChanged {
        event_id: Uuid,
        partition: AttendancePartition,
    },
    AttendanceNotice {
        event_id: Uuid,
        message: String,
    },
    ReminderFired {
        event_id: Uuid,
        slot: ReminderSlot,
        recipients: usize,
    },
}

/// Attendance as shown for the selected event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceResponse {
    pub event_id: Uuid,
    pub partition: AttendancePartition,
    /// Set when the most recent refresh could not reach a channel and the
    /// shown data is the last known state.
    pub notice: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub refreshed_at: Option<time::OffsetDateTime>,
}
