//! Event type definitions.

use crate::entities::ReminderSlot;
use herald_sdk::objects::{AttendancePartition, ChannelId, StateChangeFrame};
use uuid::Uuid;

/// Something UI collaborators should re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// New channel messages were created for an event.
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
    /// The scheduled publication queue promoted a due entry.
    ScheduledPublicationSent {
        event_id: Uuid,
    },
    AttendanceChanged {
        event_id: Uuid,
        partition: AttendancePartition,
    },
    /// A refresh failed for some channel; the shown attendance is stale.
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

impl StateChange {
    pub fn event_id(&self) -> Uuid {
        match self {
            StateChange::Published { event_id, .. }
            | StateChange::Updated { event_id }
            | StateChange::Deleted { event_id }
            | StateChange::ScheduledPublicationSent { event_id }
            | StateChange::AttendanceChanged { event_id, .. }
            | StateChange::AttendanceNotice { event_id, .. }
            | StateChange::ReminderFired { event_id, .. } => *event_id,
        }
    }
}

impl From<StateChange> for StateChangeFrame {
    fn from(value: StateChange) -> Self {
        match value {
            StateChange::Published { event_id, channels } => {
                StateChangeFrame::Published { event_id, channels }
            }
            StateChange::Updated { event_id } => StateChangeFrame::Updated { event_id },
            StateChange::Deleted { event_id } => StateChangeFrame::Deleted { event_id },
            StateChange::ScheduledPublicationSent { event_id } => {
                StateChangeFrame::ScheduledPublicationSent { event_id }
            }
            StateChange::AttendanceChanged {
                event_id,
                partition,
            } => StateChangeFrame::AttendanceChanged {
                event_id,
                partition,
            },
            StateChange::AttendanceNotice { event_id, message } => {
                StateChangeFrame::AttendanceNotice { event_id, message }
            }
            StateChange::ReminderFired {
                event_id,
                slot,
                recipients,
            } => StateChangeFrame::ReminderFired {
                event_id,
                slot: slot.into(),
                recipients,
            },
        }
    }
}
