//! Wire objects shared between the Herald server, channel endpoints and UI
//! collaborators.

pub mod attendance;
pub mod changes;
pub mod cycle;
pub mod event;
pub mod image;
pub mod publication;
pub mod reminder;

pub use attendance::{
    AttendancePartition, AttendanceRecord, AttendanceSnapshot, AttendanceStatus,
    RsvpUpdateNotification,
};
pub use changes::{AttendanceResponse, StateChangeFrame};
pub use cycle::{CreateCycleRequest, CycleResponse, CycleStatus};
pub use event::{
    CreateEventRequest, CreatedMessage, EventMessage, EventResponse, OperationReport,
    PublishIntent, PublishRequest, ScheduleRequest, UpdateEventRequest,
};
pub use image::{ImageBatch, ImageMode, ImageUpload, StoredImages};
pub use publication::{
    ChannelFailureView, ChannelId, ChannelPublication, StoredChannelPublications,
};
pub use reminder::{
    DEFAULT_REMINDER_MINUTES, MAX_REMINDER_OFFSET_DAYS, OffsetUnit, RecipientFilter,
    ReminderConfig, ReminderConfigError, ReminderNotice, ReminderRecipient, ReminderSlot,
    ReminderSpec,
};
