//! Event payloads and event API DTOs.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::image::ImageBatch;
use super::publication::{ChannelFailureView, ChannelId, ChannelPublication};
use super::reminder::ReminderConfig;
use crate::signature::Signature;

/// The representation of an event that gets posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event_id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub participant_groups: Vec<String>,
    pub header_image_url: Option<String>,
    pub image_urls: Vec<String>,
}

impl Signature for EventMessage {}

/// Returned by a channel endpoint after a message was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMessage {
    pub message_id: String,
}

/// When an event should be published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PublishIntent {
    /// Keep the event unpublished.
    #[default]
    Draft,
    /// Publish right after the record is created.
    Now,
    /// Hand the event to the scheduled publication queue.
    At {
        #[serde(with = "time::serde::rfc3339")]
        due: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(default)]
    pub cycle_id: Option<Uuid>,
    /// `None` inherits the parent cycle's default groups.
    #[serde(default)]
    pub participant_groups: Option<Vec<String>>,
    #[serde(default)]
    pub reminder_config: Option<ReminderConfig>,
    #[serde(default)]
    pub images: Option<ImageBatch>,
    #[serde(default)]
    pub publish: PublishIntent,
    /// Restrict publication to these channels. `None` means all channels.
    #[serde(default)]
    pub channels: Option<Vec<ChannelId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub starts_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub participant_groups: Option<Vec<String>>,
    #[serde(default)]
    pub reminder_config: Option<ReminderConfig>,
    #[serde(default)]
    pub images: Option<ImageBatch>,
    #[serde(default)]
    pub publish_now: bool,
    #[serde(default)]
    pub channels: Option<Vec<ChannelId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub channels: Option<Vec<ChannelId>>,
    #[serde(default)]
    pub reminder_config: Option<ReminderConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_time: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    pub event_id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub cycle_id: Option<Uuid>,
    pub participant_groups: Vec<String>,
    pub header_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub channel_publications: Vec<ChannelPublication>,
    pub reminder_config: Option<ReminderConfig>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_publication: Option<OffsetDateTime>,
    pub published: bool,
}

/// Outcome of an event operation.
///
/// `message` is qualified when the record operation succeeded but a
/// downstream effect did not, e.g. "created but failed to publish".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    pub success: bool,
    pub message: String,
    pub event: Option<EventResponse>,
    #[serde(default)]
    pub channel_failures: Vec<ChannelFailureView>,
}
