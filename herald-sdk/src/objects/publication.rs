//! Channel publication types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of one configured channel (a community or messaging endpoint).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(CompactString);

impl ChannelId {
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(CompactString::from(value))
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(CompactString::from(value))
    }
}

/// The message an event was posted as on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPublication {
    pub channel_id: ChannelId,
    pub message_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
}

/// Shape of the publication column as it exists in storage.
///
/// Older records stored a single bare message id string from before events
/// could be posted to more than one channel. Those are only ever read and
/// immediately normalized; new writes always use [`Structured`].
///
/// [`Structured`]: StoredChannelPublications::Structured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredChannelPublications {
    Legacy(String),
    Structured(Vec<ChannelPublication>),
}

impl StoredChannelPublications {
    /// Normalize into the structured form.
    ///
    /// A legacy message id is attributed to `legacy_channel` and stamped with
    /// `legacy_published_at`, since the old shape carried neither. An empty
    /// legacy string means "never published".
    pub fn normalize(
        self,
        legacy_channel: &ChannelId,
        legacy_published_at: OffsetDateTime,
    ) -> Vec<ChannelPublication> {
        match self {
            StoredChannelPublications::Legacy(message_id) => {
                let message_id = message_id.trim();
                if message_id.is_empty() {
                    return Vec::new();
                }
                vec![ChannelPublication {
                    channel_id: legacy_channel.clone(),
                    message_id: message_id.to_string(),
                    published_at: legacy_published_at,
                }]
            }
            StoredChannelPublications::Structured(publications) => publications,
        }
    }
}

/// A channel operation that failed, as reported to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFailureView {
    pub channel_id: ChannelId,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn legacy_string_normalizes_to_single_publication() {
        let stored: StoredChannelPublications = serde_json::from_str(r#""1234567890""#).unwrap();
        let at = datetime!(2024-05-01 12:00 UTC);
        let normalized = stored.normalize(&ChannelId::from("discord"), at);
        assert_eq!(
            normalized,
            vec![ChannelPublication {
                channel_id: ChannelId::from("discord"),
                message_id: "1234567890".to_string(),
                published_at: at,
            }]
        );
    }

    #[test]
    fn empty_legacy_string_means_unpublished() {
        let stored = StoredChannelPublications::Legacy("  ".to_string());
        assert!(
            stored
                .normalize(&ChannelId::from("discord"), datetime!(2024-05-01 12:00 UTC))
                .is_empty()
        );
    }

    #[test]
    fn structured_array_is_kept_as_is() {
        let json = r#"[
            {"channel_id":"discord","message_id":"a","published_at":"2025-01-01T10:00:00Z"},
            {"channel_id":"forum","message_id":"b","published_at":"2025-01-01T10:00:01Z"}
        ]"#;
        let stored: StoredChannelPublications = serde_json::from_str(json).unwrap();
        let normalized = stored.normalize(&ChannelId::from("ignored"), datetime!(2020-01-01 0:00 UTC));
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[1].channel_id.as_str(), "forum");
    }
}
