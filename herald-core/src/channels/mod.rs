//! External communication channels.
//!
//! Every channel is a black box behind [`ChannelAdapter`] with its own
//! latency and failure modes. Callers time-box each call and treat a timeout
//! like any other [`ChannelError`].

mod fallback_cache;
mod notifier;
mod webhook;

pub use fallback_cache::{CacheError, MessageIdCache};
pub use notifier::{ReminderNotifier, TracingReminderNotifier, WebhookReminderNotifier};
pub use webhook::{WebhookChannel, WebhookChannelConfig};

use crate::config::ConfigStore;
use crate::entities::event_records::{ChannelPublications, EventRecord, PublishedMessage};
use async_trait::async_trait;
use herald_sdk::objects::{AttendanceRecord, ChannelFailureView, ChannelId, EventMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("channel rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("channel did not respond within {0:?}")]
    Timeout(Duration),

    #[error("message {0} does not exist on the channel")]
    MessageNotFound(String),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel {0} is not configured")]
    UnknownChannel(ChannelId),
}

/// One channel's failure inside an otherwise independent fan-out.
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel_id: ChannelId,
    pub error: ChannelError,
}

impl ChannelFailure {
    pub fn new(channel_id: ChannelId, error: ChannelError) -> Self {
        Self { channel_id, error }
    }

    pub fn to_view(&self) -> ChannelFailureView {
        ChannelFailureView {
            channel_id: self.channel_id.clone(),
            error: self.error.to_string(),
        }
    }
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn id(&self) -> &ChannelId;

    fn name(&self) -> &str;

    /// Post the event and return the id of the created message.
    async fn create_message(&self, message: &EventMessage) -> Result<String, ChannelError>;

    async fn update_message(
        &self,
        message_id: &str,
        message: &EventMessage,
    ) -> Result<(), ChannelError>;

    async fn delete_message(&self, message_id: &str) -> Result<(), ChannelError>;

    /// Complete RSVP state of one message.
    async fn fetch_attendance(
        &self,
        message_id: &str,
    ) -> Result<Vec<AttendanceRecord>, ChannelError>;
}

/// The configured channels, ordered by id.
///
/// Channel counts are small, so lookups are linear scans.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

/// Result of narrowing the registry to a requested channel set.
pub struct ChannelSelection {
    pub adapters: Vec<Arc<dyn ChannelAdapter>>,
    pub unknown: Vec<ChannelId>,
}

impl ChannelRegistry {
    /// Later adapters with an id already present are dropped.
    pub fn new(adapters: Vec<Arc<dyn ChannelAdapter>>) -> Self {
        let mut unique: Vec<Arc<dyn ChannelAdapter>> = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if !unique.iter().any(|a| a.id() == adapter.id()) {
                unique.push(adapter);
            }
        }
        unique.sort_by(|a, b| a.id().cmp(b.id()));
        Self { adapters: unique }
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.id() == channel_id)
            .cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.adapters.iter().map(|adapter| adapter.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChannelAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// `None` selects every configured channel.
    pub fn select(&self, requested: Option<&[ChannelId]>) -> ChannelSelection {
        let Some(requested) = requested else {
            return ChannelSelection {
                adapters: self.adapters.clone(),
                unknown: Vec::new(),
            };
        };
        let mut selection = ChannelSelection {
            adapters: Vec::with_capacity(requested.len()),
            unknown: Vec::new(),
        };
        for channel_id in requested {
            if selection.adapters.iter().any(|a| a.id() == channel_id)
                || selection.unknown.contains(channel_id)
            {
                continue;
            }
            match self.get(channel_id) {
                Some(adapter) => selection.adapters.push(adapter),
                None => selection.unknown.push(channel_id.clone()),
            }
        }
        selection
    }
}

/// Shared access to the live channel registry and the fallback cache.
#[derive(Clone)]
pub struct ChannelDirectory {
    registry: ConfigStore<ChannelRegistry>,
    fallback: Option<Arc<MessageIdCache>>,
}

impl ChannelDirectory {
    pub fn new(registry: ConfigStore<ChannelRegistry>) -> Self {
        Self {
            registry,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, cache: Arc<MessageIdCache>) -> Self {
        self.fallback = Some(cache);
        self
    }

    pub async fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.current().await
    }

    pub fn registry_store(&self) -> &ConfigStore<ChannelRegistry> {
        &self.registry
    }

    /// The publications of an event as far as they can be known.
    ///
    /// The stored map is authoritative. Only when it is empty is the
    /// fallback cache consulted for each configured channel; hits carry the
    /// record's `updated_at` as publish time.
    pub async fn publications_of(&self, record: &EventRecord) -> ChannelPublications {
        if !record.channel_publications.is_empty() {
            return record.channel_publications.clone();
        }
        let Some(cache) = &self.fallback else {
            return ChannelPublications::new();
        };
        let registry = self.registry().await;
        let mut found = ChannelPublications::new();
        for channel_id in registry.ids() {
            if let Some(message_id) = cache.lookup(record.event_id, channel_id).await {
                found.insert(
                    channel_id.clone(),
                    PublishedMessage {
                        message_id,
                        published_at: record.updated_at,
                    },
                );
            }
        }
        if !found.is_empty() {
            debug!(
                event_id = %record.event_id,
                channels = found.len(),
                "Resolved publications from fallback cache"
            );
        }
        found
    }

    /// Drop cached message ids of a deleted event.
    pub async fn evict(&self, event_id: Uuid) -> Result<bool, CacheError> {
        match &self.fallback {
            Some(cache) => cache.evict(event_id).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(ChannelId);

    #[async_trait]
    impl ChannelAdapter for Named {
        fn id(&self) -> &ChannelId {
            &self.0
        }

        fn name(&self) -> &str {
            self.0.as_str()
        }

        async fn create_message(&self, _: &EventMessage) -> Result<String, ChannelError> {
            Ok(String::new())
        }

        async fn update_message(&self, _: &str, _: &EventMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn delete_message(&self, _: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn fetch_attendance(&self, _: &str) -> Result<Vec<AttendanceRecord>, ChannelError> {
            Ok(Vec::new())
        }
    }

    fn registry(ids: &[&str]) -> ChannelRegistry {
        ChannelRegistry::new(
            ids.iter()
                .map(|id| Arc::new(Named(ChannelId::from(*id))) as Arc<dyn ChannelAdapter>)
                .collect(),
        )
    }

    #[test]
    fn registry_is_sorted_and_unique() {
        let registry = registry(&["forum", "discord", "forum"]);
        let ids: Vec<_> = registry.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["discord", "forum"]);
    }

    #[test]
    fn selection_reports_unknown_channels() {
        let registry = registry(&["discord", "forum"]);
        let selection = registry.select(Some(&[
            ChannelId::from("forum"),
            ChannelId::from("mail"),
            ChannelId::from("forum"),
        ]));
        assert_eq!(selection.adapters.len(), 1);
        assert_eq!(selection.unknown, [ChannelId::from("mail")]);
        assert_eq!(registry.select(None).adapters.len(), 2);
    }
}
