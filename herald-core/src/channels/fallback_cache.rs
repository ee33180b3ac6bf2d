//! Local `(event, channel) -> message id` lookup of last resort.
//!
//! Older deployments tracked posted messages only in a local JSON file.
//! Entries are read when an event's stored publication map is empty and are
//! removed once the event is deleted; the database stays authoritative.

use herald_sdk::objects::ChannelId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

type CacheEntries = BTreeMap<Uuid, BTreeMap<ChannelId, String>>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct MessageIdCache {
    path: Option<PathBuf>,
    entries: Mutex<CacheEntries>,
}

impl MessageIdCache {
    /// Load the cache file. A missing file is an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<CacheEntries>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No fallback cache file, starting empty");
                CacheEntries::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            events = entries.len(),
            "Loaded fallback message id cache"
        );
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A cache that is never written to disk.
    pub fn in_memory(entries: impl IntoIterator<Item = (Uuid, ChannelId, String)>) -> Self {
        let mut map = CacheEntries::new();
        for (event_id, channel_id, message_id) in entries {
            map.entry(event_id).or_default().insert(channel_id, message_id);
        }
        Self {
            path: None,
            entries: Mutex::new(map),
        }
    }

    pub async fn lookup(&self, event_id: Uuid, channel_id: &ChannelId) -> Option<String> {
        self.entries
            .lock()
            .await
            .get(&event_id)
            .and_then(|channels| channels.get(channel_id))
            .cloned()
    }

    /// Remove every entry of an event and persist the result.
    pub async fn evict(&self, event_id: Uuid) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(&event_id).is_none() {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            // Write a sibling file first so a crash never leaves a truncated cache.
            let raw = serde_json::to_vec_pretty(&*entries)?;
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, raw).await?;
            tokio::fs::rename(&tmp, path).await?;
        }
        debug!(event_id = %event_id, "Evicted fallback cache entries");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evict_rewrites_file() {
        let dir = std::env::temp_dir().join(format!("herald-cache-{}", Uuid::now_v7()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("messages.json");
        let kept = Uuid::now_v7();
        let evicted = Uuid::now_v7();
        let raw = serde_json::json!({
            kept.to_string(): { "discord": "111" },
            evicted.to_string(): { "discord": "222", "forum": "333" },
        });
        tokio::fs::write(&path, raw.to_string()).await.unwrap();

        let cache = MessageIdCache::load(&path).await.unwrap();
        assert_eq!(
            cache.lookup(evicted, &ChannelId::from("forum")).await,
            Some("333".to_string())
        );
        assert!(cache.evict(evicted).await.unwrap());
        assert!(!cache.evict(evicted).await.unwrap());

        let reloaded = MessageIdCache::load(&path).await.unwrap();
        assert_eq!(reloaded.lookup(evicted, &ChannelId::from("forum")).await, None);
        assert_eq!(
            reloaded.lookup(kept, &ChannelId::from("discord")).await,
            Some("111".to_string())
        );
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_empty_cache() {
        let path = std::env::temp_dir().join(format!("herald-missing-{}.json", Uuid::now_v7()));
        let cache = MessageIdCache::load(path).await.unwrap();
        assert_eq!(cache.lookup(Uuid::now_v7(), &ChannelId::from("discord")).await, None);
    }
}
