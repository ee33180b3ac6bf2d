//! Hot-swappable configuration.
//!
//! `ConfigStore<T>` hands out `Arc<T>` snapshots, so callers that fan out
//! long-running external calls (channel requests, attendance polls) never
//! hold a lock while they wait. A reload swaps the snapshot; work already in
//! flight finishes against the snapshot it started with.

use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ConfigStore<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub async fn update(&self, value: T) {
        *self.current.write().await = Arc::new(value);
    }

    pub async fn current(&self) -> Arc<T> {
        Arc::clone(&*self.current.read().await)
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_updates_and_old_snapshots_survive() {
        let store = ConfigStore::new(vec!["a"]);
        let shared = store.clone();
        let before = store.current().await;

        shared.update(vec!["a", "b"]).await;

        assert_eq!(*before, vec!["a"]);
        assert_eq!(*store.current().await, vec!["a", "b"]);
    }
}
