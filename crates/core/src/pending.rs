use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::conversation::{ConversationKey, PendingAuthorization};

/// Conversations paused while the user completes OAuth consent.
///
/// One entry per key; a later insert for the same key replaces the earlier
/// one. The store lives for the process lifetime and is never persisted.
#[derive(Debug, Default)]
pub struct PendingAuthorizationStore {
    entries: RwLock<HashMap<ConversationKey, PendingAuthorization>>,
}

impl PendingAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry this insert replaced, if any.
    pub async fn insert(&self, pending: PendingAuthorization) -> Option<PendingAuthorization> {
        let mut entries = self.entries.write().await;
        entries.insert(pending.conversation_key.clone(), pending)
    }

    pub async fn contains(&self, key: &ConversationKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn get(&self, key: &ConversationKey) -> Option<PendingAuthorization> {
        self.entries.read().await.get(key).cloned()
    }

    /// Reads and removes the entry in one step.
    pub async fn pop(&self, key: &ConversationKey) -> Option<PendingAuthorization> {
        self.entries.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every entry created more than `ttl` before `now` and returns
    /// how many were removed.
    pub async fn evict_older_than(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_older_than(now, ttl));
        before - entries.len()
    }

    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }
}

/// Periodically sweeps expired entries until the returned handle is aborted.
pub fn spawn_eviction(
    store: Arc<PendingAuthorizationStore>,
    ttl: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.evict_older_than(Utc::now(), ttl).await;
            if evicted > 0 {
                info!(
                    event_name = "pending.evicted",
                    evicted,
                    ttl_secs = ttl.num_seconds(),
                    "evicted expired pending authorizations"
                );
            } else {
                debug!(event_name = "pending.sweep", "no expired pending authorizations");
            }
        }
    })
}
