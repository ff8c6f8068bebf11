//! Response cache for catalog lookups.
//!
//! Values are stored as JSON so one cache can hold every response type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Storage for successful catalog responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Fresh value stored under `key`, if any.
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Store `value` under `key` for `ttl`.
    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration);
}

/// Build a cache key from an operation name, the freshness window and the
/// call arguments.
pub fn cache_key(operation: &str, hours: u64, args: &str) -> String {
    format!("{}-hours-{}-{}", operation, hours, args)
}

/// Process-local cache with per-entry expiry.
#[derive(Debug, Default, Clone)]
pub struct MemoryResponseCache {
    entries: Arc<RwLock<HashMap<String, (serde_json::Value, Instant)>>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, (_, expires_at)| *expires_at > now);
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
    }
}
