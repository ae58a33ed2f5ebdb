//! Distributed cache mirroring in-flight executions outside the status store.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Hash holding one field per in-flight (task, host).
pub const DOING_CACHE_NAMESPACE: &str = "fleetrun:host:doing";

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Cache of in-flight executions, keyed by namespace and field.
#[async_trait]
pub trait DoingCache: Send + Sync {
    /// Remove `key` from `namespace`. Removing a missing field succeeds.
    async fn remove_field(&self, namespace: &str, key: &str) -> Result<(), CacheError>;
}

/// Doing cache kept in process memory.
#[derive(Default)]
pub struct MemoryDoingCache {
    fields: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryDoingCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` in `namespace`.
    pub async fn set_field(&self, namespace: &str, key: &str, value: impl Into<String>) {
        self.fields
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Value under `key` in `namespace`.
    pub async fn get_field(&self, namespace: &str, key: &str) -> Option<String> {
        self.fields
            .read()
            .await
            .get(namespace)
            .and_then(|fields| fields.get(key))
            .cloned()
    }
}

#[async_trait]
impl DoingCache for MemoryDoingCache {
    async fn remove_field(&self, namespace: &str, key: &str) -> Result<(), CacheError> {
        if let Some(fields) = self.fields.write().await.get_mut(namespace) {
            fields.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_field() {
        let cache = MemoryDoingCache::new();
        cache.set_field(DOING_CACHE_NAMESPACE, "100:h1", "1700000000").await;
        cache.set_field(DOING_CACHE_NAMESPACE, "100:h2", "1700000000").await;

        cache.remove_field(DOING_CACHE_NAMESPACE, "100:h1").await.unwrap();
        cache.remove_field("other", "100:h1").await.unwrap();

        assert!(cache.get_field(DOING_CACHE_NAMESPACE, "100:h1").await.is_none());
        assert!(cache.get_field(DOING_CACHE_NAMESPACE, "100:h2").await.is_some());
    }
}
