//! In-memory slot holding the resolved key for the lifetime of the process.

use tokio::sync::RwLock;

use crate::key::LocalStorageKey;

/// Single-slot cache of the last resolved [`LocalStorageKey`].
///
/// Only keys that were just read from, or durably written to, the keystore
/// are stored here. Once populated the slot is authoritative and no further
/// keystore reads happen until the process restarts.
#[derive(Debug, Default)]
pub struct ProcessKeyCache {
    slot: RwLock<Option<LocalStorageKey>>,
}

impl ProcessKeyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the cached key, if any.
    pub async fn read(&self) -> Option<LocalStorageKey> {
        self.slot.read().await.clone()
    }

    /// Stores `key`, replacing any previous value.
    pub async fn write(&self, key: LocalStorageKey) {
        *self.slot.write().await = Some(key);
    }

    /// Empties the slot so the next acquisition goes back to the keystore.
    pub async fn clear(&self) {
        self.slot.write().await.take();
    }

    /// Whether a key is cached.
    pub async fn is_populated(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_lifecycle() {
        let cache = ProcessKeyCache::new();
        assert!(cache.read().await.is_none());
        assert!(!cache.is_populated().await);

        let key = LocalStorageKey::new("K1".to_string());
        cache.write(key.clone()).await;
        assert_eq!(cache.read().await, Some(key));
        assert!(cache.is_populated().await);

        cache.clear().await;
        assert!(cache.read().await.is_none());
    }

    #[tokio::test]
    async fn test_write_replaces() {
        let cache = ProcessKeyCache::new();
        cache.write(LocalStorageKey::new("K1".to_string())).await;
        cache.write(LocalStorageKey::new("K2".to_string())).await;
        assert_eq!(
            cache.read().await.map(|k| k.expose().to_string()),
            Some("K2".to_string())
        );
    }
}
