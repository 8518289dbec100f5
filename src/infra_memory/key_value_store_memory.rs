use crate::domain_port::*;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Batches are applied under one write lock, so readers never
/// observe half of a batch.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn apply_batch(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StoreError> {
        let mut guard = self.entries.write().await;
        for (key, value) in set {
            guard.insert((*key).to_owned(), value.clone());
        }
        for key in remove {
            guard.remove(*key);
        }
        Ok(())
    }
}
