#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("invalid expiry for {field}: {reason}")]
    InvalidExpiry { field: &'static str, reason: String },
}

/// Durable string-to-string medium that survives restarts.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Writes every entry.
    async fn set_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.apply_batch(entries, &[]).await
    }

    /// Removes every key.
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.apply_batch(&[], keys).await
    }

    /// Writes `set`, then removes `remove`. Backends that can do so apply the whole
    /// batch atomically.
    async fn apply_batch(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StoreError> {
        for (key, value) in set {
            self.set(key, value).await?;
        }
        for key in remove {
            self.remove(key).await?;
        }
        Ok(())
    }
}
