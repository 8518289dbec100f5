use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Redis-backed store; every key lives under `prefix:`. Batches go out as one
/// `MULTI`/`EXEC` pipeline of `MSET` and `DEL`.
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisKeyValueStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisKeyValueStore {
            conn,
            prefix: prefix.into(),
        }
    }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(conn, prefix))
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let val: Option<String> = conn
            .get(self.key(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(val)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(self.key(key), value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.key(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn apply_batch(&self, set: &[(&str, String)], remove: &[&str]) -> Result<(), StoreError> {
        if set.is_empty() && remove.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !set.is_empty() {
            let items: Vec<(String, &str)> = set
                .iter()
                .map(|(key, value)| (self.key(key), value.as_str()))
                .collect();
            pipe.mset(&items).ignore();
        }
        if !remove.is_empty() {
            let keys: Vec<String> = remove.iter().map(|key| self.key(key)).collect();
            pipe.del(keys).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
