use crate::domain_port::*;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEVICE_ID_KEY: &str = "device_uuid";

/// Looks the installation id up in the key-value store, generating and persisting a
/// UUID v4 the first time. The value is cached for the life of the process.
pub struct StoredDeviceId {
    kv: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<String>>,
}

impl StoredDeviceId {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        StoredDeviceId {
            kv,
            cached: Mutex::new(None),
        }
    }

    #[inline]
    fn generate() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait::async_trait]
impl DeviceIdProvider for StoredDeviceId {
    async fn device_id(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.kv.get(DEVICE_ID_KEY).await? {
            Some(id) if !id.is_empty() => {
                tracing::debug!("existing device id retrieved");
                id
            }
            _ => {
                let id = Self::generate();
                self.kv.set(DEVICE_ID_KEY, &id).await?;
                tracing::info!("new device id generated: {}", id);
                id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Device id pinned by configuration.
pub struct FixedDeviceId(pub String);

#[async_trait::async_trait]
impl DeviceIdProvider for FixedDeviceId {
    async fn device_id(&self) -> Result<String, StoreError> {
        Ok(self.0.clone())
    }
}
