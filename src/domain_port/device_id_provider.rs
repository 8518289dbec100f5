use crate::domain_port::StoreError;

#[async_trait::async_trait]
pub trait DeviceIdProvider: Send + Sync {
    /// Stable identifier of this client installation.
    async fn device_id(&self) -> Result<String, StoreError>;
}
