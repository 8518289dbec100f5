use chrono::{DateTime, FixedOffset};

/// Authoritative time published by the backend.
#[async_trait::async_trait]
pub trait TimeSource: Send + Sync {
    async fn fetch_reference_time(&self) -> anyhow::Result<DateTime<FixedOffset>>;
}
