use crate::domain_port::TimeSource;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ReferenceTimeBody {
    #[serde(rename = "currentTime")]
    current_time: String,
}

/// `GET` the backend's `{"currentTime": "YYYY-MM-DD HH:MM:SS+HH:MM"}` endpoint.
pub struct HttpTimeSource {
    client: reqwest::Client,
    endpoint: String,
    offset: FixedOffset,
}

impl HttpTimeSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, offset: FixedOffset) -> Self {
        HttpTimeSource {
            client,
            endpoint: endpoint.into(),
            offset,
        }
    }

    /// Times without an offset are read in the reference offset.
    pub fn parse_reference_time(&self, raw: &str) -> Result<DateTime<FixedOffset>> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(at);
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(at);
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .with_context(|| format!("unrecognized reference time {:?}", raw))?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| anyhow!("ambiguous reference time {:?}", raw))
    }
}

#[async_trait::async_trait]
impl TimeSource for HttpTimeSource {
    async fn fetch_reference_time(&self) -> Result<DateTime<FixedOffset>> {
        let body: ReferenceTimeBody = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.parse_reference_time(&body.current_time)
    }
}
