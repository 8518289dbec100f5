use crate::domain_model::ExpiryValue;
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_id: String,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"<redacted>")
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// Body of a successful refresh call. Every field is optional on the wire;
/// the session manager decides what is required.
#[derive(Clone, Default, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token_expiry: Option<ExpiryValue>,
    #[serde(default)]
    pub refresh_token_expiry: Option<ExpiryValue>,
}

impl std::fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("refresh rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed refresh response: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, TransportError>;
}
