use crate::domain_port::*;
use std::time::Duration;

/// `POST {refresh_token, device_id}` as JSON to the refresh endpoint.
pub struct HttpRefreshTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRefreshTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        HttpRefreshTransport {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Servers answer failures with `{"message": ...}`; fall back to the raw body.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or_else(|| body.to_owned())
    }
}

#[async_trait::async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: Self::error_message(&body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
