use crate::domain_model::ExpiryValue;
use crate::domain_port::*;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const FAKE_SIGNING_KEY: &[u8] = b"fake-issuer-signing-key";

#[derive(Serialize)]
struct FakeClaims<'a> {
    sub: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
}

/// Signs a JWT the way an issuer would. Clients never see this key; the decoder
/// does not need it.
pub fn mint_token(subject: &str, expiry: DateTime<Utc>) -> jsonwebtoken::errors::Result<String> {
    let claims = FakeClaims {
        sub: subject,
        exp: expiry.timestamp(),
        iat: Utc::now().timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(FAKE_SIGNING_KEY),
    )
}

/// In-process stand-in for the refresh endpoint. Counts calls and can be told to
/// stall or fail, which is what the coalescing tests need.
pub struct FakeRefreshTransport {
    clock: Arc<dyn Clock>,
    subject: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    delay: Mutex<Option<std::time::Duration>>,
    failure: Mutex<Option<TransportError>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<RefreshRequest>>,
}

impl FakeRefreshTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            subject: "fake-user".to_string(),
            access_ttl: Duration::minutes(20),
            refresh_ttl: Duration::days(7),
            delay: Mutex::new(None),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn set_delay(&self, delay: Option<std::time::Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn fail_with(&self, error: Option<TransportError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RefreshRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// Minimal fake: every non-empty refresh token is accepted.
#[async_trait::async_trait]
impl RefreshTransport for FakeRefreshTransport {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }
        if request.refresh_token.is_empty() {
            return Err(TransportError::Status {
                status: 400,
                body: "No refresh token provided".to_string(),
            });
        }

        let now = self.clock.now().with_timezone(&Utc);
        let access_exp = now + self.access_ttl;
        let refresh_exp = now + self.refresh_ttl;
        let access_token = mint_token(&self.subject, access_exp)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let refresh_token = mint_token(&self.subject, refresh_exp)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        Ok(RefreshResponse {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            access_token_expiry: Some(ExpiryValue::from(access_exp)),
            refresh_token_expiry: Some(ExpiryValue::from(refresh_exp.timestamp())),
        })
    }
}
