use crate::domain_model::*;
use crate::domain_port::{StoreError, TransportError};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no active session, login required")]
    NoSession,
    #[error("token refresh failed: {0}")]
    Transport(String),
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Malformed(reason) => SessionError::MalformedResponse(reason),
            other => SessionError::Transport(other.to_string()),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// True iff the token decodes and its embedded expiry is strictly in the future.
    fn is_token_valid(&self, token: &str) -> bool;

    /// Compares the persisted access expiry (not the token claim) against now.
    async fn is_token_near_expiry(&self) -> bool;

    /// Refreshes the access token, sharing a single network call among concurrent callers.
    async fn refresh_access_token(&self) -> Result<AccessToken, SessionError>;

    /// Returns a usable access token, refreshing first when needed.
    async fn validate_and_refresh_token(&self) -> Result<AccessToken, SessionError>;

    /// Clears everything and emits `Cleared(LoggedOut)`.
    async fn logout(&self);

    /// Persists the pair handed out at login.
    async fn start_session(&self, tokens: TokenPairUpdate) -> Result<(), SessionError>;

    async fn access_token(&self) -> Option<AccessToken>;
    async fn refresh_token(&self) -> Option<RefreshToken>;
    async fn token_expiry(&self, field: TokenField) -> Option<DateTime<Utc>>;
    async fn state(&self) -> SessionState;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
