use crate::domain_model::ExpiryValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken(pub String);

// Bearer tokens must never end up in logs through `{:?}`.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken(<{} bytes>)", self.0.len())
    }
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RefreshToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One of the four persisted session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenField {
    AccessToken,
    RefreshToken,
    AccessTokenExpiry,
    RefreshTokenExpiry,
}

impl TokenField {
    pub const ALL: [TokenField; 4] = [
        TokenField::AccessToken,
        TokenField::RefreshToken,
        TokenField::AccessTokenExpiry,
        TokenField::RefreshTokenExpiry,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            TokenField::AccessToken => "access_token",
            TokenField::RefreshToken => "refresh_token",
            TokenField::AccessTokenExpiry => "access_token_expiry",
            TokenField::RefreshTokenExpiry => "refresh_token_expiry",
        }
    }
}

impl fmt::Display for TokenField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Partial token pair. Absent fields are left untouched when persisted.
#[derive(Debug, Clone, Default)]
pub struct TokenPairUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token_expiry: Option<ExpiryValue>,
    pub refresh_token_expiry: Option<ExpiryValue>,
}

impl TokenPairUpdate {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.access_token_expiry.is_none()
            && self.refresh_token_expiry.is_none()
    }
}

/// Snapshot of what is currently persisted.
#[derive(Debug, Clone, Default)]
pub struct TokenPair {
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<RefreshToken>,
    pub access_token_expiry: Option<DateTime<Utc>>,
    pub refresh_token_expiry: Option<DateTime<Utc>>,
}

/// Claims read out of a bearer token without checking its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    pub subject: String,
    pub expiry: DateTime<Utc>,
}
