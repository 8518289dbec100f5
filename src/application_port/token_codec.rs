use crate::domain_model::DecodedClaims;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token is missing the {0} claim")]
    MissingClaim(&'static str),
    #[error("token expiry out of range: {0}")]
    InvalidExpiry(f64),
}

/// Reads claims out of a bearer token. Signatures are NOT verified: a successful
/// decode says nothing about authenticity.
pub trait TokenCodec: Send + Sync {
    fn decode(&self, token: &str) -> Result<DecodedClaims, DecodeError>;
}
