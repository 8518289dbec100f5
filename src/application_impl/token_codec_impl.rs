use crate::application_port::{DecodeError, TokenCodec};
use crate::domain_model::DecodedClaims;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    sub: Option<serde_json::Value>,
    /// NumericDate; fractional seconds are allowed.
    #[serde(default)]
    exp: Option<f64>,
}

/// `TokenCodec` over JWTs that trusts the issuer: the header must parse and the
/// payload must carry `sub` and `exp`, the signature segment is never looked at.
#[derive(Debug, Default)]
pub struct JwtClaimsDecoder;

impl JwtClaimsDecoder {
    pub fn new() -> Self {
        JwtClaimsDecoder
    }

    // `jsonwebtoken::decode` re-reads `sub` as a string during validation and fails on
    // object subjects, so only the header goes through it.
    fn payload(token: &str) -> Result<UnverifiedClaims, DecodeError> {
        jsonwebtoken::decode_header(token).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(DecodeError::Malformed("expected three segments".to_string())),
        };
        let raw = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| DecodeError::Malformed(format!("payload: {}", e)))?;

        serde_json::from_slice(&raw).map_err(|e| DecodeError::Malformed(format!("claims: {}", e)))
    }

    fn numeric_date(secs: f64) -> Result<DateTime<Utc>, DecodeError> {
        let millis = (secs * 1000.0).round();
        if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
            return Err(DecodeError::InvalidExpiry(secs));
        }
        DateTime::from_timestamp_millis(millis as i64).ok_or(DecodeError::InvalidExpiry(secs))
    }

    #[inline]
    fn render_subject(sub: serde_json::Value) -> Option<String> {
        match sub {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

impl TokenCodec for JwtClaimsDecoder {
    fn decode(&self, token: &str) -> Result<DecodedClaims, DecodeError> {
        let claims = Self::payload(token)?;

        let subject = claims
            .sub
            .and_then(Self::render_subject)
            .ok_or(DecodeError::MissingClaim("sub"))?;
        let exp = claims.exp.ok_or(DecodeError::MissingClaim("exp"))?;
        let expiry = Self::numeric_date(exp)?;

        Ok(DecodedClaims { subject, expiry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use serde_json::json;

    fn sign(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"issuer-only-secret"),
        )
        .unwrap()
    }

    #[test]
    fn decodes_without_knowing_the_key() {
        let token = sign(json!({ "sub": "42", "exp": 1_700_000_000 }));
        let claims = JwtClaimsDecoder::new().decode(&token).unwrap();
        assert_eq!(claims.subject, "42");
        assert_eq!(claims.expiry.timestamp(), 1_700_000_000);
    }

    #[test]
    fn expired_tokens_still_decode() {
        let token = sign(json!({ "sub": "old", "exp": 1 }));
        let claims = JwtClaimsDecoder::new().decode(&token).unwrap();
        assert_eq!(claims.expiry.timestamp(), 1);
    }

    #[test]
    fn fractional_expiry_is_accepted() {
        let token = sign(json!({ "sub": "u", "exp": 4_102_444_800.5 }));
        let claims = JwtClaimsDecoder::new().decode(&token).unwrap();
        assert_eq!(claims.expiry.timestamp_millis(), 4_102_444_800_500);
    }

    #[test]
    fn non_numeric_expiry_is_malformed() {
        let token = sign(json!({ "sub": "u", "exp": "tomorrow" }));
        assert!(matches!(
            JwtClaimsDecoder::new().decode(&token),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn object_subjects_are_rendered_as_json() {
        let token = sign(json!({ "sub": { "id": 7 }, "exp": 1_700_000_000 }));
        let claims = JwtClaimsDecoder::new().decode(&token).unwrap();
        assert_eq!(claims.subject, r#"{"id":7}"#);
    }

    #[test]
    fn missing_claims_fail() {
        let decoder = JwtClaimsDecoder::new();

        let no_exp = sign(json!({ "sub": "42" }));
        assert_eq!(decoder.decode(&no_exp), Err(DecodeError::MissingClaim("exp")));

        let no_sub = sign(json!({ "exp": 1_700_000_000 }));
        assert_eq!(decoder.decode(&no_sub), Err(DecodeError::MissingClaim("sub")));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let decoder = JwtClaimsDecoder::new();
        for token in ["", "not-a-jwt", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.bm90LWpzb24.sig"] {
            assert!(
                matches!(decoder.decode(token), Err(DecodeError::Malformed(_))),
                "{token:?} should not decode"
            );
        }
    }
}
