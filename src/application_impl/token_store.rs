use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Accessor for the four persisted session fields. No policy lives here.
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        TokenStore { kv }
    }

    pub async fn get(&self, field: TokenField) -> Result<Option<String>, StoreError> {
        self.kv.get(field.key()).await
    }

    /// Persisted expiry as an instant. A value that no longer parses reads as absent.
    pub async fn get_expiry(&self, field: TokenField) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.get(field).await? else {
            return Ok(None);
        };
        match parse_datetime(&raw) {
            Ok(at) => Ok(Some(at)),
            Err(e) => {
                tracing::warn!("ignoring unparseable {}: {}", field, e);
                Ok(None)
            }
        }
    }

    pub async fn load(&self) -> Result<TokenPair, StoreError> {
        Ok(TokenPair {
            access_token: self.get(TokenField::AccessToken).await?.map(AccessToken),
            refresh_token: self.get(TokenField::RefreshToken).await?.map(RefreshToken),
            access_token_expiry: self.get_expiry(TokenField::AccessTokenExpiry).await?,
            refresh_token_expiry: self.get_expiry(TokenField::RefreshTokenExpiry).await?,
        })
    }

    /// Persists every present, non-empty field in one batch; absent fields are left
    /// untouched. Expiries are normalized to canonical ISO strings first, so an
    /// unparseable expiry fails the whole call before anything is written.
    pub async fn set_pair(&self, update: TokenPairUpdate) -> Result<(), StoreError> {
        self.set_pair_clearing(update, &[]).await
    }

    /// `set_pair` that also removes `cleared` in the same batch. A field both set and
    /// cleared is set.
    pub async fn set_pair_clearing(
        &self,
        update: TokenPairUpdate,
        cleared: &[TokenField],
    ) -> Result<(), StoreError> {
        let mut entries: Vec<(&str, String)> = Vec::with_capacity(4);

        if let Some(token) = update.access_token.filter(|t| !t.is_empty()) {
            entries.push((TokenField::AccessToken.key(), token));
        }
        if let Some(token) = update.refresh_token.filter(|t| !t.is_empty()) {
            entries.push((TokenField::RefreshToken.key(), token));
        }
        if let Some(expiry) = update.access_token_expiry.filter(|e| !e.is_blank()) {
            entries.push((
                TokenField::AccessTokenExpiry.key(),
                Self::canonical_expiry(TokenField::AccessTokenExpiry, &expiry)?,
            ));
        }
        if let Some(expiry) = update.refresh_token_expiry.filter(|e| !e.is_blank()) {
            entries.push((
                TokenField::RefreshTokenExpiry.key(),
                Self::canonical_expiry(TokenField::RefreshTokenExpiry, &expiry)?,
            ));
        }

        let removed: Vec<&str> = cleared
            .iter()
            .map(|field| field.key())
            .filter(|key| entries.iter().all(|(set, _)| set != key))
            .collect();

        if entries.is_empty() && removed.is_empty() {
            return Ok(());
        }
        self.kv.apply_batch(&entries, &removed).await
    }

    /// Removes all four fields. Never fails: backend errors are logged.
    pub async fn clear(&self) {
        match self.kv.remove_all(&TokenField::ALL.map(TokenField::key)).await {
            Ok(()) => tracing::info!("all tokens cleared"),
            Err(e) => tracing::error!("failed to clear tokens: {}", e),
        }
    }

    fn canonical_expiry(field: TokenField, expiry: &ExpiryValue) -> Result<String, StoreError> {
        expiry
            .normalize()
            .map(|at| canonical_iso(&at))
            .map_err(|e| StoreError::InvalidExpiry {
                field: field.key(),
                reason: e.to_string(),
            })
    }
}
