use crate::application_impl::TokenStore;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tokens closer than this to their persisted expiry are refreshed.
    pub near_expiry_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            near_expiry_threshold: Duration::seconds(60),
        }
    }
}

type RefreshOutcome = Result<AccessToken, SessionError>;

/// A login or refresh result ready to persist.
struct CompletedUpdate {
    access_token: AccessToken,
    update: TokenPairUpdate,
    stale: Vec<TokenField>,
}

/// `waiters` is non-empty only while `in_flight` is set, and is drained in the same
/// critical section that clears the flag.
#[derive(Default)]
struct RefreshCoordination {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

struct SessionInner {
    store: TokenStore,
    codec: Arc<dyn TokenCodec>,
    transport: Arc<dyn RefreshTransport>,
    device_id: Arc<dyn DeviceIdProvider>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    coordination: Mutex<RefreshCoordination>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owns the refresh policy for one application instance. Clones share the same
/// coordination state, so at most one refresh call is ever outstanding across them.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

/// Settles every waiter exactly once, even if the refresh task is dropped or panics
/// before producing an outcome.
struct InFlightRefresh {
    inner: Arc<SessionInner>,
    settled: bool,
}

impl InFlightRefresh {
    fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.inner.settle(outcome);
    }
}

impl Drop for InFlightRefresh {
    fn drop(&mut self) {
        if !self.settled {
            tracing::error!("token refresh abandoned before completion");
            self.inner.settle(Err(SessionError::InternalError(
                "token refresh abandoned".to_string(),
            )));
        }
    }
}

impl SessionManager {
    pub fn new(
        store: TokenStore,
        codec: Arc<dyn TokenCodec>,
        transport: Arc<dyn RefreshTransport>,
        device_id: Arc<dyn DeviceIdProvider>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                store,
                codec,
                transport,
                device_id,
                clock,
                config,
                coordination: Mutex::new(RefreshCoordination::default()),
                events,
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_coordination().in_flight
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }
}

impl SessionInner {
    fn lock_coordination(&self) -> MutexGuard<'_, RefreshCoordination> {
        self.coordination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn is_token_valid(&self, token: &str) -> bool {
        match self.codec.decode(token) {
            Ok(claims) => {
                let now = self.clock.now();
                claims.expiry.with_timezone(now.offset()) > now
            }
            Err(e) => {
                tracing::warn!("error decoding token: {}", e);
                false
            }
        }
    }

    async fn is_token_near_expiry(&self) -> bool {
        match self.store.get_expiry(TokenField::AccessTokenExpiry).await {
            Ok(Some(expiry)) => expiry - self.now() < self.config.near_expiry_threshold,
            Ok(None) => true,
            Err(e) => {
                tracing::error!("failed to read access token expiry: {}", e);
                true
            }
        }
    }

    /// The issuer's expiry wins; without one, the new token's own claim stands in so
    /// that each token and its expiry are always written together. A refresh token
    /// whose expiry cannot be derived comes back with `RefreshTokenExpiry` marked stale.
    fn complete_update(&self, mut update: TokenPairUpdate) -> Result<CompletedUpdate, SessionError> {
        let access_token = update
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SessionError::MalformedResponse("missing access_token".to_string()))?;

        if update.access_token_expiry.as_ref().is_none_or(|e| e.is_blank()) {
            let claims = self.codec.decode(&access_token).map_err(|e| {
                SessionError::MalformedResponse(format!("missing access_token_expiry ({})", e))
            })?;
            update.access_token_expiry = Some(ExpiryValue::from(claims.expiry));
        }

        let mut stale = Vec::new();
        if let Some(refresh_token) = update.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            if update.refresh_token_expiry.as_ref().is_none_or(|e| e.is_blank()) {
                match self.codec.decode(refresh_token) {
                    Ok(claims) => {
                        update.refresh_token_expiry = Some(ExpiryValue::from(claims.expiry))
                    }
                    Err(e) => {
                        tracing::warn!("refresh token expiry unknown, dropping the stored one: {}", e);
                        stale.push(TokenField::RefreshTokenExpiry);
                    }
                }
            }
        }

        Ok(CompletedUpdate {
            access_token: AccessToken(access_token),
            update,
            stale,
        })
    }

    async fn persist(&self, completed: &CompletedUpdate) -> Result<(), SessionError> {
        self.store
            .set_pair_clearing(completed.update.clone(), &completed.stale)
            .await
            .map_err(|e| match e {
                StoreError::InvalidExpiry { .. } => SessionError::MalformedResponse(e.to_string()),
                other => other.into(),
            })
    }

    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let refresh_token = self
            .store
            .get(TokenField::RefreshToken)
            .await?
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NoSession)?;
        let device_id = self.device_id.device_id().await?;

        let response = self
            .transport
            .refresh(&RefreshRequest {
                refresh_token,
                device_id,
            })
            .await?;

        let completed = self.complete_update(TokenPairUpdate {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            access_token_expiry: response.access_token_expiry,
            refresh_token_expiry: response.refresh_token_expiry,
        })?;
        self.persist(&completed).await?;

        Ok(completed.access_token)
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        match self.exchange_refresh_token().await {
            Ok(token) => {
                tracing::info!("access token refreshed");
                self.emit(SessionEvent::Refreshed);
                Ok(token)
            }
            Err(e) => {
                tracing::error!("error refreshing token: {}", e);
                self.store.clear().await;
                self.emit(SessionEvent::Cleared(ClearReason::RefreshFailed));
                Err(e)
            }
        }
    }

    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = {
            let mut coordination = self.lock_coordination();
            coordination.in_flight = false;
            std::mem::take(&mut coordination.waiters)
        };
        tracing::debug!("settling {} refresh waiter(s)", waiters.len());
        for waiter in waiters {
            // a waiter whose caller went away is simply skipped
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[async_trait::async_trait]
impl SessionService for SessionManager {
    fn is_token_valid(&self, token: &str) -> bool {
        self.inner.is_token_valid(token)
    }

    async fn is_token_near_expiry(&self) -> bool {
        self.inner.is_token_near_expiry().await
    }

    async fn refresh_access_token(&self) -> Result<AccessToken, SessionError> {
        let (sender, receiver) = oneshot::channel();

        // check-and-set without any await in between
        let leader = {
            let mut coordination = self.inner.lock_coordination();
            let leader = !coordination.in_flight;
            coordination.in_flight = true;
            coordination.waiters.push(sender);
            leader
        };

        if leader {
            let in_flight = InFlightRefresh {
                inner: self.inner.clone(),
                settled: false,
            };
            // detached: dropping the caller's future must not cancel the refresh
            tokio::spawn(async move {
                let outcome = in_flight.inner.perform_refresh().await;
                in_flight.settle(outcome);
            });
        } else {
            tracing::warn!("token refresh already in progress");
        }

        receiver.await.map_err(|_| {
            SessionError::InternalError("token refresh finished without a result".to_string())
        })?
    }

    async fn validate_and_refresh_token(&self) -> Result<AccessToken, SessionError> {
        let access_token = match self.inner.store.get(TokenField::AccessToken).await? {
            Some(token) if !token.is_empty() => token,
            _ => {
                tracing::error!("access token is missing");
                self.inner.store.clear().await;
                self.inner
                    .emit(SessionEvent::Cleared(ClearReason::MissingAccessToken));
                return Err(SessionError::NoSession);
            }
        };

        if self.inner.is_token_valid(&access_token) {
            if !self.inner.is_token_near_expiry().await {
                tracing::debug!("token is valid with sufficient time remaining, no refresh needed");
                return Ok(AccessToken(access_token));
            }
            tracing::info!("token near expiry, refreshing");
        } else {
            tracing::warn!("access token is expired or invalid, refresh required");
        }

        self.refresh_access_token().await
    }

    async fn logout(&self) {
        self.inner.store.clear().await;
        self.inner.emit(SessionEvent::Cleared(ClearReason::LoggedOut));
        tracing::info!("logged out");
    }

    async fn start_session(&self, tokens: TokenPairUpdate) -> Result<(), SessionError> {
        let completed = self.inner.complete_update(tokens)?;
        self.inner.persist(&completed).await?;
        self.inner.emit(SessionEvent::Established);
        tracing::info!("session established");
        Ok(())
    }

    async fn access_token(&self) -> Option<AccessToken> {
        match self.inner.store.get(TokenField::AccessToken).await {
            Ok(token) => token.map(AccessToken),
            Err(e) => {
                tracing::error!("failed to read access token: {}", e);
                None
            }
        }
    }

    async fn refresh_token(&self) -> Option<RefreshToken> {
        match self.inner.store.get(TokenField::RefreshToken).await {
            Ok(token) => token.map(RefreshToken),
            Err(e) => {
                tracing::error!("failed to read refresh token: {}", e);
                None
            }
        }
    }

    async fn token_expiry(&self, field: TokenField) -> Option<DateTime<Utc>> {
        match self.inner.store.get_expiry(field).await {
            Ok(expiry) => expiry,
            Err(e) => {
                tracing::error!("failed to read {}: {}", field, e);
                None
            }
        }
    }

    async fn state(&self) -> SessionState {
        if self.is_refreshing() {
            return SessionState::Refreshing;
        }
        let Some(token) = self.access_token().await else {
            return SessionState::NoSession;
        };
        if !self.inner.is_token_valid(token.as_str()) {
            SessionState::Expired
        } else if self.inner.is_token_near_expiry().await {
            SessionState::NearExpiry
        } else {
            SessionState::Valid
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use crate::infra_memory::MemoryKeyValueStore;
    use chrono::{FixedOffset, TimeZone};

    struct Harness {
        clock: Arc<ManualClock>,
        transport: Arc<FakeRefreshTransport>,
        kv: Arc<MemoryKeyValueStore>,
        manager: SessionManager,
    }

    fn harness() -> Harness {
        let start = Utc.with_ymd_and_hms(2025, 2, 9, 10, 0, 0).unwrap();
        let offset = FixedOffset::east_opt(12_600).unwrap();
        let clock = Arc::new(ManualClock::new(start, offset));
        let transport = Arc::new(FakeRefreshTransport::new(clock.clone()));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let manager = SessionManager::new(
            TokenStore::new(kv.clone()),
            Arc::new(JwtClaimsDecoder::new()),
            transport.clone(),
            Arc::new(FixedDeviceId("device-1".to_string())),
            clock.clone(),
            SessionConfig::default(),
        );
        Harness {
            clock,
            transport,
            kv,
            manager,
        }
    }

    impl Harness {
        fn now(&self) -> DateTime<Utc> {
            self.clock.now().with_timezone(&Utc)
        }

        async fn login(&self, access_ttl: Duration) -> String {
            let access_exp = self.now() + access_ttl;
            let access = mint_token("user-1", access_exp).unwrap();
            let refresh = mint_token("user-1", self.now() + Duration::days(7)).unwrap();
            self.manager
                .start_session(TokenPairUpdate {
                    access_token: Some(access.clone()),
                    refresh_token: Some(refresh),
                    access_token_expiry: Some(ExpiryValue::from(access_exp.timestamp())),
                    refresh_token_expiry: None,
                })
                .await
                .unwrap();
            access
        }
    }

    struct StaticTransport(RefreshResponse);

    #[async_trait::async_trait]
    impl RefreshTransport for StaticTransport {
        async fn refresh(&self, _: &RefreshRequest) -> Result<RefreshResponse, TransportError> {
            Ok(self.0.clone())
        }
    }

    fn manager_with_transport(h: &Harness, transport: Arc<dyn RefreshTransport>) -> SessionManager {
        SessionManager::new(
            TokenStore::new(h.kv.clone()),
            Arc::new(JwtClaimsDecoder::new()),
            transport,
            Arc::new(FixedDeviceId("device-1".to_string())),
            h.clock.clone(),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn validity_is_strictly_after_now() {
        let h = harness();
        let exact = mint_token("u", h.now()).unwrap();
        let later = mint_token("u", h.now() + Duration::seconds(1)).unwrap();
        assert!(!h.manager.is_token_valid(&exact));
        assert!(h.manager.is_token_valid(&later));
        assert!(!h.manager.is_token_valid("not.a.token"));
        assert!(!h.manager.is_token_valid(""));
    }

    #[tokio::test]
    async fn near_expiry_uses_the_persisted_expiry() {
        let h = harness();
        assert!(h.manager.is_token_near_expiry().await);

        h.login(Duration::minutes(10)).await;
        assert!(!h.manager.is_token_near_expiry().await);
        assert!(!h.manager.is_token_near_expiry().await);

        h.clock.advance(Duration::minutes(9) + Duration::seconds(1));
        assert!(h.manager.is_token_near_expiry().await);

        // stored expiry diverging from the claim: the stored one decides
        h.kv.set("access_token_expiry", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        h.clock.set(Utc.with_ymd_and_hms(2025, 2, 9, 10, 0, 0).unwrap());
        assert!(h.manager.is_token_near_expiry().await);
    }

    #[tokio::test]
    async fn state_follows_the_store_and_clock() {
        let h = harness();
        assert_eq!(h.manager.state().await, SessionState::NoSession);

        h.login(Duration::minutes(10)).await;
        assert_eq!(h.manager.state().await, SessionState::Valid);

        h.clock.advance(Duration::minutes(9) + Duration::seconds(30));
        assert_eq!(h.manager.state().await, SessionState::NearExpiry);

        h.clock.advance(Duration::minutes(1));
        assert_eq!(h.manager.state().await, SessionState::Expired);
    }

    #[tokio::test]
    async fn start_session_derives_missing_expiry_from_claim() {
        let h = harness();
        let exp = h.now() + Duration::minutes(5);
        let access = mint_token("u", exp).unwrap();
        h.manager
            .start_session(TokenPairUpdate {
                access_token: Some(access),
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = h.manager.token_expiry(TokenField::AccessTokenExpiry).await;
        assert_eq!(stored.map(|at| at.timestamp()), Some(exp.timestamp()));
    }

    #[tokio::test]
    async fn start_session_requires_an_access_token() {
        let h = harness();
        let result = h.manager.start_session(TokenPairUpdate::default()).await;
        assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_without_network() {
        let h = harness();
        h.kv.set("access_token", "stale").await.unwrap();

        let result = h.manager.refresh_access_token().await;
        assert!(matches!(result, Err(SessionError::NoSession)));
        assert_eq!(h.transport.calls(), 0);
        assert!(h.kv.is_empty().await);
    }

    #[tokio::test]
    async fn refresh_sends_refresh_token_and_device_id() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        let refresh = h.manager.refresh_token().await.unwrap();

        let token = h.manager.refresh_access_token().await.unwrap();

        let request = h.transport.last_request().unwrap();
        assert_eq!(request.refresh_token, refresh.0);
        assert_eq!(request.device_id, "device-1");
        assert_eq!(h.manager.access_token().await, Some(token));
        assert!(!h.manager.is_token_near_expiry().await);
        assert!(!h.manager.is_refreshing());
    }

    #[tokio::test]
    async fn response_without_access_token_is_malformed() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        let manager = manager_with_transport(
            &h,
            Arc::new(StaticTransport(RefreshResponse {
                refresh_token: Some("r2".to_string()),
                ..Default::default()
            })),
        );

        let result = manager.refresh_access_token().await;
        assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
        assert!(h.kv.is_empty().await);
    }

    #[tokio::test]
    async fn rotated_refresh_token_takes_its_own_expiry() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        let old_expiry = h.manager.token_expiry(TokenField::RefreshTokenExpiry).await;
        let refresh_exp = h.now() + Duration::days(30);
        let access = mint_token("u", h.now() + Duration::minutes(20)).unwrap();
        let refresh = mint_token("u", refresh_exp).unwrap();
        let manager = manager_with_transport(
            &h,
            Arc::new(StaticTransport(RefreshResponse {
                access_token: Some(access),
                refresh_token: Some(refresh.clone()),
                ..Default::default()
            })),
        );

        manager.refresh_access_token().await.unwrap();

        assert_eq!(manager.refresh_token().await.unwrap().as_str(), refresh);
        let stored = manager.token_expiry(TokenField::RefreshTokenExpiry).await;
        assert_ne!(stored, old_expiry);
        assert_eq!(stored.map(|at| at.timestamp()), Some(refresh_exp.timestamp()));
    }

    #[tokio::test]
    async fn opaque_refresh_token_drops_the_stale_expiry() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        assert!(h.manager.token_expiry(TokenField::RefreshTokenExpiry).await.is_some());
        let access = mint_token("u", h.now() + Duration::minutes(20)).unwrap();
        let manager = manager_with_transport(
            &h,
            Arc::new(StaticTransport(RefreshResponse {
                access_token: Some(access),
                refresh_token: Some("opaque-refresh".to_string()),
                ..Default::default()
            })),
        );

        manager.refresh_access_token().await.unwrap();

        assert_eq!(manager.refresh_token().await.unwrap().as_str(), "opaque-refresh");
        assert_eq!(manager.token_expiry(TokenField::RefreshTokenExpiry).await, None);
        assert!(h.kv.get("refresh_token_expiry").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unparseable_expiry_is_malformed_and_clears() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        let access = mint_token("u", h.now() + Duration::minutes(20)).unwrap();
        let manager = manager_with_transport(
            &h,
            Arc::new(StaticTransport(RefreshResponse {
                access_token: Some(access),
                access_token_expiry: Some(ExpiryValue::from("whenever")),
                ..Default::default()
            })),
        );

        let result = manager.refresh_access_token().await;
        assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
        assert_eq!(manager.access_token().await, None);
    }

    #[tokio::test]
    async fn failure_is_broadcast_identically() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        h.transport.set_delay(Some(std::time::Duration::from_millis(20)));
        h.transport.fail_with(Some(TransportError::Status {
            status: 401,
            body: "Refresh token has expired.".to_string(),
        }));

        let (a, b, c) = tokio::join!(
            h.manager.refresh_access_token(),
            h.manager.refresh_access_token(),
            h.manager.refresh_access_token(),
        );

        assert_eq!(h.transport.calls(), 1);
        let messages: Vec<String> = [a, b, c]
            .into_iter()
            .map(|r| r.unwrap_err().to_string())
            .collect();
        assert!(messages.iter().all(|m| m == &messages[0]));
        assert!(messages[0].contains("Refresh token has expired."));
        assert_eq!(h.manager.state().await, SessionState::NoSession);
    }

    #[tokio::test]
    async fn dropped_leader_does_not_cancel_the_refresh() {
        let h = harness();
        h.login(Duration::seconds(30)).await;
        h.transport.set_delay(Some(std::time::Duration::from_millis(50)));

        let leader = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.refresh_access_token().await })
        };
        while h.transport.calls() == 0 {
            tokio::task::yield_now().await;
        }
        leader.abort();

        assert!(h.manager.is_refreshing());
        let token = h.manager.refresh_access_token().await.unwrap();
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.manager.access_token().await, Some(token));
    }

    #[tokio::test]
    async fn events_signal_lifecycle() {
        let h = harness();
        let mut events = h.manager.subscribe();

        h.login(Duration::seconds(30)).await;
        h.manager.refresh_access_token().await.unwrap();
        h.manager.logout().await;

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Established);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Cleared(ClearReason::LoggedOut)
        );
        assert!(h.kv.is_empty().await);
    }

    #[tokio::test]
    async fn missing_access_token_clears_and_reports_no_session() {
        let h = harness();
        h.kv.set("refresh_token", "orphan").await.unwrap();
        let mut events = h.manager.subscribe();

        let result = h.manager.validate_and_refresh_token().await;
        assert!(matches!(result, Err(SessionError::NoSession)));
        assert!(h.kv.is_empty().await);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Cleared(ClearReason::MissingAccessToken)
        );
    }
}
