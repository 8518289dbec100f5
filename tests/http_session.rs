use chrono::{Duration, FixedOffset, Utc};
use serde_json::json;
use std::sync::Arc;
use tokenward::application_impl::*;
use tokenward::application_port::*;
use tokenward::domain_model::*;
use tokenward::infra_http::*;
use tokenward::infra_memory::MemoryKeyValueStore;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE: &str = "laptop-42";

fn session_against(server: &MockServer) -> Arc<SessionManager> {
    let transport = HttpRefreshTransport::new(
        format!("{}/api/auth/refresh", server.uri()),
        std::time::Duration::from_secs(5),
    )
    .unwrap();
    Arc::new(SessionManager::new(
        TokenStore::new(Arc::new(MemoryKeyValueStore::new())),
        Arc::new(JwtClaimsDecoder::new()),
        Arc::new(transport),
        Arc::new(FixedDeviceId(DEVICE.to_string())),
        Arc::new(SystemClock::new(FixedOffset::east_opt(12_600).unwrap())),
        SessionConfig::default(),
    ))
}

async fn seed(session: &SessionManager, access_ttl: Duration) -> (String, String) {
    let access = mint_token("bob", Utc::now() + access_ttl).unwrap();
    let refresh = mint_token("bob", Utc::now() + Duration::days(7)).unwrap();
    session
        .start_session(TokenPairUpdate {
            access_token: Some(access.clone()),
            refresh_token: Some(refresh.clone()),
            access_token_expiry: None,
            refresh_token_expiry: None,
        })
        .await
        .unwrap();
    (access, refresh)
}

#[tokio::test]
async fn near_expiry_session_is_renewed_over_http() {
    let server = MockServer::start().await;
    let session = session_against(&server);
    let (_, refresh) = seed(&session, Duration::seconds(20)).await;

    let new_exp = Utc::now() + Duration::minutes(20);
    let new_access = mint_token("bob", new_exp).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refresh_token": refresh, "device_id": DEVICE })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Token refreshed successfully",
            "access_token": new_access,
            "refresh_token": "rotated-refresh",
            "access_token_expiry": new_exp.timestamp(),
            "refresh_token_expiry": "2031-01-01 00:00:00+03:30",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = session.validate_and_refresh_token().await.unwrap();

    assert_eq!(token.as_str(), new_access);
    assert_eq!(session.refresh_token().await.unwrap().as_str(), "rotated-refresh");
    assert_eq!(
        session
            .token_expiry(TokenField::RefreshTokenExpiry)
            .await
            .map(|at| canonical_iso(&at)),
        Some("2030-12-31T20:30:00.000Z".to_string())
    );
    assert_eq!(session.state().await, SessionState::Valid);
}

#[tokio::test]
async fn rejected_refresh_ends_the_session() {
    let server = MockServer::start().await;
    let session = session_against(&server);
    seed(&session, Duration::seconds(-5)).await;
    let mut events = session.subscribe();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Refresh token has expired.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let error = session.validate_and_refresh_token().await.unwrap_err();

    assert!(matches!(&error, SessionError::Transport(msg) if msg.contains("Refresh token has expired.")));
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Cleared(ClearReason::RefreshFailed)
    );
    assert!(session.access_token().await.is_none());
    assert_eq!(session.state().await, SessionState::NoSession);
}

#[tokio::test]
async fn bearer_auth_attaches_the_current_token() {
    let server = MockServer::start().await;
    let session = session_against(&server);
    let (access, _) = seed(&session, Duration::minutes(10)).await;

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", format!("Bearer {}", access).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "bob" })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = BearerAuth::new(session.clone());
    let client = reqwest::Client::new();
    let request = auth
        .authorize(client.get(format!("{}/api/profile", server.uri())))
        .await
        .unwrap();
    let response = request.send().await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn bearer_auth_refuses_without_session() {
    let server = MockServer::start().await;
    let session = session_against(&server);

    let auth = BearerAuth::new(session);
    let result = auth.authorize(reqwest::Client::new().get(server.uri())).await;

    assert!(matches!(result, Err(SessionError::NoSession)));
}

#[tokio::test]
async fn guard_redirects_only_when_session_is_unusable() {
    let server = MockServer::start().await;
    let session = session_against(&server);
    let guard = SessionGuard::new(session.clone());

    assert!(matches!(
        guard.check().await,
        GuardDecision::RedirectToLogin(SessionError::NoSession)
    ));

    seed(&session, Duration::minutes(10)).await;
    assert!(guard.check().await.is_proceed());
}

#[tokio::test]
async fn watcher_stops_on_cancel() {
    let server = MockServer::start().await;
    let session = session_against(&server);
    seed(&session, Duration::minutes(10)).await;

    let cancel = CancellationToken::new();
    let watcher = SessionWatcher::new(session, std::time::Duration::from_millis(10), cancel.clone());
    let handle = tokio::spawn(async move { watcher.run().await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();

    assert_eq!(handle.await.unwrap(), WatchExit::Cancelled);
}

#[tokio::test]
async fn watcher_stops_when_the_session_ends() {
    let server = MockServer::start().await;
    let session = session_against(&server);

    let watcher = SessionWatcher::new(
        session,
        std::time::Duration::from_millis(10),
        CancellationToken::new(),
    );

    assert_eq!(watcher.run().await, WatchExit::SessionEnded);
}
