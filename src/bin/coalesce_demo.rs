use chrono::{Duration, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use tokenward::application_impl::*;
use tokenward::application_port::*;
use tokenward::domain_model::*;
use tokenward::infra_memory::MemoryKeyValueStore;
use tokenward::logger::*;

/// Fires a burst of callers at a session whose token is about to expire and shows
/// that they all share a single refresh.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let clock = Arc::new(SystemClock::new(parse_utc_offset(DEFAULT_UTC_OFFSET)?));
    let transport = Arc::new(FakeRefreshTransport::new(clock.clone()));
    transport.set_delay(Some(std::time::Duration::from_millis(200)));

    let session = SessionManager::new(
        TokenStore::new(Arc::new(MemoryKeyValueStore::new())),
        Arc::new(JwtClaimsDecoder::new()),
        transport.clone(),
        Arc::new(FixedDeviceId("demo-device".to_string())),
        clock,
        SessionConfig::default(),
    );

    let access = mint_token("demo-user", Utc::now() + Duration::seconds(15))?;
    let refresh = mint_token("demo-user", Utc::now() + Duration::days(7))?;
    session
        .start_session(TokenPairUpdate {
            access_token: Some(access),
            refresh_token: Some(refresh),
            ..Default::default()
        })
        .await?;
    info!("state before: {}", session.state().await);

    let results = join_all((0..10).map(|_| session.validate_and_refresh_token())).await;
    let ok = results.iter().filter(|r| r.is_ok()).count();

    info!("{} callers succeeded, refresh calls made: {}", ok, transport.calls());
    info!("state after: {}", session.state().await);

    Ok(())
}
