use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_file::*;
use crate::infra_http::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::anyhow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_REDIS_PREFIX: &str = "tokenward";

/// Everything a running client needs, wired from settings.
pub struct App {
    pub session: Arc<SessionManager>,
    clock: Arc<ReferenceClock>,
    time_source: Option<Arc<dyn TimeSource>>,
    sync_interval: Duration,
    watch_interval: Duration,
    sync_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl App {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let offset = parse_utc_offset(&settings.clock.utc_offset)?;
        let clock = Arc::new(ReferenceClock::new(offset));

        let kv: Arc<dyn KeyValueStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryKeyValueStore::new()),
            "file" => {
                let path = settings
                    .store
                    .path
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.path is required for the file backend"))?;
                Arc::new(FileKeyValueStore::open(path).await?)
            }
            "redis" => {
                let url = settings
                    .store
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.redis_url is required for the redis backend"))?;
                let prefix = settings
                    .store
                    .prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REDIS_PREFIX.to_string());
                Arc::new(RedisKeyValueStore::connect(url, prefix).await?)
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let timeout = Duration::from_secs(settings.refresh.timeout_secs);
        let transport: Arc<dyn RefreshTransport> = match settings.refresh.backend.as_str() {
            "fake" => Arc::new(FakeRefreshTransport::new(clock.clone())),
            "http" => {
                let endpoint = settings
                    .refresh
                    .endpoint
                    .clone()
                    .ok_or_else(|| anyhow!("refresh.endpoint is required for the http backend"))?;
                Arc::new(HttpRefreshTransport::new(endpoint, timeout)?)
            }
            other => return Err(anyhow!("Unknown refresh backend: {}", other)),
        };

        let time_source: Option<Arc<dyn TimeSource>> = match &settings.clock.time_endpoint {
            Some(endpoint) => {
                let client = reqwest::Client::builder().timeout(timeout).build()?;
                Some(Arc::new(HttpTimeSource::new(client, endpoint.clone(), offset)))
            }
            None => None,
        };

        let device_id: Arc<dyn DeviceIdProvider> = match &settings.session.device_id {
            Some(id) => Arc::new(FixedDeviceId(id.clone())),
            None => Arc::new(StoredDeviceId::new(kv.clone())),
        };

        let session = Arc::new(SessionManager::new(
            TokenStore::new(kv),
            Arc::new(JwtClaimsDecoder::new()),
            transport,
            device_id,
            clock.clone(),
            SessionConfig {
                near_expiry_threshold: chrono::Duration::seconds(
                    settings.session.near_expiry_threshold_secs as i64,
                ),
            },
        ));

        debug!("app wired");

        Ok(Self {
            session,
            clock,
            time_source,
            sync_interval: Duration::from_secs(settings.clock.sync_interval_secs),
            watch_interval: Duration::from_secs(settings.session.watch_interval_secs),
            sync_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn session_service(&self) -> Arc<dyn SessionService> {
        self.session.clone()
    }

    /// Calibrates the clock once, then keeps it calibrated in the background. A no-op
    /// when no time endpoint is configured.
    pub async fn start_clock_sync(&self) {
        let Some(source) = self.time_source.clone() else {
            return;
        };
        if let Err(e) = self.clock.sync_once(source.as_ref()).await {
            warn!("initial reference time sync failed, using system time: {:#}", e);
        }

        let clock = self.clock.clone();
        let interval = self.sync_interval;
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            clock.run_sync(source, interval, cancel).await;
        });
        *self.sync_handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn watcher(&self) -> SessionWatcher {
        SessionWatcher::new(
            self.session_service(),
            self.watch_interval,
            self.cancel.child_token(),
        )
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self
            .sync_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let r = handle.await;
            info!("clock sync handle dropped: {:?}", r);
        }
    }
}
