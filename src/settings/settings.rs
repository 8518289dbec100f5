use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub store: Store,
    pub refresh: Refresh,
    pub clock: Clock,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "file" or "redis"
    pub path: Option<String>,
    pub redis_url: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    pub backend: String, // "fake" or "http"
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Clock {
    pub utc_offset: String,
    pub time_endpoint: Option<String>,
    pub sync_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub near_expiry_threshold_secs: u64,
    pub watch_interval_secs: u64,
    pub device_id: Option<String>,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .set_default("refresh.timeout_secs", 15)
        .map_err(|e| anyhow!(e))?
        .set_default("clock.utc_offset", "+03:30")
        .map_err(|e| anyhow!(e))?
        .set_default("clock.sync_interval_secs", 600)
        .map_err(|e| anyhow!(e))?
        .set_default("session.near_expiry_threshold_secs", 60)
        .map_err(|e| anyhow!(e))?
        .set_default("session.watch_interval_secs", 30)
        .map_err(|e| anyhow!(e))?
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
