use crate::domain_port::{Clock, TimeSource};
use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Asia/Tehran has had no DST since 2022.
pub const DEFAULT_UTC_OFFSET: &str = "+03:30";

/// Parses `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("invalid offset"));
    }
    raw.parse::<FixedOffset>()
        .map_err(|e| anyhow!("invalid utc offset {:?}: {}", raw, e))
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        SystemClock { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    reference: DateTime<FixedOffset>,
    taken_at: Instant,
}

/// Clock anchored to the backend's published time: `reference + elapsed since
/// calibration`. Falls back to system time until the first calibration.
pub struct ReferenceClock {
    offset: FixedOffset,
    anchor: RwLock<Option<Anchor>>,
}

impl ReferenceClock {
    pub fn new(offset: FixedOffset) -> Self {
        ReferenceClock {
            offset,
            anchor: RwLock::new(None),
        }
    }

    pub fn calibrate(&self, reference: DateTime<FixedOffset>) {
        let anchor = Anchor {
            reference: reference.with_timezone(&self.offset),
            taken_at: Instant::now(),
        };
        *self.anchor.write().unwrap_or_else(PoisonError::into_inner) = Some(anchor);
    }

    pub fn is_calibrated(&self) -> bool {
        self.current_anchor().is_some()
    }

    pub async fn sync_once(&self, source: &dyn TimeSource) -> Result<()> {
        let reference = source.fetch_reference_time().await?;
        self.calibrate(reference);
        tracing::info!(
            "reference time updated: {}",
            reference.with_timezone(&self.offset).format("%Y-%m-%d %H:%M:%S %:z")
        );
        Ok(())
    }

    /// Re-calibrates every `interval` until cancelled. Failed fetches keep the old anchor.
    pub async fn run_sync(
        &self,
        source: Arc<dyn TimeSource>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("reference clock sync shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once(source.as_ref()).await {
                        tracing::error!("failed to fetch reference time: {:#}", e);
                    }
                }
            }
        }
    }

    fn current_anchor(&self) -> Option<Anchor> {
        *self.anchor.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ReferenceClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.current_anchor() {
            Some(anchor) => {
                let elapsed = chrono::Duration::from_std(anchor.taken_at.elapsed())
                    .unwrap_or(chrono::Duration::zero());
                anchor.reference + elapsed
            }
            None => Utc::now().with_timezone(&self.offset),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    offset: FixedOffset,
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>, offset: FixedOffset) -> Self {
        ManualClock {
            offset,
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .with_timezone(&self.offset)
    }
}
