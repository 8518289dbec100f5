use crate::application_port::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Cancelled,
    SessionEnded,
}

/// Keeps a session warm by calling `validate_and_refresh_token` on a fixed interval.
/// Stops at the first failure, since every failure there is terminal for the session.
pub struct SessionWatcher {
    session: Arc<dyn SessionService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl SessionWatcher {
    pub fn new(
        session: Arc<dyn SessionService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            session,
            interval,
            cancellation_token,
        }
    }

    pub async fn run(&self) -> WatchExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("SessionWatcher shutting down...");
                    return WatchExit::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.session.validate_and_refresh_token().await {
                        tracing::error!("session ended: {}", e);
                        return WatchExit::SessionEnded;
                    }
                }
            }
        }
    }
}
