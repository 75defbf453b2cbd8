//! Keepalive prober (spec §4.4.3): on a fixed interval, sends a minimal
//! request to the model endpoint so the provider doesn't unload it between
//! real enhancement calls.

use super::matcher::AiMatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Matches the endpoint's typical model-unload idle window with margin.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

pub struct KeepaliveProber {
    shutdown: watch::Sender<bool>,
}

impl KeepaliveProber {
    /// Spawns the background probe loop. Dropping the returned handle, or
    /// calling `stop`, ends it on the next tick boundary.
    pub fn spawn(matcher: Arc<AiMatcher>, model: String, interval: Duration) -> Self {
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match matcher.enhance(&model, "keepalive-probe.mkv").await {
                            Ok(_) => debug!("ai keepalive probe succeeded"),
                            Err(e) => warn!(error = %e, "ai keepalive probe failed"),
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { shutdown: tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for KeepaliveProber {
    fn drop(&mut self) {
        self.stop();
    }
}
