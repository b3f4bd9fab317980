//! Backend liveness monitor.
//!
//! Free-tier identity projects get paused when idle. A background task
//! probes the provider's health endpoint on a fixed interval (first probe
//! immediately) and publishes the result on a `watch` channel, so pages and
//! the CLI can show a degraded-mode banner.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::identity::IdentityProvider;

/// Default time between probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Give up on a single probe after this long.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Banner shown while the backend is not known to be online.
pub const OFFLINE_BANNER: &str = "⚠️ Our backend is currently offline (Supabase paused). Some features may not work. Please try again later.";

/// Last known backend reachability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    /// No probe has answered yet.
    #[default]
    Checking,
    Online,
    Offline,
}

impl BackendStatus {
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    /// Banner text, shown for anything but `Online`.
    #[must_use]
    pub const fn banner(self) -> Option<&'static str> {
        if self.is_online() {
            None
        } else {
            Some(OFFLINE_BANNER)
        }
    }
}

/// One health probe.
pub async fn probe(provider: &dyn IdentityProvider) -> BackendStatus {
    match tokio::time::timeout(PROBE_TIMEOUT, provider.health()).await {
        Ok(Ok(())) => BackendStatus::Online,
        Ok(Err(e)) => {
            warn!(error = %e, "backend health check failed");
            BackendStatus::Offline
        }
        Err(_) => {
            warn!(timeout_secs = PROBE_TIMEOUT.as_secs(), "backend health check timed out");
            BackendStatus::Offline
        }
    }
}

/// Read side of the monitor.
#[derive(Debug, Clone)]
pub struct BackendMonitor {
    rx: watch::Receiver<BackendStatus>,
}

/// Stops the probe task when dropped.
#[derive(Debug)]
pub struct MonitorGuard {
    handle: JoinHandle<()>,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl BackendMonitor {
    /// Start probing `provider` every `interval`.
    #[must_use]
    pub fn spawn(provider: Arc<dyn IdentityProvider>, interval: Duration) -> (Self, MonitorGuard) {
        let (tx, rx) = watch::channel(BackendStatus::Checking);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let status = probe(provider.as_ref()).await;
                let changed = tx.send_if_modified(|current| {
                    if *current == status {
                        false
                    } else {
                        *current = status;
                        true
                    }
                });
                if changed {
                    info!(?status, "backend status changed");
                }
            }
        });

        (Self { rx }, MonitorGuard { handle })
    }

    /// Monitor pinned to one status (tests, probing disabled).
    #[must_use]
    pub fn fixed(status: BackendStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        Self { rx }
    }

    #[must_use]
    pub fn status(&self) -> BackendStatus {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn banner(&self) -> Option<&'static str> {
        self.status().banner()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.rx.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::StubIdentity;

    #[test]
    fn test_banner_visibility() {
        assert_eq!(BackendStatus::Checking.banner(), Some(OFFLINE_BANNER));
        assert_eq!(BackendStatus::Offline.banner(), Some(OFFLINE_BANNER));
        assert_eq!(BackendStatus::Online.banner(), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&BackendStatus::Offline).unwrap(),
            r#""offline""#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_follows_provider() {
        let provider = Arc::new(StubIdentity::new());
        let (monitor, _guard) = BackendMonitor::spawn(provider.clone(), Duration::from_secs(60));
        let mut rx = monitor.subscribe();
        assert_eq!(monitor.status(), BackendStatus::Checking);

        // First probe runs immediately
        rx.changed().await.unwrap();
        assert_eq!(monitor.status(), BackendStatus::Online);

        provider.set_healthy(false);
        rx.changed().await.unwrap();
        assert_eq!(monitor.status(), BackendStatus::Offline);
        assert_eq!(monitor.banner(), Some(OFFLINE_BANNER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_drop_stops_probing() {
        let provider = Arc::new(StubIdentity::new());
        let (monitor, guard) = BackendMonitor::spawn(provider.clone(), Duration::from_secs(60));
        let mut rx = monitor.subscribe();
        rx.changed().await.unwrap();

        drop(guard);
        provider.set_healthy(false);
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(monitor.status(), BackendStatus::Online);
    }
}
