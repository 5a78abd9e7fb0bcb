//! Background reconciliation of the local registry against the store.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::events::SharedListener;
use crate::provider::SessionProvider;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions examined.
    pub checked: usize,
    /// Sessions found missing from the store this pass.
    pub invalidated: usize,
    /// Sessions dropped from the local map.
    pub destroyed: usize,
    /// Sessions whose existence check failed.
    pub skipped: usize,
}

/// Handle to the running sweeper task.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Check if the sweeper task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the sweeper task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl SessionProvider {
    /// Start sweeping every `sweep_interval` for the life of the runtime.
    ///
    /// The first pass runs immediately.
    pub fn start_sweeper(self: &Arc<Self>, listener: Option<SharedListener>) -> SweeperHandle {
        let provider = Arc::clone(self);
        let period = provider.config().sweep_interval;

        info!(interval_secs = period.as_secs(), "Starting session sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                provider.sweep(listener.as_ref()).await;
            }
        });

        SweeperHandle { handle }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{ProviderConfig, SessionConfig};
    use crate::sink::MemorySink;
    use crate::store::MemoryStore;

    async fn provider(
        sweep_interval: Duration,
    ) -> (Arc<SessionProvider>, Arc<MemoryStore>, Arc<MemorySink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let config = ProviderConfig::new().with_sweep_interval(sweep_interval);
        let provider = SessionProvider::with_error_sink(store.clone(), config, sink.clone())
            .await
            .unwrap();
        (Arc::new(provider), store, sink)
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_sessions() {
        let (provider, _, _) = provider(Duration::from_secs(60)).await;
        let session = provider
            .new_session(&SessionConfig::default(), None)
            .await
            .unwrap();

        let report = provider.sweep(None).await;
        assert_eq!(
            report,
            SweepReport {
                checked: 1,
                ..Default::default()
            }
        );
        assert!(provider.exists(session.id()));
    }

    #[tokio::test]
    async fn test_sweep_evicts_missing_record() {
        let (provider, store, _) = provider(Duration::from_secs(60)).await;
        let session = provider
            .new_session(&SessionConfig::default(), None)
            .await
            .unwrap();
        store.remove(session.key());

        let report = provider.sweep(None).await;
        assert_eq!(report.invalidated, 1);
        assert_eq!(report.destroyed, 1);
        assert!(session.invalidated());
        assert!(provider.get(session.id()).is_none());
    }

    #[tokio::test]
    async fn test_sweep_skips_on_store_error() {
        let (provider, store, sink) = provider(Duration::from_secs(60)).await;
        let session = provider
            .new_session(&SessionConfig::default(), None)
            .await
            .unwrap();
        store.set_available(false);

        let report = provider.sweep(None).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.destroyed, 0);
        assert!(!session.invalidated());
        assert!(provider.exists(session.id()));
        assert_eq!(sink.reports()[0].context, "sweep");
    }

    #[tokio::test]
    async fn test_sweep_destroys_locally_invalidated() {
        let (provider, _, _) = provider(Duration::from_secs(60)).await;
        let session = provider
            .new_session(&SessionConfig::default(), None)
            .await
            .unwrap();
        session.invalidate();

        let report = provider.sweep(None).await;
        assert_eq!(report.invalidated, 0);
        assert_eq!(report.destroyed, 1);
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_background_sweeper_runs() {
        let (provider, store, _) = provider(Duration::from_millis(20)).await;
        let session = provider
            .new_session(&SessionConfig::default(), None)
            .await
            .unwrap();

        let handle = provider.start_sweeper(None);
        assert!(handle.is_running());

        store.remove(session.key());
        for _ in 0..100 {
            if provider.get(session.id()).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(provider.get(session.id()).is_none());

        handle.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_running());
    }
}
