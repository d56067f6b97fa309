//! Background job: sweep expired access tokens.
//!
//! Runs hourly. Tokens past `expires_at` are already rejected by validation,
//! so this only keeps the table from growing without bound.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialManager;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the sweep task. The first sweep happens one `period` after start.
/// The task exits when `cancel` fires; await the handle to join it.
pub fn spawn(
    manager: Arc<CredentialManager>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("token sweep task stopped");
                    break;
                }
                _ = interval.tick() => {
                    manager.sweep_expired().await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_sweeps_on_interval_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(CredentialManager::new(store.clone()));
        manager.issue(ChronoDuration::hours(-1)).await;
        manager.issue(ChronoDuration::hours(1)).await;

        let cancel = CancellationToken::new();
        let handle = spawn(manager.clone(), Duration::from_millis(20), cancel.clone());

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.len(), 1);

        cancel.cancel();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_sweep_before_first_period() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(CredentialManager::new(store.clone()));
        manager.issue(ChronoDuration::hours(-1)).await;

        let cancel = CancellationToken::new();
        let handle = spawn(manager, Duration::from_secs(3600), cancel.clone());

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
