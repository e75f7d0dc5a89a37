use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use super::store::SessionStore;

/// Periodically evicts expired sessions, independent of whether any viewer
/// ever touches them again. Grounded on the teacher's periodic admin-session
/// cleanup task spawned from `main.rs`: a fixed interval, no backoff, no
/// jitter, logged at completion. Stops as soon as `shutdown` reports `true`,
/// mirroring the Origin's own `ctrl_c` → `watch::channel` shutdown wiring.
pub fn spawn(store: SessionStore, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let expired = store.expired_ids(Utc::now());
                    if expired.is_empty() {
                        continue;
                    }
                    for id in &expired {
                        store.expire(id).await;
                    }
                    info!(count = expired.len(), "swept expired sessions");
                }
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        info!("sweeper stopping on shutdown signal");
                        break;
                    }
                }
            }
        }
    })
}
