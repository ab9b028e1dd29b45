use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use crate::engine::PracticeEngine;
use crate::store::ProfileStore;

/// Periodic snapshot-and-flush loop. Save errors are already reported by
/// the store; the loop just keeps ticking and retries next time.
pub(super) async fn run(
    engine: Arc<PracticeEngine>,
    store: Arc<ProfileStore>,
    interval_secs: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; skip it so startup does not write.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let document = engine.snapshot();
                if store.save(&document).is_ok() {
                    debug!(sessions = document.sessions.len(), "autosave tick");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
