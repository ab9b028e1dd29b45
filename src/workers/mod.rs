mod autosave;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::PracticeEngine;
use crate::store::{ProfileStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("worker task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Owns the background autosave task; `stop` flushes once more before
/// shutting it down.
pub struct WorkerManager {
    shutdown_tx: broadcast::Sender<()>,
    autosave: Option<JoinHandle<()>>,
    engine: Arc<PracticeEngine>,
    store: Arc<ProfileStore>,
}

impl WorkerManager {
    pub fn start(
        engine: Arc<PracticeEngine>,
        store: Arc<ProfileStore>,
        interval_secs: u64,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(autosave::run(
            Arc::clone(&engine),
            Arc::clone(&store),
            interval_secs,
            shutdown_rx,
        ));
        info!(interval_secs, "autosave worker started");
        Self {
            shutdown_tx,
            autosave: Some(handle),
            engine,
            store,
        }
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.autosave.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "autosave worker did not stop cleanly");
            }
        }
        // Final flush so nothing between the last tick and shutdown is lost.
        if let Err(err) = self.store.save(&self.engine.snapshot()) {
            warn!(error = %err, "final save on shutdown failed");
        }
        info!("workers stopped");
    }
}
