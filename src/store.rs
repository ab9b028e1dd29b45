use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::engine::snapshot::ProfileDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt profile document: {0}")]
    Corrupt(String),

    #[error("no platform data directory available")]
    NoDataDir,
}

const APP_DIR: &str = "MathSpeedTrainer";
const PROFILE_FILE: &str = "profile.json";

/// Single-document JSON store. Writers are serialized and every write
/// goes to a temp file first, then renames over the target, so a crash
/// mid-save can never leave a half-written profile behind.
pub struct ProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    failing: AtomicBool,
}

impl ProfileStore {
    /// Store under the platform data directory
    /// (APPDATA / Application Support / XDG data home).
    pub fn open_default() -> Result<Self, StoreError> {
        let base = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        let dir = base.join(APP_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(Self::at_path(dir.join(PROFILE_FILE)))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no profile has been saved yet. A file that exists
    /// but does not parse is reported as corrupt, never silently replaced.
    pub fn load(&self) -> Result<Option<ProfileDocument>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let document: ProfileDocument = serde_json::from_str(&raw)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(document))
    }

    /// Failures are logged once per episode and surface to the caller;
    /// in-memory state stays authoritative and the next save retries.
    pub fn save(&self, document: &ProfileDocument) -> Result<(), StoreError> {
        match self.write_atomic(document) {
            Ok(()) => {
                if self.failing.swap(false, Ordering::Relaxed) {
                    tracing::info!(path = %self.path.display(), "profile save recovered");
                } else {
                    tracing::debug!(path = %self.path.display(), "profile saved");
                }
                Ok(())
            }
            Err(err) => {
                if !self.failing.swap(true, Ordering::Relaxed) {
                    tracing::warn!(path = %self.path.display(), error = %err, "profile save failed");
                } else {
                    tracing::debug!(path = %self.path.display(), error = %err, "profile save still failing");
                }
                Err(err)
            }
        }
    }

    fn write_atomic(&self, document: &ProfileDocument) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
