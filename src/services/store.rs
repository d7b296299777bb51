//! Versioned JSON document store.
//!
//! DESIGN
//! ======
//! One mutable document per store, guarded by a `tokio::sync::RwLock`.
//! Every successful update stamps `version = previous + 1` and a fresh
//! RFC-3339 `lastUpdated`, ignoring whatever the caller supplied — the
//! browser clients hold no authoritative state, so last-writer-wins is
//! the contract. Writers serialise on the lock; versions are gapless.
//!
//! Documents persist as pretty-printed JSON (mode 0644) via
//! temp-file-then-rename.
//!
//! ERROR HANDLING
//! ==============
//! A failed persist surfaces to the caller, but the in-memory document
//! keeps the new value (accepted single-writer tradeoff).

use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::warn;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// =============================================================================
// TIME HELPERS
// =============================================================================

/// Current instant as an RFC-3339 UTC string, second precision.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Today's local date as `YYYY-MM-DD`.
#[must_use]
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Write `data` to `path` through a sibling temp file and an atomic
/// rename, so readers never observe a torn file.
#[cfg_attr(not(unix), allow(unused_variables))]
pub(crate) fn write_atomic(path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode))?;
    }
    std::fs::rename(&tmp, path)
}

// =============================================================================
// VERSIONED STORE
// =============================================================================

/// A document carrying the store's monotonic version and timestamp.
pub trait VersionedState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// A pristine document for first startup and post-archive resets.
    fn fresh() -> Self;

    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn set_last_updated(&mut self, ts: String);
}

pub struct StateStore<T> {
    pub(crate) dir: PathBuf,
    pub(crate) path: PathBuf,
    pub(crate) state: RwLock<T>,
}

impl<T: VersionedState> StateStore<T> {
    /// Open the store, creating `dir` as needed. A missing or corrupt
    /// current file falls back to the fresh document.
    pub fn load(dir: &Path, file_name: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name);

        let state = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<T>(&data) {
                Ok(state) => state,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "state file unparseable, using defaults");
                    T::fresh()
                }
            },
            Err(_) => T::fresh(),
        };

        Ok(Self { dir: dir.to_path_buf(), path, state: RwLock::new(state) })
    }

    /// Snapshot copy of the current document.
    pub async fn get(&self) -> T {
        self.state.read().await.clone()
    }

    /// Current version only. Cheap; used for polling.
    pub async fn version(&self) -> i64 {
        self.state.read().await.version()
    }

    /// Replace the document. The caller's version and timestamp are
    /// overwritten with `previous + 1` and now. Returns the stored
    /// document.
    pub async fn update(&self, mut doc: T) -> Result<T, StoreError> {
        let mut state = self.state.write().await;
        doc.set_version(state.version() + 1);
        doc.set_last_updated(now_rfc3339());
        *state = doc.clone();
        persist(&self.path, &doc)?;
        Ok(doc)
    }
}

/// Serialize and atomically rewrite a store document.
pub(crate) fn persist<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(doc)?;
    write_atomic(path, &data, 0o644)?;
    Ok(())
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
