//! Scout store — per-player scouting data for the current match.
//!
//! Carries the archive operation: the current document is snapshotted to
//! `archive/<date>_<name>.json` and the live document reset to defaults,
//! all under the store's write lock.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::services::store::{StateStore, StoreError, VersionedState, now_rfc3339, persist, today};

const CURRENT_FILE: &str = "scout-current.json";
const ARCHIVE_DIR: &str = "archive";

// =============================================================================
// TYPES
// =============================================================================

/// A player in the scout sheet. `number` is untyped on the wire: the
/// browser sends either a string or an integer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub number: serde_json::Value,
    pub position: String,
    pub active: bool,
    /// Score series keyed by scouted element (serve, attack, ...).
    pub scores: HashMap<String, Vec<i64>>,
}

/// The scout document for the current match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoutState {
    pub version: i64,
    pub last_updated: String,
    pub match_name: String,
    /// `YYYY-MM-DD`.
    pub match_date: String,
    pub players: Vec<Player>,
}

impl VersionedState for ScoutState {
    fn fresh() -> Self {
        Self {
            version: 1,
            last_updated: now_rfc3339(),
            match_name: String::new(),
            match_date: today(),
            players: Vec::new(),
        }
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn set_last_updated(&mut self, ts: String) {
        self.last_updated = ts;
    }
}

// =============================================================================
// STORE
// =============================================================================

pub type ScoutStore = StateStore<ScoutState>;

impl StateStore<ScoutState> {
    /// Open the scout store under `data_dir`, ensuring the archive
    /// directory exists.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir.join(ARCHIVE_DIR))?;
        Self::load(data_dir, CURRENT_FILE)
    }

    /// Snapshot the current match to `archive/<date>_<name>.json`, then
    /// reset the live document to defaults. A document with an empty
    /// match name has nothing worth keeping: no file is written and the
    /// state is left untouched.
    pub async fn archive_match(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.match_name.is_empty() {
            return Ok(());
        }

        let file_name = format!("{}_{}.json", state.match_date, sanitize_filename(&state.match_name));
        let archive_path = self.dir.join(ARCHIVE_DIR).join(&file_name);
        persist(&archive_path, &*state)?;

        *state = ScoutState::fresh();
        persist(&self.path, &*state)?;
        info!(archive = %file_name, "match archived");
        Ok(())
    }
}

/// Replace filesystem-hostile characters (and spaces) with `_`.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
#[path = "scout_test.rs"]
mod tests;
