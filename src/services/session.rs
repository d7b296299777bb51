//! Session store — persistent cookie-backed HTTP sessions.
//!
//! ARCHITECTURE
//! ============
//! Sessions live in memory and are mirrored to a single `sessions.json`
//! snapshot (mode 0600) on every mutation. The snapshot is rewritten via
//! temp-file-then-rename so a crash mid-write never leaves a torn file.
//!
//! ERROR HANDLING
//! ==============
//! Persistence failures are logged, never propagated: a session that
//! failed to hit disk remains valid in memory for the process lifetime.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::services::auth::device_hash;
use crate::services::store::write_atomic;

/// Session lifetime in days.
pub const SESSION_LIFETIME_DAYS: i64 = 30;

/// How often the expiry sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

const SESSIONS_FILE: &str = "sessions.json";

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex session id.
#[must_use]
pub fn generate_session_id() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// TYPES
// =============================================================================

/// An authenticated browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 64-hex-char opaque token.
    pub id: String,
    /// Short fingerprint of `user_agent || ip_prefix`. Informational.
    pub device_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub user_agent: String,
    pub ip: String,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    file: PathBuf,
}

impl SessionStore {
    /// Open the store under `data_dir`, loading any existing snapshot.
    /// A missing or unparseable file starts the store empty.
    pub fn open(data_dir: &Path) -> Self {
        let file = data_dir.join(SESSIONS_FILE);
        let sessions = match std::fs::read(&file) {
            Ok(data) => match serde_json::from_slice::<HashMap<String, Session>>(&data) {
                Ok(sessions) => {
                    info!(count = sessions.len(), "loaded sessions");
                    sessions
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse sessions file, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => {
                info!("no existing sessions file, starting fresh");
                HashMap::new()
            }
        };

        Self { sessions: Arc::new(RwLock::new(sessions)), file }
    }

    /// Mint a new session for the given user agent and IP.
    pub async fn create(&self, user_agent: &str, ip: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            device_hash: device_hash(user_agent, ip),
            created_at: now,
            expires_at: now + chrono::Duration::days(SESSION_LIFETIME_DAYS),
            last_used: now,
            user_agent: user_agent.to_string(),
            ip: ip.to_string(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        self.persist(&sessions);
        info!(id = %truncate_id(&session.id), expires = %session.expires_at.format("%Y-%m-%d"), "session created");
        session
    }

    /// Look up a session. Expired sessions are treated as absent.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|s| Utc::now() < s.expires_at)
            .cloned()
    }

    /// Refresh `last_used` on an existing, non-expired session.
    pub async fn touch(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return;
        };
        if Utc::now() >= session.expires_at {
            return;
        }
        session.last_used = Utc::now();
        self.persist(&sessions);
    }

    /// Remove a session. No-op when absent.
    pub async fn delete(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            info!(id = %truncate_id(id), "session deleted");
        }
        self.persist(&sessions);
    }

    /// Drop expired sessions, persisting only when something was removed.
    /// Returns the number of sessions removed.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, s| now < s.expires_at);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "cleaned up expired sessions");
            self.persist(&sessions);
        }
        removed
    }

    /// Spawn the hourly expiry sweeper. Returns a handle for shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.sweep().await;
            }
        })
    }

    fn persist(&self, sessions: &HashMap<String, Session>) {
        let data = match serde_json::to_vec_pretty(sessions) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "failed to serialize sessions");
                return;
            }
        };
        if let Err(e) = write_atomic(&self.file, &data, 0o600) {
            warn!(error = %e, "failed to save sessions");
        }
    }

    #[cfg(test)]
    async fn insert_raw(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        self.persist(&sessions);
    }
}

/// First 8 chars of a session id for log lines; ids shorter than that
/// (never minted by us, but possible in a hand-edited file) log whole.
fn truncate_id(id: &str) -> &str {
    if id.len() >= 8 { &id[..8] } else { id }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
