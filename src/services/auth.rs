//! Authentication service — PIN configuration, bot filtering, client
//! identity helpers.
//!
//! The HTTP-level PIN and the WebSocket-level relay password are
//! independent secrets; this module only knows about the PIN.

use std::net::SocketAddr;
use std::path::Path;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::rate_limit::RateLimiter;
use crate::services::session::{SessionStore, bytes_to_hex};

/// Fallback PIN when neither `--pin` nor `AUTH_PIN` is set.
const DEFAULT_PIN: &str = "274683";

/// User-agent fragments that identify automated clients. Policy
/// constants, not runtime configuration.
const BOT_TOKENS: [&str; 10] = [
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python-requests",
    "headless",
    "phantom",
    "selenium",
];

// =============================================================================
// SERVICE
// =============================================================================

pub struct AuthService {
    pin: String,
    pub sessions: SessionStore,
    pub limiter: RateLimiter,
}

impl AuthService {
    /// Build the service. `pin` comes from the CLI (which already folds
    /// in `AUTH_PIN`); absent both, the compiled-in default applies.
    pub fn new(data_dir: &Path, pin: Option<String>) -> Self {
        let pin = pin
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PIN.to_string());
        let prefix = &pin[..pin.len().min(2)];
        info!(pin_prefix = %prefix, "auth initialized");
        Self {
            pin,
            sessions: SessionStore::open(data_dir),
            limiter: RateLimiter::new(),
        }
    }

    #[must_use]
    pub fn verify_pin(&self, pin: &str) -> bool {
        pin == self.pin
    }
}

// =============================================================================
// BOT FILTER
// =============================================================================

/// Case-insensitive substring test against the known bot tokens.
/// An empty user-agent passes: legitimate mobile apps send none.
#[must_use]
pub fn is_bot(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    let ua = user_agent.to_ascii_lowercase();
    BOT_TOKENS.iter().any(|token| ua.contains(token))
}

// =============================================================================
// CLIENT IDENTITY
// =============================================================================

/// Extract the client IP: first `X-Forwarded-For` entry, else
/// `X-Real-IP`, else the transport address.
#[must_use]
pub fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !xri.is_empty() {
            return xri.to_string();
        }
    }

    remote.ip().to_string()
}

/// First three dot-separated octets for IPv4; the whole string otherwise.
#[must_use]
pub fn ip_prefix(ip: &str) -> String {
    if ip.contains('.') {
        let parts: Vec<&str> = ip.split('.').collect();
        if parts.len() >= 3 {
            return parts[..3].join(".");
        }
    }
    ip.to_string()
}

/// Short device fingerprint: SHA-256 of `user_agent || ip_prefix`,
/// first 8 bytes, hex.
#[must_use]
pub fn device_hash(user_agent: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(ip_prefix(ip).as_bytes());
    let digest = hasher.finalize();
    bytes_to_hex(&digest[..8])
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
