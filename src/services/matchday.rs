//! Matchday store — central match configuration, plus best-effort
//! extraction of match metadata from a DVV ticker page.
//!
//! ERROR HANDLING
//! ==============
//! Ticker fetching normalises upstream failures into `ParseError` so the
//! handler can return a stable 400 body. Extraction never falls back to
//! partial results beyond the contract below: any deviation is the
//! caller's 400, not a guess.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::services::store::{StateStore, StoreError, VersionedState, now_rfc3339, today};

const CURRENT_FILE: &str = "matchday-current.json";

/// Upstream fetch budget for the ticker page.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.*?)</title>").expect("title regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})").expect("date regex"));
static STREAM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/stream/([a-zA-Z0-9-]+)").expect("stream id regex"));

// =============================================================================
// TYPES
// =============================================================================

/// The matchday document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchdayState {
    pub version: i64,
    pub last_updated: String,
    pub home_team: String,
    pub away_team: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub dvv_link: String,
    pub match_id: String,
}

impl VersionedState for MatchdayState {
    fn fresh() -> Self {
        Self {
            version: 1,
            last_updated: now_rfc3339(),
            home_team: "Heim".to_string(),
            away_team: "Gast".to_string(),
            date: today(),
            dvv_link: String::new(),
            match_id: String::new(),
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

pub type MatchdayStore = StateStore<MatchdayState>;

impl StateStore<MatchdayState> {
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        Self::load(data_dir, CURRENT_FILE)
    }
}

// =============================================================================
// TICKER PARSING
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("status code {0}")]
    Status(u16),
}

/// Fetch a ticker URL and extract a matchday document from its HTML.
/// The result is unstamped (version 0) and is not persisted.
pub async fn fetch_ticker(url: &str) -> Result<MatchdayState, ParseError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ParseError::Fetch(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ParseError::Fetch(e.to_string()))?;

    if resp.status().as_u16() != 200 {
        return Err(ParseError::Status(resp.status().as_u16()));
    }

    let html = resp
        .text()
        .await
        .map_err(|e| ParseError::Fetch(e.to_string()))?;

    Ok(parse_ticker_html(&html, url))
}

/// Best-effort extraction over the raw page:
/// - teams from the first `<title>`, split on `" vs. "` then `" - "`;
/// - date from the first `DD.MM.YYYY` in the body, reordered, else today;
/// - match id from `/stream/<id>` in the URL itself.
pub fn parse_ticker_html(html: &str, url: &str) -> MatchdayState {
    let mut home = String::new();
    let mut away = String::new();

    if let Some(caps) = TITLE_RE.captures(html) {
        let title = &caps[1];
        let parts: Vec<&str> = if title.contains(" vs. ") {
            title.split(" vs. ").collect()
        } else {
            title.split(" - ").collect()
        };
        if parts.len() >= 2 {
            home = parts[0].trim().to_string();
            away = parts[1]
                .split('-')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        }
    }

    let date = match DATE_RE.captures(html) {
        Some(caps) => format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]),
        None => today(),
    };

    let match_id = STREAM_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    MatchdayState {
        home_team: home,
        away_team: away,
        date,
        match_id,
        dvv_link: url.to_string(),
        ..MatchdayState::default()
    }
}

#[cfg(test)]
#[path = "matchday_test.rs"]
mod tests;
