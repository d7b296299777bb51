//! Shared application state.
//!
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! All fields are Arc-wrapped or internally shared, so Clone is cheap.

use std::path::PathBuf;
use std::sync::Arc;

use crate::relay::Relay;
use crate::services::auth::AuthService;
use crate::services::matchday::MatchdayStore;
use crate::services::scout::ScoutStore;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub relay: Relay,
    pub scout: Arc<ScoutStore>,
    pub matchday: Arc<MatchdayStore>,
    /// Directory served behind the session gate.
    pub web_dir: PathBuf,
}

impl AppState {
    #[must_use]
    pub fn new(
        auth: AuthService,
        relay: Relay,
        scout: ScoutStore,
        matchday: MatchdayStore,
        web_dir: PathBuf,
    ) -> Self {
        Self {
            auth: Arc::new(auth),
            relay,
            scout: Arc::new(scout),
            matchday: Arc::new(matchday),
            web_dir,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
