//! Matchday endpoints — state fetch/update and ticker parsing.
//!
//! Updates broadcast `{type:"matchday_update", version, data}`; the
//! document is small enough to ride along.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::services::matchday::{MatchdayState, fetch_ticker};
use crate::state::AppState;

/// `GET /api/matchday`
pub async fn get_state(State(state): State<AppState>) -> Response {
    Json(state.matchday.get().await).into_response()
}

/// `POST /api/matchday`
pub async fn update_state(
    State(state): State<AppState>,
    body: Result<Json<MatchdayState>, JsonRejection>,
) -> Response {
    let Ok(Json(doc)) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON" }))).into_response();
    };

    let updated = match state.matchday.update(doc).await {
        Ok(updated) => updated,
        Err(e) => {
            error!(error = %e, "matchday update failed to persist");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to save state" })),
            )
                .into_response();
        }
    };

    info!(version = updated.version, "matchday state updated");
    state
        .relay
        .broadcast(
            json!({ "type": "matchday_update", "version": updated.version, "data": updated })
                .to_string(),
        )
        .await;

    Json(updated).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ParseQuery {
    #[serde(default)]
    url: Option<String>,
}

/// `GET /api/matchday/parse?url=…` — fetch and extract, persist nothing.
pub async fn parse(State(_state): State<AppState>, Query(query): Query<ParseQuery>) -> Response {
    let Some(url) = query.url.filter(|u| !u.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing url parameter" })),
        )
            .into_response();
    };

    match fetch_ticker(&url).await {
        Ok(parsed) => Json(parsed).into_response(),
        Err(e) => {
            warn!(%url, error = %e, "ticker parse failed");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
