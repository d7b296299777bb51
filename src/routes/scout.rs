//! Scout endpoints — state fetch/update, version probe, archive.
//!
//! Updates broadcast `{type:"scout_update", version}` without the
//! document body; browsers fetch the full state themselves.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, info};

use crate::services::scout::ScoutState;
use crate::services::store::now_rfc3339;
use crate::state::AppState;

/// `GET /api/scout`
pub async fn get_state(State(state): State<AppState>) -> Response {
    let doc = state.scout.get().await;
    info!(version = doc.version, "scout state fetched");
    Json(doc).into_response()
}

/// `POST /api/scout`
pub async fn update_state(
    State(state): State<AppState>,
    body: Result<Json<ScoutState>, JsonRejection>,
) -> Response {
    let Ok(Json(doc)) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON" }))).into_response();
    };

    let updated = match state.scout.update(doc).await {
        Ok(updated) => updated,
        Err(e) => {
            error!(error = %e, "scout update failed to persist");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to save state" })),
            )
                .into_response();
        }
    };

    info!(version = updated.version, "scout state updated");
    state
        .relay
        .broadcast(json!({ "type": "scout_update", "version": updated.version }).to_string())
        .await;

    Json(updated).into_response()
}

/// `GET /api/scout/version`
pub async fn version(State(state): State<AppState>) -> Response {
    let version = state.scout.version().await;
    Json(json!({ "version": version, "timestamp": now_rfc3339() })).into_response()
}

/// `POST /api/scout/archive`
pub async fn archive(State(state): State<AppState>) -> Response {
    if let Err(e) = state.scout.archive_match().await {
        error!(error = %e, "archive failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to archive match" })),
        )
            .into_response();
    }

    info!("match archived");
    Json(json!({ "status": "ok", "message": "Match archived successfully" })).into_response()
}
