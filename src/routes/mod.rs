//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the auth, scout, matchday, and WebSocket endpoints plus the
//! session-gated static file server under a single Axum router. No
//! business logic lives here — only request shaping, JSON framing, and
//! middleware composition.

pub mod auth;
pub mod matchday;
pub mod scout;
pub mod ws;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::services::store::now_rfc3339;
use crate::state::AppState;

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    // The 405 fallback goes on before the admission layers: once a
    // router is layered its method routers are boxed and can no longer
    // pick up a fallback.
    let auth_api = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(state.clone(), auth::public));

    let protected_api = Router::new()
        .route("/api/scout", get(scout::get_state).post(scout::update_state))
        .route("/api/scout/version", get(scout::version))
        .route("/api/scout/archive", post(scout::archive))
        .route("/api/matchday", get(matchday::get_state).post(matchday::update_state))
        .route("/api/matchday/parse", get(matchday::parse))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(state.clone(), auth::protect));

    let api = Router::new()
        .route("/health", get(health))
        .method_not_allowed_fallback(method_not_allowed)
        .merge(auth_api)
        .merge(protected_api)
        .layer(middleware::from_fn(security_and_cors));

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .merge(api)
        .fallback(gated_static)
        .with_state(state)
}

/// `GET /health` — liveness probe, fully public.
async fn health() -> Response {
    Json(json!({ "status": "ok", "timestamp": now_rfc3339() })).into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

// =============================================================================
// SECURITY HEADERS + CORS
// =============================================================================

/// Default allow-list when `ALLOWED_ORIGINS` is unset.
const DEFAULT_ORIGINS: [&str; 3] = [
    "http://localhost:8080",
    "http://127.0.0.1:8080",
    "http://localhost:3000",
];

/// Is `origin` permitted by `ALLOWED_ORIGINS` (comma-separated) or the
/// localhost defaults?
pub(crate) fn origin_allowed(origin: &str) -> bool {
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(configured) if !configured.is_empty() => {
            origin_in_list(origin, configured.split(','))
        }
        _ => origin_in_list(origin, DEFAULT_ORIGINS.into_iter()),
    }
}

fn origin_in_list<'a>(origin: &str, mut list: impl Iterator<Item = &'a str>) -> bool {
    list.any(|allowed| allowed.trim() == origin)
}

/// Stamp the security headers on every response; echo CORS headers only
/// for allow-listed origins. Preflight requests short-circuit to 200.
async fn security_and_cors(req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = res.headers_mut();
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if let Some(origin) = origin.filter(|o| origin_allowed(o)) {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, Authorization"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    res
}

// =============================================================================
// GATED STATIC FILES
// =============================================================================

/// Paths served without a session. Overlays stay public so stream
/// composition tools can embed them.
pub(crate) fn is_public_path(path: &str) -> bool {
    matches!(path, "/login.html" | "/health" | "/favicon.ico" | "/styles.css")
        || path.starts_with("/overlay/")
}

/// Fallback handler: everything that is not an API route is a static
/// file, rate-limited and (outside the public set) session-gated. Bots
/// are deliberately not filtered here.
async fn gated_static(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    req: Request,
) -> Response {
    let ip = crate::services::auth::client_ip(req.headers(), addr);
    if !state.auth.limiter.allow(&ip, auth::REQUEST_LIMIT, auth::LIMIT_WINDOW) {
        return auth::rate_limited_response();
    }

    if !is_public_path(req.uri().path()) {
        let id = jar.get(auth::COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if state.auth.sessions.get(id).await.is_none() {
            return auth::login_redirect();
        }
        state.auth.sessions.touch(id).await;
    }

    match ServeDir::new(&state.web_dir).oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
