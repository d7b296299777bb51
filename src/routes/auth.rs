//! Auth routes — PIN login, logout, session probe, and the admission
//! middlewares protecting the rest of the API.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::services::auth::{client_ip, is_bot};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "vb_session";

/// General per-IP budget for API requests.
pub(crate) const REQUEST_LIMIT: usize = 100;
/// Separate, tighter budget for PIN attempts. Keyed `ip:login` so it
/// cannot be diluted by other traffic from the same address.
const LOGIN_LIMIT: usize = 5;
pub(crate) const LIMIT_WINDOW: Duration = Duration::from_secs(60);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AuthResponse {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            authenticated: None,
            expires_at: None,
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/auth/login` — verify the PIN and mint a session cookie.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let ip = client_ip(&headers, addr);

    // The login budget is spent before the PIN is ever consulted.
    let login_key = format!("{ip}:login");
    if !state.auth.limiter.allow(&login_key, LOGIN_LIMIT, LIMIT_WINDOW) {
        warn!(%ip, "rate limited login");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(AuthResponse::failure("Too many attempts")),
        )
            .into_response();
    }

    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::failure("Invalid request")),
        )
            .into_response();
    };

    if !state.auth.verify_pin(&req.pin) {
        warn!(%ip, "failed login attempt");
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse::failure("Invalid PIN")),
        )
            .into_response();
    }

    let user_agent = header_str(&headers, header::USER_AGENT);
    let session = state.auth.sessions.create(user_agent, &ip).await;
    info!(%ip, "successful login");

    let jar = CookieJar::new().add(session_cookie(&session.id));
    let body = AuthResponse {
        success: true,
        message: None,
        authenticated: Some(true),
        expires_at: Some(session.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    };
    (jar, Json(body)).into_response()
}

/// `POST /api/auth/logout` — delete the session, clear the cookie.
/// Idempotent: succeeds with or without a live session.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(COOKIE_NAME) {
        state.auth.sessions.delete(cookie.value()).await;
    }

    let body = AuthResponse {
        success: true,
        message: None,
        authenticated: None,
        expires_at: None,
    };
    ([(header::SET_COOKIE, clear_cookie_value())], Json(body)).into_response()
}

/// `GET /api/auth/session` — probe the cookie's session.
pub async fn session(State(state): State<AppState>, jar: CookieJar) -> Response {
    let id = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
    let Some(session) = state.auth.sessions.get(id).await else {
        let body = AuthResponse {
            success: false,
            message: None,
            authenticated: None,
            expires_at: None,
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    };

    state.auth.sessions.touch(id).await;
    let body = AuthResponse {
        success: true,
        message: None,
        authenticated: Some(true),
        expires_at: Some(session.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    };
    Json(body).into_response()
}

// =============================================================================
// ADMISSION MIDDLEWARE
// =============================================================================

/// Full admission path: rate limit, bot filter, session check + touch.
pub async fn protect(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), addr);

    if !state.auth.limiter.allow(&ip, REQUEST_LIMIT, LIMIT_WINDOW) {
        warn!(%ip, "rate limited");
        return rate_limited_response();
    }

    let user_agent = header_str(req.headers(), header::USER_AGENT);
    if is_bot(user_agent) {
        warn!(%ip, %user_agent, "bot blocked");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Automated access not allowed" })),
        )
            .into_response();
    }

    let id = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
    if state.auth.sessions.get(id).await.is_none() {
        return unauthorized_response(req.headers());
    }

    state.auth.sessions.touch(id).await;
    next.run(req).await
}

/// Lighter path for unauthenticated endpoints: rate limit only.
pub async fn public(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), addr);
    if !state.auth.limiter.allow(&ip, REQUEST_LIMIT, LIMIT_WINDOW) {
        return rate_limited_response();
    }
    next.run(req).await
}

/// JSON clients get a 401; anything else is redirected to the login
/// page. A client that names neither gets the redirect.
pub(crate) fn unauthorized_response(headers: &HeaderMap) -> Response {
    if header_str(headers, header::ACCEPT) == "application/json" {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    } else {
        login_redirect()
    }
}

/// 302 to the login page. Axum's `Redirect` only offers 303/307/308.
pub(crate) fn login_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/login.html")]).into_response()
}

pub(crate) fn rate_limited_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Too many requests" })),
    )
        .into_response()
}

// =============================================================================
// COOKIES
// =============================================================================

fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build()
}

/// Hand-built clear cookie: the cookie builder cannot emit the
/// `Max-Age=-1` clear form.
fn clear_cookie_value() -> String {
    format!("{COOKIE_NAME}=; Path=/; HttpOnly; Max-Age=-1")
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
