//! WebSocket endpoint — peer classification and the per-connection
//! read/write pumps.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (origin-checked) → classify peer from `?type=` → register
//! 2. Write pump drains the send queue; pings every 30s
//! 3. Read pump decodes frames: `auth` handled locally, the rest routed
//!    raw so unknown fields survive the hop
//! 4. Read exit → unregister; the closed send queue ends the write pump

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::relay::{Peer, PeerKind, Relay};
use crate::routes::origin_allowed;
use crate::state::AppState;

/// Largest accepted inbound frame.
const READ_LIMIT: usize = 64 * 1024;

/// A peer that stays silent (no data, no pong) this long is dropped.
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Budget for a single outbound write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// UPGRADE
// =============================================================================

/// The fields the relay itself interprets. Everything else in a frame
/// is opaque payload for the other side.
#[derive(Debug, Deserialize)]
struct FrameProbe {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    password: Option<String>,
}

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if !origin_allowed(origin) {
            return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }

    let kind = classify(&params);
    ws.max_message_size(READ_LIMIT)
        .on_upgrade(move |socket| run_peer(socket, state, kind))
}

/// `?type=moblin` is the controller peer's historical wire identity;
/// everything else is a browser.
fn classify(params: &HashMap<String, String>) -> PeerKind {
    if params.get("type").map(String::as_str) == Some("moblin") {
        PeerKind::Controller
    } else {
        PeerKind::Browser
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_peer(socket: WebSocket, state: AppState, kind: PeerKind) {
    let (peer, queue_rx) = Peer::new(kind, state.relay.password().is_empty());
    info!(peer = %peer.id, "ws: peer connected");

    state.relay.register(peer.clone()).await;

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, queue_rx));

    // Either side exiting tears the connection down: dropping the read
    // half closes the socket, and a finished read half means the peer is
    // gone anyway.
    let writer_done = tokio::select! {
        _ = &mut writer => true,
        () = read_pump(stream, &peer, &state.relay) => false,
    };

    state.relay.unregister(peer.id.clone()).await;
    info!(peer = %peer.id, "ws: peer disconnected");

    // Dropping our queue handle (with the registry's already gone) closes
    // the send queue and lets the write pump finish with a close frame.
    drop(peer);
    if !writer_done {
        let _ = writer.await;
    }
}

/// Drains the send queue into the socket. Exits on queue closure (after
/// sending a close frame) or on any write error or timeout.
async fn write_pump(mut sink: SplitSink<WebSocket, Message>, mut queue_rx: mpsc::Receiver<String>) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_frame = queue_rx.recv() => {
                let Some(frame) = maybe_frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                match timeout(WRITE_TIMEOUT, sink.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_TIMEOUT, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
        }
    }
}

/// Reads frames until error, close, or 60s of silence. Pongs (and any
/// other traffic) reset the deadline.
async fn read_pump(mut stream: SplitStream<WebSocket>, peer: &Peer, relay: &Relay) {
    loop {
        let message = match timeout(READ_DEADLINE, stream.next()).await {
            Err(_) => {
                warn!(peer = %peer.id, "ws: read deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(_))) => return,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => handle_frame(peer, relay, text.as_str()).await,
            Message::Close(_) => return,
            // Pings are answered by the protocol layer; both directions
            // only matter here as liveness signals.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

// =============================================================================
// FRAME HANDLING
// =============================================================================

async fn handle_frame(peer: &Peer, relay: &Relay, text: &str) {
    let probe: FrameProbe = match serde_json::from_str(text) {
        Ok(probe) => probe,
        Err(e) => {
            warn!(peer = %peer.id, error = %e, "ws: undecodable frame skipped");
            return;
        }
    };

    // The auth handshake never propagates to the other side.
    if probe.kind == "auth" {
        let password = relay.password();
        if password.is_empty() || probe.password.as_deref() == Some(password) {
            peer.set_authorized(true);
            peer.try_send(&serde_json::json!({ "type": "auth_success", "status": "ok" }).to_string());
        } else {
            warn!(peer = %peer.id, "ws: auth failed");
            peer.try_send(
                &serde_json::json!({
                    "type": "auth_failed",
                    "status": "error",
                    "message": "Invalid password",
                })
                .to_string(),
            );
        }
        return;
    }

    if !peer.is_authorized() && !relay.password().is_empty() {
        peer.try_send(
            &serde_json::json!({ "type": "error", "message": "Not authorized" }).to_string(),
        );
        return;
    }

    // Route the raw text so fields the relay does not know survive.
    match peer.kind {
        PeerKind::Controller => relay.route_to_browsers(text).await,
        PeerKind::Browser => relay.route_to_controller(text).await,
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
