//! Relay hub — connection registry and message fan-out.
//!
//! ARCHITECTURE
//! ============
//! The registry holds at most one controller peer and any number of
//! browser peers. Registry mutations (register, unregister, broadcast)
//! flow through a single event channel drained by one hub task, so they
//! apply in arrival order. Routing between live peers is done directly
//! from the peer read pumps under a read lock.
//!
//! Every outbound enqueue is a `try_send` against a bounded per-peer
//! queue: a slow or stuck browser drops frames instead of stalling the
//! hub or the controller. Dropped clients reconverge on their next full
//! sync.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};

/// Per-peer outbound queue depth. Overflow drops frames for that peer.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Hub event queue depth.
const EVENT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// PEERS
// =============================================================================

/// Connection role, taken from the upgrade query. The wire value
/// `moblin` is the historical name for the controller peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Controller,
    Browser,
}

impl PeerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Browser => "browser",
        }
    }
}

impl std::fmt::Display for PeerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered WebSocket connection.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: String,
    pub kind: PeerKind,
    /// True once the WS-level password handshake passed (or no password
    /// is configured). Flipped by the peer's read pump.
    pub authorized: Arc<AtomicBool>,
    /// Outbound frame queue; the write pump drains it.
    pub tx: mpsc::Sender<String>,
}

impl Peer {
    /// Build a peer and the receiving half of its send queue.
    #[must_use]
    pub fn new(kind: PeerKind, authorized: bool) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let peer = Self {
            id: format!("{kind}-{nanos}"),
            kind,
            authorized: Arc::new(AtomicBool::new(authorized)),
            tx,
        };
        (peer, rx)
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Relaxed)
    }

    pub fn set_authorized(&self, value: bool) {
        self.authorized.store(value, Ordering::Relaxed);
    }

    /// Best-effort enqueue; a full queue drops the frame for this peer.
    pub fn try_send(&self, frame: &str) {
        let _ = self.tx.try_send(frame.to_string());
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
struct Registry {
    /// The singleton controller slot. A newly registered controller
    /// replaces the previous occupant.
    controller: Option<Peer>,
    browsers: HashMap<String, Peer>,
}

// =============================================================================
// HUB
// =============================================================================

pub enum HubEvent {
    Register(Peer),
    Unregister(String),
    Broadcast(String),
}

#[derive(Clone)]
pub struct Relay {
    registry: Arc<RwLock<Registry>>,
    events: mpsc::Sender<HubEvent>,
    password: String,
}

impl Relay {
    /// Build the relay and the event receiver for [`Relay::run`]. An
    /// empty password disables the WS-level auth handshake.
    #[must_use]
    pub fn new(password: String) -> (Self, mpsc::Receiver<HubEvent>) {
        let (events, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let relay = Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            events,
            password,
        };
        (relay, rx)
    }

    /// The hub task: drains registry events in arrival order.
    pub async fn run(self, mut rx: mpsc::Receiver<HubEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event).await;
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    // -------------------------------------------------------------------------
    // event producers
    // -------------------------------------------------------------------------

    pub async fn register(&self, peer: Peer) {
        let _ = self.events.send(HubEvent::Register(peer)).await;
    }

    pub async fn unregister(&self, peer_id: String) {
        let _ = self.events.send(HubEvent::Unregister(peer_id)).await;
    }

    /// Queue a frame for every registered peer.
    pub async fn broadcast(&self, frame: String) {
        let _ = self.events.send(HubEvent::Broadcast(frame)).await;
    }

    // -------------------------------------------------------------------------
    // event handling
    // -------------------------------------------------------------------------

    /// Apply one event inline. The hub task calls this for every event
    /// it receives.
    pub(crate) async fn apply(&self, event: HubEvent) {
        match event {
            HubEvent::Register(peer) => self.handle_register(peer).await,
            HubEvent::Unregister(peer_id) => self.handle_unregister(&peer_id).await,
            HubEvent::Broadcast(frame) => self.handle_broadcast(&frame).await,
        }
    }

    async fn handle_register(&self, peer: Peer) {
        let mut registry = self.registry.write().await;
        match peer.kind {
            PeerKind::Controller => {
                if let Some(previous) = registry.controller.replace(peer.clone()) {
                    warn!(previous = %previous.id, current = %peer.id, "controller replaced");
                } else {
                    info!(peer = %peer.id, "controller connected");
                }
                notify_browsers(&registry, &lifecycle_frame("controller_connected"));
            }
            PeerKind::Browser => {
                registry.browsers.insert(peer.id.clone(), peer.clone());
                info!(peer = %peer.id, total = registry.browsers.len(), "browser connected");
            }
        }
    }

    /// Idempotent. Removing the peer from the registry drops the hub's
    /// handle on its send queue, which lets the write pump finish once
    /// the peer task releases its own handle.
    async fn handle_unregister(&self, peer_id: &str) {
        let mut registry = self.registry.write().await;

        // EDGE: a replaced controller's late unregister must not clear
        // the slot now occupied by its successor.
        if registry.controller.as_ref().is_some_and(|c| c.id == peer_id) {
            registry.controller = None;
            info!(peer = %peer_id, "controller disconnected");
            notify_browsers(&registry, &lifecycle_frame("controller_disconnected"));
            return;
        }

        if registry.browsers.remove(peer_id).is_some() {
            info!(peer = %peer_id, remaining = registry.browsers.len(), "browser disconnected");
        }
    }

    async fn handle_broadcast(&self, frame: &str) {
        let registry = self.registry.read().await;
        if let Some(controller) = &registry.controller {
            controller.try_send(frame);
        }
        for browser in registry.browsers.values() {
            browser.try_send(frame);
        }
    }

    // -------------------------------------------------------------------------
    // routing (called from peer read pumps)
    // -------------------------------------------------------------------------

    /// Controller traffic fans out to every authorized browser.
    pub async fn route_to_browsers(&self, frame: &str) {
        let registry = self.registry.read().await;
        for browser in registry.browsers.values() {
            if browser.is_authorized() {
                browser.try_send(frame);
            }
        }
    }

    /// Browser traffic goes to the controller; without one the frame is
    /// dropped and the client is expected to tolerate it.
    pub async fn route_to_controller(&self, frame: &str) {
        let registry = self.registry.read().await;
        if let Some(controller) = &registry.controller {
            controller.try_send(frame);
        }
    }

    #[cfg(test)]
    async fn controller_id(&self) -> Option<String> {
        self.registry.read().await.controller.as_ref().map(|c| c.id.clone())
    }

    #[cfg(test)]
    async fn browser_count(&self) -> usize {
        self.registry.read().await.browsers.len()
    }
}

fn lifecycle_frame(kind: &str) -> String {
    serde_json::json!({ "type": kind }).to_string()
}

fn notify_browsers(registry: &Registry, frame: &str) {
    for browser in registry.browsers.values() {
        browser.try_send(frame);
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
