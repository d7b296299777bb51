use super::*;
use tokio::time::{Duration, timeout};

async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> String {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("send queue closed unexpectedly")
}

fn frame_type(frame: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(frame).expect("frame should be JSON");
    value["type"].as_str().unwrap_or_default().to_string()
}

fn relay() -> Relay {
    Relay::new(String::new()).0
}

// =============================================================================
// peer ids
// =============================================================================

#[test]
fn peer_id_carries_kind_prefix() {
    let (controller, _rx) = Peer::new(PeerKind::Controller, true);
    let (browser, _rx) = Peer::new(PeerKind::Browser, true);
    assert!(controller.id.starts_with("controller-"));
    assert!(browser.id.starts_with("browser-"));
}

#[test]
fn peer_ids_differ() {
    let (a, _rx_a) = Peer::new(PeerKind::Browser, true);
    let (b, _rx_b) = Peer::new(PeerKind::Browser, true);
    assert_ne!(a.id, b.id);
}

// =============================================================================
// registration + lifecycle frames
// =============================================================================

#[tokio::test]
async fn registered_browser_receives_broadcast() {
    let relay = relay();
    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(browser)).await;

    relay.apply(HubEvent::Broadcast(r#"{"type":"scout_update","version":3}"#.into())).await;

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame_type(&frame), "scout_update");
}

#[tokio::test]
async fn browser_registered_after_broadcast_misses_it() {
    let relay = relay();
    relay.apply(HubEvent::Broadcast(r#"{"type":"scout_update","version":3}"#.into())).await;

    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(browser)).await;

    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn controller_register_notifies_browsers() {
    let relay = relay();
    let (b1, mut rx1) = Peer::new(PeerKind::Browser, true);
    let (b2, mut rx2) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(b1)).await;
    relay.apply(HubEvent::Register(b2)).await;

    let (controller, _crx) = Peer::new(PeerKind::Controller, true);
    relay.apply(HubEvent::Register(controller)).await;

    assert_eq!(frame_type(&recv_frame(&mut rx1).await), "controller_connected");
    assert_eq!(frame_type(&recv_frame(&mut rx2).await), "controller_connected");
}

#[tokio::test]
async fn controller_unregister_notifies_browsers() {
    let relay = relay();
    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(browser)).await;

    let (controller, _crx) = Peer::new(PeerKind::Controller, true);
    let controller_id = controller.id.clone();
    relay.apply(HubEvent::Register(controller)).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "controller_connected");

    relay.apply(HubEvent::Unregister(controller_id)).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "controller_disconnected");
    assert!(relay.controller_id().await.is_none());
}

#[tokio::test]
async fn replaced_controller_unregister_keeps_new_slot() {
    // S4: C1 connects, C2 replaces it, C1's late disconnect must neither
    // clear the slot nor emit controller_disconnected.
    let relay = relay();
    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(browser)).await;

    let (c1, _rx1) = Peer::new(PeerKind::Controller, true);
    let c1_id = c1.id.clone();
    relay.apply(HubEvent::Register(c1)).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "controller_connected");

    let (c2, _rx2) = Peer::new(PeerKind::Controller, true);
    let c2_id = c2.id.clone();
    relay.apply(HubEvent::Register(c2)).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "controller_connected");

    relay.apply(HubEvent::Unregister(c1_id)).await;
    assert_eq!(relay.controller_id().await, Some(c2_id.clone()));
    assert!(
        timeout(Duration::from_millis(50), rx.recv()).await.is_err(),
        "no controller_disconnected while the slot is occupied"
    );

    relay.apply(HubEvent::Unregister(c2_id)).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "controller_disconnected");
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let relay = relay();
    let (browser, _rx) = Peer::new(PeerKind::Browser, true);
    let id = browser.id.clone();
    relay.apply(HubEvent::Register(browser)).await;

    relay.apply(HubEvent::Unregister(id.clone())).await;
    relay.apply(HubEvent::Unregister(id)).await;
    assert_eq!(relay.browser_count().await, 0);
}

#[tokio::test]
async fn unregister_closes_send_queue() {
    let relay = relay();
    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    let id = browser.id.clone();
    relay.apply(HubEvent::Register(browser)).await;

    relay.apply(HubEvent::Unregister(id)).await;
    // The registry held the only sender, so the queue is now closed.
    assert!(rx.recv().await.is_none());
}

// =============================================================================
// routing
// =============================================================================

#[tokio::test]
async fn controller_traffic_reaches_authorized_browsers_only() {
    let relay = relay();
    let (authorized, mut rx_ok) = Peer::new(PeerKind::Browser, true);
    let (unauthorized, mut rx_no) = Peer::new(PeerKind::Browser, false);
    relay.apply(HubEvent::Register(authorized)).await;
    relay.apply(HubEvent::Register(unauthorized)).await;

    relay.route_to_browsers(r#"{"type":"scene","name":"main"}"#).await;

    let frame = recv_frame(&mut rx_ok).await;
    assert_eq!(frame, r#"{"type":"scene","name":"main"}"#);
    assert!(timeout(Duration::from_millis(50), rx_no.recv()).await.is_err());
}

#[tokio::test]
async fn browser_traffic_reaches_controller_verbatim() {
    let relay = relay();
    let (controller, mut crx) = Peer::new(PeerKind::Controller, true);
    relay.apply(HubEvent::Register(controller)).await;

    // Unknown fields pass through untouched.
    let raw = r#"{"type":"zoom","level":2.5,"custom":{"x":1}}"#;
    relay.route_to_controller(raw).await;
    assert_eq!(recv_frame(&mut crx).await, raw);
}

#[tokio::test]
async fn browser_traffic_without_controller_is_dropped() {
    let relay = relay();
    // No controller registered; must not panic or block.
    relay.route_to_controller(r#"{"type":"zoom"}"#).await;
}

#[tokio::test]
async fn late_authorization_enables_routing() {
    let relay = relay();
    let (browser, mut rx) = Peer::new(PeerKind::Browser, false);
    let flag = browser.authorized.clone();
    relay.apply(HubEvent::Register(browser)).await;

    relay.route_to_browsers(r#"{"type":"scene"}"#).await;
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());

    flag.store(true, Ordering::Relaxed);
    relay.route_to_browsers(r#"{"type":"scene"}"#).await;
    assert_eq!(frame_type(&recv_frame(&mut rx).await), "scene");
}

// =============================================================================
// slow consumers
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn slow_browser_drops_frames_without_stalling_the_fast_one() {
    // S5: the slow peer never reads; its queue saturates at capacity and
    // later frames drop for it alone. The fast peer sees every frame in
    // order and the fan-out never blocks.
    let relay = relay();
    let (slow, mut slow_rx) = Peer::new(PeerKind::Browser, true);
    let (fast, mut fast_rx) = Peer::new(PeerKind::Browser, true);
    relay.apply(HubEvent::Register(slow)).await;
    relay.apply(HubEvent::Register(fast)).await;

    let total = SEND_QUEUE_CAPACITY + 100;
    let fast_reader = tokio::spawn(async move {
        let mut frames = Vec::new();
        while frames.len() < total {
            match timeout(Duration::from_secs(2), fast_rx.recv()).await {
                Ok(Some(frame)) => frames.push(frame),
                _ => break,
            }
        }
        frames
    });

    for i in 0..total {
        relay.route_to_browsers(&format!(r#"{{"type":"tick","seq":{i}}}"#)).await;
        tokio::task::yield_now().await;
    }

    let fast_frames = fast_reader.await.unwrap();
    assert_eq!(fast_frames.len(), total);
    for (i, frame) in fast_frames.iter().enumerate() {
        assert!(frame.contains(&format!("\"seq\":{i}")), "out of order at {i}");
    }

    // The slow queue holds exactly its capacity; the rest was dropped.
    let mut slow_count = 0;
    while let Ok(Some(_)) = timeout(Duration::from_millis(50), slow_rx.recv()).await {
        slow_count += 1;
    }
    assert_eq!(slow_count, SEND_QUEUE_CAPACITY);
}

// =============================================================================
// hub task ordering
// =============================================================================

#[tokio::test]
async fn hub_task_applies_events_in_arrival_order() {
    let (relay, events_rx) = Relay::new(String::new());
    tokio::spawn(relay.clone().run(events_rx));

    let (browser, mut rx) = Peer::new(PeerKind::Browser, true);
    relay.register(browser).await;
    relay.broadcast(r#"{"type":"matchday_update","version":2}"#.into()).await;

    // Register was enqueued first, so the broadcast must land.
    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame_type(&frame), "matchday_update");
}
