// Integration tests for channel messaging: fire, broadcast, invoke and
// per-sender rate limiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use lodestone_core::id::PeerId;
use lodestone_core::rate_limit::RateLimit;
use lodestone_net::{NetError, Wire};

fn wire() -> Wire {
    Wire::new(RateLimit::new(100, 1.0))
}

#[tokio::test]
async fn fire_reaches_one_subscriber_with_sender_identity() {
    let wire = wire();
    let server = wire.server("Chat", None);
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Chat");

    let seen: Arc<Mutex<Vec<(PeerId, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = server.subscribe(move |sender, payload| {
        sink.lock().push((sender, payload.clone()));
    });

    client.fire(true, json!({ "text": "hello" }));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, PeerId(1));
    assert_eq!(seen[0].1, json!({ "text": "hello" }));
}

#[tokio::test]
async fn open_by_name_returns_the_same_channel() {
    let wire = wire();
    let first = wire.server("Trade", None);
    let second = wire.server("Trade", None);

    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let _sub = first.subscribe(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    // A fire through the second handle must reach the first handle's
    // subscriber: they are the same underlying channel.
    let peer = wire.connect(PeerId(5));
    peer.open("Trade").fire(true, json!(1));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(second.subscriber_count(), 1);
}

#[tokio::test]
async fn fire_all_and_fire_except_cover_connected_peers() {
    let wire = wire();
    let server = wire.server("Announce", None);

    let log: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let mut peers = Vec::new();
    for id in [1u32, 2, 3] {
        let peer = wire.connect(PeerId(id));
        let channel = peer.open("Announce");
        let sink = Arc::clone(&log);
        // Subscriptions held for the test's duration.
        std::mem::forget(channel.subscribe(move |_| sink.lock().push(id)));
        peers.push(peer);
    }

    server.fire_all(true, json!("to everyone"));
    {
        let mut seen = log.lock();
        seen.sort_unstable();
        assert_eq!(*seen, vec![1, 2, 3]);
        seen.clear();
    }

    server.fire_except(true, PeerId(2), json!("not for 2"));
    let mut seen = log.lock().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 3]);
}

#[tokio::test]
async fn rate_limited_fires_are_dropped() {
    let wire = wire();
    let server = wire.server("Trade", Some(RateLimit::new(2, 1.0)));
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Trade");

    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let _sub = server.subscribe(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    // Three rapid fires from the same sender: only two may land.
    for _ in 0..3 {
        client.fire(true, json!("spam"));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limiter_is_per_sender() {
    let wire = wire();
    let server = wire.server("Trade", Some(RateLimit::new(1, 10.0)));
    let first = wire.connect(PeerId(1));
    let second = wire.connect(PeerId(2));

    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let _sub = server.subscribe(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    first.open("Trade").fire(true, json!(1));
    first.open("Trade").fire(true, json!(2)); // over limit, dropped
    second.open("Trade").fire(true, json!(3)); // separate bucket

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invoke_round_trips_through_the_responder() {
    let wire = wire();
    let server = wire.server("Math", None);
    server.on_invoke(|sender, payload| {
        let n = payload["n"].as_i64().unwrap_or(0);
        json!({ "doubled": n * 2, "from": sender.0 })
    });

    let peer = wire.connect(PeerId(9));
    let client = peer.open("Math");
    let response = client
        .invoke(Duration::from_secs(1), json!({ "n": 21 }))
        .await
        .unwrap();

    assert_eq!(response, Some(json!({ "doubled": 42, "from": 9 })));
}

#[tokio::test]
async fn server_can_invoke_a_peer() {
    let wire = wire();
    let server = wire.server("Ping", None);
    let peer = wire.connect(PeerId(3));
    let client = peer.open("Ping");
    client.on_invoke(|payload| json!({ "echo": payload.clone() }));

    let response = server
        .invoke(Duration::from_secs(1), PeerId(3), json!("ping"))
        .await
        .unwrap();
    assert_eq!(response, Some(json!({ "echo": "ping" })));
}

#[tokio::test(start_paused = true)]
async fn invoke_without_responder_times_out_to_none() {
    let wire = wire();
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Nobody");

    let before = tokio::time::Instant::now();
    let response = client
        .invoke(Duration::from_secs(3), json!("anyone?"))
        .await
        .unwrap();
    let waited = before.elapsed();

    assert_eq!(response, None);
    assert!(waited >= Duration::from_secs(3), "resolved early: {waited:?}");
}

#[tokio::test]
async fn rate_limited_invoke_rejects_without_waiting() {
    let wire = wire();
    let _server = wire.server("Busy", Some(RateLimit::new(1, 60.0)));
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Busy");

    // First request consumes the only token (and times out quickly with no
    // responder); the second must be rejected immediately.
    let _ = client.invoke(Duration::from_millis(10), json!(1)).await;

    let before = Instant::now();
    let outcome = client.invoke(Duration::from_secs(30), json!(2)).await;
    assert_eq!(outcome, Err(NetError::RateLimited));
    assert!(
        before.elapsed() < Duration::from_secs(1),
        "rejection should not wait for the timeout"
    );
}

#[tokio::test]
async fn handler_added_during_dispatch_misses_that_broadcast() {
    let wire = wire();
    let server = wire.server("Snap", None);
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Snap");

    let late_hits = Arc::new(AtomicUsize::new(0));
    let server_for_handler = server.clone();
    let late_hits_for_handler = Arc::clone(&late_hits);
    let _sub = server.subscribe(move |_, _| {
        let counter = Arc::clone(&late_hits_for_handler);
        // Subscribing mid-dispatch: the new handler must not see the
        // broadcast that is currently being delivered.
        std::mem::forget(server_for_handler.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    });

    client.fire(true, json!("first"));
    assert_eq!(late_hits.load(Ordering::SeqCst), 0);

    client.fire(true, json!("second"));
    assert_eq!(late_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribe_removes_the_handler() {
    let wire = wire();
    let server = wire.server("Once", None);
    let peer = wire.connect(PeerId(1));
    let client = peer.open("Once");

    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let sub = server.subscribe(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    client.fire(true, json!(1));
    sub.unsubscribe();
    client.fire(true, json!(2));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(server.subscriber_count(), 0);
}

#[tokio::test]
async fn disconnect_discards_rate_limiter_state() {
    let wire = wire();
    let server = wire.server("Trade", Some(RateLimit::new(1, 3600.0)));
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let _sub = server.subscribe(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let peer = wire.connect(PeerId(1));
    peer.open("Trade").fire(true, json!(1));
    peer.open("Trade").fire(true, json!(2)); // bucket empty for an hour
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    peer.disconnect();

    // A reconnecting sender starts fresh.
    let peer = wire.connect(PeerId(1));
    peer.open("Trade").fire(true, json!(3));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fire_to_absent_peer_is_dropped_silently() {
    let wire = wire();
    let server = wire.server("Void", None);
    // No peer ever opened this channel; both reliable and unreliable fires
    // just vanish.
    server.fire(true, PeerId(404), json!("anyone there?"));
    server.fire(false, PeerId(404), json!("still nothing"));
}
