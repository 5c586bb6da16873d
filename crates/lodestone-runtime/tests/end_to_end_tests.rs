// End-to-end: a server side and a client side booted over one shared wire,
// talking through channels opened from lifecycle hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use lodestone_runtime::{
    Module, PeerId, RateLimit, Runtime, RuntimeContext, Scope, Side, Wire,
};

/// Server module hosting a rate-limited trade channel with an invoke
/// responder.
struct TradeDesk {
    offers: Arc<Mutex<Vec<(PeerId, Value)>>>,
}

#[async_trait]
impl Module for TradeDesk {
    fn identity(&self) -> &str {
        "trade-desk"
    }

    fn scope(&self) -> Scope {
        Scope::Server
    }

    async fn on_init(&self, ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        let channel = ctx.server_channel("Trade", Some(RateLimit::new(2, 1.0)));

        let offers = Arc::clone(&self.offers);
        // Held for the process lifetime.
        std::mem::forget(channel.subscribe(move |sender, payload| {
            offers.lock().push((sender, payload.clone()));
        }));

        channel.on_invoke(|sender, payload| {
            json!({
                "accepted": payload["item"] == json!("sword"),
                "trader": sender.0,
            })
        });
        Ok(())
    }
}

/// Client module that trades once the side has started.
struct Trader {
    responses: Arc<Mutex<Vec<Option<Value>>>>,
}

#[async_trait]
impl Module for Trader {
    fn identity(&self) -> &str {
        "trader"
    }

    fn scope(&self) -> Scope {
        Scope::Client
    }

    async fn on_start(&self, ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        let channel = ctx
            .client_channel("Trade")
            .ok_or_else(|| anyhow::anyhow!("client side must have a peer"))?;

        channel.fire(true, json!({ "item": "shield" }));

        let response = channel
            .invoke(Duration::from_secs(1), json!({ "item": "sword" }))
            .await?;
        self.responses.lock().push(response);
        Ok(())
    }
}

#[tokio::test]
async fn two_sides_trade_over_a_shared_wire() {
    let wire = Wire::new(RateLimit::default());
    let offers = Arc::new(Mutex::new(Vec::new()));
    let responses = Arc::new(Mutex::new(Vec::new()));

    let server = Runtime::builder()
        .with_wire(wire.clone())
        .module(TradeDesk {
            offers: Arc::clone(&offers),
        })
        .build();
    server.start(Side::Server).await.unwrap();

    let client = Runtime::builder()
        .with_wire(wire.clone())
        .with_client_peer(PeerId(42))
        .module(Trader {
            responses: Arc::clone(&responses),
        })
        .build();
    client.start(Side::Client).await.unwrap();

    {
        let offers = offers.lock();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].0, PeerId(42));
        assert_eq!(offers[0].1, json!({ "item": "shield" }));
    }

    let responses = responses.lock();
    assert_eq!(
        responses.as_slice(),
        &[Some(json!({ "accepted": true, "trader": 42 }))]
    );
}

/// Server module broadcasting a tick counter to everyone connected.
struct Broadcaster;

#[async_trait]
impl Module for Broadcaster {
    fn identity(&self) -> &str {
        "broadcaster"
    }

    fn scope(&self) -> Scope {
        Scope::Server
    }

    async fn on_init(&self, ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        // Channel exists before any client connects.
        ctx.server_channel("Tick", None);
        Ok(())
    }
}

#[tokio::test]
async fn broadcasts_reach_every_connected_peer() {
    let wire = Wire::new(RateLimit::default());
    let server = Runtime::builder()
        .with_wire(wire.clone())
        .module(Broadcaster)
        .build();
    let server_ctx = server.start(Side::Server).await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    for id in [10, 11, 12] {
        let peer = wire.connect(PeerId(id));
        let sink = Arc::clone(&hits);
        std::mem::forget(peer.open("Tick").subscribe(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let channel = server_ctx.server_channel("Tick", None);
    channel.fire_all(true, json!({ "tick": 1 }));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    channel.fire_except(true, PeerId(11), json!({ "tick": 2 }));
    assert_eq!(hits.load(Ordering::SeqCst), 5);

    // Shutdown tears the wire down with the rest of the side.
    server.shutdown().await;
    assert!(wire.connected_peers().is_empty());
}
