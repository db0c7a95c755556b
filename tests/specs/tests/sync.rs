// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! End-to-end synchronization tests against an in-process backend stub:
//! queueing while connecting, credentialed handshakes, broadcast-driven
//! state transitions, and reconnect behavior.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use huddle::config::Config;
use huddle::countdown::seconds_left;
use huddle::identity::{IdentityStore, MemoryKv};
use huddle::store::RoomService;

use huddle_specs::{wait_for, StubServer};

const TIMEOUT: Duration = Duration::from_secs(10);
const QUIET: Duration = Duration::from_millis(300);

fn service(server: &StubServer) -> RoomService {
    service_with(server, Arc::new(IdentityStore::new(Box::new(MemoryKv::new()))))
}

fn service_with(server: &StubServer, identity: Arc<IdentityStore>) -> RoomService {
    let config = Config {
        ws_url: server.ws_base(),
        reconnect_base: Duration::from_millis(50),
        ..Config::default()
    };
    RoomService::new(config, identity)
}

// -- Queueing -----------------------------------------------------------------

#[tokio::test]
async fn actions_queue_until_the_handshake_completes() -> anyhow::Result<()> {
    let mut server = StubServer::start_gated().await?;
    let svc = service(&server);

    svc.connect_id("r1").await;
    svc.send_message("one").await;
    svc.create_proposal("charades").await;
    svc.send_message("two").await;

    // Nothing may leave the client before the connection is live.
    server.no_action_within(QUIET).await?;
    server.release();

    let first = server.next_action(TIMEOUT).await?;
    assert_eq!(first["type"], "chat_action");
    assert_eq!(first["message"], "one");

    let second = server.next_action(TIMEOUT).await?;
    assert_eq!(second["type"], "proposal_action");
    assert_eq!(second["proposal"], "charades");

    let third = server.next_action(TIMEOUT).await?;
    assert_eq!(third["type"], "chat_action");
    assert_eq!(third["message"], "two");

    Ok(())
}

#[tokio::test]
async fn disconnect_drops_queued_actions() -> anyhow::Result<()> {
    let mut server = StubServer::start_gated().await?;
    let svc = service(&server);

    svc.connect_id("r1").await;
    svc.send_message("never delivered").await;
    svc.disconnect().await;

    server.release();
    server.no_action_within(QUIET).await?;

    Ok(())
}

// -- Handshake ----------------------------------------------------------------

#[tokio::test]
async fn handshake_url_carries_identity() -> anyhow::Result<()> {
    let server = StubServer::start().await?;
    let identity = Arc::new(IdentityStore::new(Box::new(MemoryKv::new())));
    let username = identity.username();
    let password = identity.password();
    let svc = service_with(&server, identity);

    svc.connect_id("r7").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    let uris = server.request_uris();
    assert_eq!(uris.len(), 1);
    assert_eq!(uris[0], format!("/room/r7/?username={username}&password={password}"));

    Ok(())
}

#[tokio::test]
async fn connecting_to_the_same_room_is_idempotent() -> anyhow::Result<()> {
    let server = StubServer::start().await?;
    let svc = service(&server);

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;
    svc.connect_id("r1").await;
    tokio::time::sleep(QUIET).await;
    assert_eq!(server.handshakes(), 1);

    // A different room tears down and dials fresh.
    svc.connect_id("r2").await;
    wait_for(|| server.handshakes() == 2, TIMEOUT).await?;

    Ok(())
}

#[tokio::test]
async fn switching_rooms_resets_published_state() -> anyhow::Result<()> {
    let server = StubServer::start().await?;
    let svc = service(&server);
    let mut state_rx = svc.subscribe_state();

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    server.broadcast(&serde_json::json!({
        "type": "chat_broadcast",
        "message": "hello r1",
        "created": "2026-03-01T12:00:00Z",
        "username": "ada",
    }));
    tokio::time::timeout(TIMEOUT, async {
        loop {
            state_rx.changed().await?;
            if !state_rx.borrow().messages.is_empty() {
                return anyhow::Ok(());
            }
        }
    })
    .await??;

    svc.connect_id("r2").await;
    assert!(svc.state().messages.is_empty(), "previous room's state leaked");
    assert_eq!(svc.current_room().map(|r| r.id), Some("r2".to_owned()));

    Ok(())
}

// -- Broadcast-driven state ----------------------------------------------------

#[tokio::test]
async fn round_broadcast_drives_the_full_transition() -> anyhow::Result<()> {
    let server = StubServer::start().await?;
    let svc = service(&server);
    let mut state_rx = svc.subscribe_state();

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    let created: DateTime<Utc> = "2026-03-01T12:00:00Z".parse()?;
    server.broadcast(&serde_json::json!({
        "type": "round_broadcast",
        "id": "rnd1",
        "counter": 1,
        "duration": "00:05:00",
        "created": created,
    }));

    tokio::time::timeout(TIMEOUT, async {
        loop {
            state_rx.changed().await?;
            if state_rx.borrow().current_round.is_some() {
                return anyhow::Ok(());
            }
        }
    })
    .await??;

    let state = svc.state();
    let round = state.current_round.as_ref().ok_or_else(|| anyhow::anyhow!("round missing"))?;
    assert_eq!(round.counter, 1);
    assert_eq!(round.id, "rnd1");

    let banner = state.messages.last().ok_or_else(|| anyhow::anyhow!("no announcement"))?;
    assert_eq!(banner.message, "New Round #1 started!");

    // One second past the end: negative, not clamped.
    assert_eq!(seconds_left(Some(round), created + chrono::Duration::seconds(301)), -1);

    Ok(())
}

#[tokio::test]
async fn unknown_broadcasts_are_tolerated() -> anyhow::Result<()> {
    let server = StubServer::start().await?;
    let svc = service(&server);
    let mut state_rx = svc.subscribe_state();

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    server.broadcast(&serde_json::json!({ "type": "mystery_broadcast", "whatever": 1 }));
    server.broadcast(&serde_json::json!({
        "type": "chat_broadcast",
        "message": "still alive",
        "created": "2026-03-01T12:00:00Z",
        "username": "ada",
    }));

    tokio::time::timeout(TIMEOUT, async {
        loop {
            state_rx.changed().await?;
            if !state_rx.borrow().messages.is_empty() {
                return anyhow::Ok(());
            }
        }
    })
    .await??;

    assert_eq!(svc.state().messages[0].message, "still alive");
    Ok(())
}

// -- Multiplayer passthrough ---------------------------------------------------

#[tokio::test]
async fn multiplayer_payloads_pass_through_opaquely() -> anyhow::Result<()> {
    let mut server = StubServer::start().await?;
    let svc = service(&server);
    let mut multiplayer = svc.subscribe_multiplayer();

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    svc.send_multiplayer(serde_json::json!({ "move": 4 })).await;
    let action = server.next_action(TIMEOUT).await?;
    assert_eq!(action["type"], "round_action");
    assert_eq!(action["round"]["move"], 4);

    server.broadcast(&serde_json::json!({
        "type": "multiplayer_broadcast",
        "payload": { "pos": 2 },
    }));
    let payload = tokio::time::timeout(TIMEOUT, multiplayer.recv()).await??;
    assert_eq!(payload["pos"], 2);

    Ok(())
}

// -- Reconnect ----------------------------------------------------------------

/// Reserve an address with nothing listening on it.
async fn vacant_addr() -> anyhow::Result<std::net::SocketAddr> {
    let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = reserved.local_addr()?;
    drop(reserved);
    Ok(addr)
}

fn exhausting_service(addr: std::net::SocketAddr) -> RoomService {
    let config = Config {
        ws_url: format!("ws://{addr}"),
        max_reconnects: 2,
        reconnect_base: Duration::from_millis(5),
        ..Config::default()
    };
    RoomService::new(config, Arc::new(IdentityStore::new(Box::new(MemoryKv::new()))))
}

#[tokio::test]
async fn explicit_connect_recovers_after_exhausted_retries() -> anyhow::Result<()> {
    let addr = vacant_addr().await?;
    let svc = exhausting_service(addr);

    // Every attempt hits the vacant port; the connection task gives up.
    svc.connect_id("r1").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!svc.is_connected().await);

    // The backend comes up on that address. Reconnecting to the *same*
    // room must dial fresh, not short-circuit on the dead handle.
    let mut server = StubServer::start_on(addr).await?;
    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    svc.send_message("recovered").await;
    let action = server.next_action(TIMEOUT).await?;
    assert_eq!(action["type"], "chat_action");
    assert_eq!(action["message"], "recovered");

    Ok(())
}

#[tokio::test]
async fn actions_after_exhausted_retries_redial_implicitly() -> anyhow::Result<()> {
    let addr = vacant_addr().await?;
    let svc = exhausting_service(addr);

    svc.connect_id("r1").await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    // No explicit reconnect: issuing an action with the last room known
    // must redial and deliver, never vanish into the dead handle.
    let mut server = StubServer::start_on(addr).await?;
    svc.send_message("late but delivered").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    let action = server.next_action(TIMEOUT).await?;
    assert_eq!(action["message"], "late but delivered");

    Ok(())
}

#[tokio::test]
async fn client_reconnects_after_server_internal_error() -> anyhow::Result<()> {
    let mut server = StubServer::start().await?;
    let svc = service(&server);

    svc.connect_id("r1").await;
    wait_for(|| server.handshakes() == 1, TIMEOUT).await?;

    server.close_all(1011);
    wait_for(|| server.handshakes() == 2, TIMEOUT).await?;

    // The fresh connection carries traffic again.
    svc.send_message("back online").await;
    let action = server.next_action(TIMEOUT).await?;
    assert_eq!(action["type"], "chat_action");
    assert_eq!(action["message"], "back online");

    Ok(())
}
