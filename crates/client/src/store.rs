// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Room State Store — the single owner of one room's live state.
//!
//! A [`RoomService`] owns at most one [`Transport`] at a time and applies
//! every inbound broadcast as a state transition on the [`RoomState`]
//! aggregate. Observers subscribe through `tokio::sync::watch` channels,
//! which replay the latest value to new subscribers and never expose a
//! half-applied transition.
//!
//! Construct one instance at the composition root and hand it to the
//! presentation layer; there is deliberately no global singleton.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::identity::IdentityStore;
use crate::model::{LeaderboardEntry, Message, Proposal, Room, RoomState, Round};
use crate::transport::{build_room_url, Transport, TransportConfig, TransportEvent};
use crate::wire::{Action, Broadcast};

/// Buffered multiplayer payloads per subscriber before lag drops the oldest.
const MULTIPLAYER_BUFFER: usize = 64;

pub struct RoomService {
    config: Config,
    identity: Arc<IdentityStore>,
    state_tx: watch::Sender<RoomState>,
    room_tx: watch::Sender<Option<Room>>,
    multiplayer_tx: broadcast::Sender<serde_json::Value>,
    inner: Mutex<Inner>,
}

struct Inner {
    transport: Option<Transport>,
    room_id: Option<String>,
    pump: Option<tokio::task::JoinHandle<()>>,
    /// Actions issued before any room was ever selected; delivered on the
    /// first connect.
    parked: VecDeque<Action>,
}

impl RoomService {
    pub fn new(config: Config, identity: Arc<IdentityStore>) -> Self {
        let (state_tx, _) = watch::channel(RoomState::default());
        let (room_tx, _) = watch::channel(None);
        let (multiplayer_tx, _) = broadcast::channel(MULTIPLAYER_BUFFER);
        Self {
            config,
            identity,
            state_tx,
            room_tx,
            multiplayer_tx,
            inner: Mutex::new(Inner {
                transport: None,
                room_id: None,
                pump: None,
                parked: VecDeque::new(),
            }),
        }
    }

    // -- subscriptions ------------------------------------------------------

    /// The full aggregate. New subscribers immediately observe the current
    /// value, then every subsequent update.
    pub fn subscribe_state(&self) -> watch::Receiver<RoomState> {
        self.state_tx.subscribe()
    }

    /// Current room metadata only (header-style consumers).
    pub fn subscribe_room(&self) -> watch::Receiver<Option<Room>> {
        self.room_tx.subscribe()
    }

    /// Opaque multiplayer payloads, forwarded to the game surface without
    /// interpretation.
    pub fn subscribe_multiplayer(&self) -> broadcast::Receiver<serde_json::Value> {
        self.multiplayer_tx.subscribe()
    }

    /// Snapshot of the aggregate at this instant.
    pub fn state(&self) -> RoomState {
        self.state_tx.borrow().clone()
    }

    pub fn current_room(&self) -> Option<Room> {
        self.room_tx.borrow().clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.transport.as_ref().is_some_and(Transport::is_connected)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Connect to `room`. Idempotent for the room already live; a different
    /// room tears the old connection fully down first. The aggregate is
    /// reset to empty *before* the transport reports success, so observers
    /// never see a previous room's state.
    pub async fn connect(&self, room: Room) {
        self.connect_with(room, None).await;
    }

    /// Connect by id only, with placeholder metadata until
    /// [`RoomService::set_room`] supplies the real record.
    pub async fn connect_id(&self, room_id: &str) {
        self.connect_with(Room::placeholder(room_id), None).await;
    }

    async fn connect_with(&self, room: Room, queued: Option<Action>) {
        let mut inner = self.inner.lock().await;

        // A handle whose task has terminated (retries exhausted) does not
        // count: the same-room short-circuit must not wedge on it.
        let live = inner.transport.as_ref().is_some_and(Transport::is_alive);
        if live && inner.room_id.as_deref() == Some(room.id.as_str()) {
            debug!(room = %room.id, "already connected to this room");
            if let (Some(action), Some(transport)) = (queued, inner.transport.as_ref()) {
                transport.send(action);
            }
            return;
        }

        self.teardown(&mut inner);
        self.room_tx.send_replace(Some(room.clone()));
        self.state_tx.send_replace(RoomState::default());

        let url = build_room_url(
            &self.config.ws_url,
            &room.id,
            &self.identity.username(),
            &self.identity.password(),
        );
        let (transport, events) = Transport::connect(TransportConfig {
            url,
            room_id: room.id.clone(),
            max_attempts: self.config.max_reconnects,
            base_delay: self.config.reconnect_base,
        });

        if let Some(action) = queued {
            transport.send(action);
        }
        while let Some(action) = inner.parked.pop_front() {
            transport.send(action);
        }

        let pump = tokio::spawn(pump_events(
            events,
            self.state_tx.clone(),
            self.multiplayer_tx.clone(),
            room.id.clone(),
        ));
        inner.room_id = Some(room.id.clone());
        inner.transport = Some(transport);
        inner.pump = Some(pump);
        info!(room = %room.id, "room connection initiated");
    }

    /// Tear everything down and clear the published state. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner);
        inner.room_id = None;
        inner.parked.clear();
        self.room_tx.send_replace(None);
        self.state_tx.send_replace(RoomState::default());
    }

    /// Stop the transport and the event pump. The pump is aborted before
    /// any state reset so a broadcast already in flight cannot land in the
    /// next room's aggregate.
    fn teardown(&self, inner: &mut Inner) {
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        if let Some(transport) = inner.transport.take() {
            transport.disconnect();
        }
    }

    /// Update the room metadata (e.g. after the REST record arrives).
    pub fn set_room(&self, room: Room) {
        self.room_tx.send_replace(Some(room));
    }

    // -- REST snapshot priming ----------------------------------------------

    pub fn set_messages(&self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| a.created.cmp(&b.created));
        self.state_tx.send_modify(|state| state.messages = messages);
    }

    pub fn set_proposals(&self, mut proposals: Vec<Proposal>) {
        proposals.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        self.state_tx.send_modify(|state| state.proposals = proposals);
    }

    pub fn set_round(&self, round: Option<Round>) {
        self.state_tx.send_modify(|state| state.current_round = round);
    }

    pub fn set_leaderboard(&self, mut leaderboard: Vec<LeaderboardEntry>) {
        sort_leaderboard(&mut leaderboard);
        self.state_tx.send_modify(|state| state.leaderboard = leaderboard);
    }

    // -- actions ------------------------------------------------------------

    pub async fn send_message(&self, message: impl Into<String>) {
        self.dispatch(Action::ChatAction { message: message.into() }).await;
    }

    pub async fn create_proposal(&self, text: impl Into<String>) {
        self.dispatch(Action::ProposalAction { proposal: text.into() }).await;
    }

    pub async fn vote(&self, proposal_id: &str) {
        self.dispatch(Action::VoteAction { proposal_id: proposal_id.to_owned() }).await;
    }

    pub async fn delete_vote(&self, proposal_id: &str) {
        self.dispatch(Action::UnvoteAction { proposal_id: proposal_id.to_owned() }).await;
    }

    pub async fn create_leaderboard_entry(&self, score: f64) {
        self.dispatch(Action::LeaderboardAction { entry: score }).await;
    }

    pub async fn send_multiplayer(&self, payload: serde_json::Value) {
        self.dispatch(Action::RoundAction { round: payload }).await;
    }

    /// Deliver an action through the live transport, or transparently
    /// reconnect to the last-known room and queue it. Never an error to the
    /// caller.
    async fn dispatch(&self, action: Action) {
        let mut inner = self.inner.lock().await;
        if let Some(transport) = inner.transport.as_ref().filter(|t| t.is_alive()) {
            transport.send(action);
            return;
        }
        match inner.room_id.clone() {
            Some(room_id) => {
                warn!(room = %room_id, kind = action.kind(), "no live transport, reconnecting to deliver action");
                drop(inner);
                self.connect_with(Room::placeholder(&room_id), Some(action)).await;
            }
            None => {
                warn!(kind = action.kind(), "action issued before any room connection, parked");
                inner.parked.push_back(action);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// State application
// ---------------------------------------------------------------------------

/// Drive transport events into the published state until the transport task
/// ends.
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    state_tx: watch::Sender<RoomState>,
    multiplayer_tx: broadcast::Sender<serde_json::Value>,
    room_id: String,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Opened => info!(room = %room_id, "room live"),
            TransportEvent::Broadcast(Broadcast::MultiplayerBroadcast { payload }) => {
                let _ = multiplayer_tx.send(payload);
            }
            TransportEvent::Broadcast(broadcast) => {
                // One send_modify per broadcast: observers see each
                // transition whole, even the cross-cutting round change.
                state_tx.send_modify(|state| {
                    apply_broadcast(state, &room_id, broadcast, Utc::now());
                });
            }
            TransportEvent::Closed { code, reason } => {
                debug!(room = %room_id, code, reason = %reason, "connection closed");
            }
            TransportEvent::Failed { fault, detail } => {
                warn!(room = %room_id, fault = %fault, "{detail}");
            }
        }
    }
}

/// Apply one broadcast to the aggregate.
///
/// `now` is the local clock used for synthesized system messages;
/// everything else carries server timestamps.
pub(crate) fn apply_broadcast(
    state: &mut RoomState,
    room_id: &str,
    broadcast: Broadcast,
    now: DateTime<Utc>,
) {
    match broadcast {
        Broadcast::ChatBroadcast { message, created, username, first_name } => {
            state.messages.push(Message {
                id: Uuid::new_v4().to_string(),
                room: room_id.to_owned(),
                username,
                first_name,
                message,
                created,
                kind: crate::model::MessageKind::User,
            });
            sort_messages(&mut state.messages);
        }
        Broadcast::ProposalBroadcast {
            id,
            round,
            proposal,
            vote_count,
            user_vote_id,
            created,
            username,
            first_name,
        } => {
            let snapshot = Proposal {
                id: id.clone(),
                room: room_id.to_owned(),
                round,
                username,
                first_name,
                text: proposal,
                vote_count,
                user_vote_id,
                created,
            };
            match state.proposals.iter_mut().find(|p| p.id == id) {
                Some(slot) => *slot = snapshot,
                None => state.proposals.push(snapshot),
            }
            state.proposals.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        }
        Broadcast::RoundBroadcast { id, counter, duration, game, created } => {
            // The one cross-cutting transition: new round, proposal purge,
            // and the announcement message land together.
            state.proposals.retain(|p| p.round == id);
            state
                .messages
                .push(Message::system(room_id, format!("New Round #{counter} started!"), now));
            sort_messages(&mut state.messages);
            state.current_round = Some(Round {
                id,
                room: room_id.to_owned(),
                counter,
                duration,
                game,
                created,
            });
        }
        Broadcast::LeaderboardBroadcast { id, username, first_name, score, tries, created } => {
            let round = state.current_round.as_ref().map(|r| r.id.clone()).unwrap_or_default();
            let entry = LeaderboardEntry {
                id,
                room: room_id.to_owned(),
                round: round.clone(),
                username: username.clone(),
                first_name,
                score,
                tries,
                created,
            };
            let existing = state
                .leaderboard
                .iter_mut()
                .find(|e| e.username == username && e.round == round);
            match existing {
                Some(slot) => *slot = entry,
                None => state.leaderboard.push(entry),
            }
            sort_leaderboard(&mut state.leaderboard);
        }
        Broadcast::MultiplayerBroadcast { .. } | Broadcast::Unknown => {}
    }
}

/// Sort ascending by server timestamp; a stable sort keeps arrival order
/// for equal timestamps. Local system messages can race server clocks, so
/// arrival order alone is not enough.
fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created.cmp(&b.created));
}

/// Descending by score, ties in arrival order (stable sort).
fn sort_leaderboard(leaderboard: &mut [LeaderboardEntry]) {
    leaderboard.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
