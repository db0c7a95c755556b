// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Action/event codec for the room WebSocket protocol.
//!
//! Frames are internally-tagged JSON (`{"type": "chat_action", ...}`). Two
//! top-level enums cover the client-to-server (actions) and server-to-client
//! (broadcasts) directions. Broadcasts are full snapshots with upsert
//! semantics, never deltas.
//!
//! The codec validates structure only; business invariants (sorting,
//! purging, upserts) belong to [`crate::store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Client-originated intent sent over the room connection.
///
/// Carries only caller-supplied data: room id, author, and timestamps are
/// implicit in the connection context or assigned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ChatAction {
        message: String,
    },
    ProposalAction {
        proposal: String,
    },
    VoteAction {
        proposal_id: String,
    },
    UnvoteAction {
        proposal_id: String,
    },
    LeaderboardAction {
        entry: f64,
    },
    /// Opaque multiplayer payload relayed to every participant's game
    /// surface.
    RoundAction {
        round: serde_json::Value,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatAction { .. } => "chat_action",
            Self::ProposalAction { .. } => "proposal_action",
            Self::VoteAction { .. } => "vote_action",
            Self::UnvoteAction { .. } => "unvote_action",
            Self::LeaderboardAction { .. } => "leaderboard_action",
            Self::RoundAction { .. } => "round_action",
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Server-pushed event describing a state change.
///
/// Unknown tags deserialize to [`Broadcast::Unknown`] so a newer backend
/// does not break older clients; the transport drops them with a debug log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Broadcast {
    ChatBroadcast {
        message: String,
        created: DateTime<Utc>,
        username: String,
        #[serde(default)]
        first_name: String,
    },
    /// Full current snapshot of a single proposal (upsert by id).
    ProposalBroadcast {
        id: String,
        round: String,
        proposal: String,
        vote_count: i64,
        #[serde(default)]
        user_vote_id: Option<String>,
        created: DateTime<Utc>,
        username: String,
        #[serde(default)]
        first_name: String,
    },
    /// A new round superseding the current one.
    RoundBroadcast {
        id: String,
        counter: u32,
        duration: String,
        #[serde(default)]
        game: Option<String>,
        created: DateTime<Utc>,
    },
    /// Single leaderboard entry (upsert by user within the round).
    LeaderboardBroadcast {
        id: String,
        username: String,
        #[serde(default)]
        first_name: String,
        score: f64,
        #[serde(default)]
        tries: u32,
        created: DateTime<Utc>,
    },
    /// Opaque payload forwarded to the game surface, not interpreted here.
    MultiplayerBroadcast {
        payload: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl Broadcast {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatBroadcast { .. } => "chat_broadcast",
            Self::ProposalBroadcast { .. } => "proposal_broadcast",
            Self::RoundBroadcast { .. } => "round_broadcast",
            Self::LeaderboardBroadcast { .. } => "leaderboard_broadcast",
            Self::MultiplayerBroadcast { .. } => "multiplayer_broadcast",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
