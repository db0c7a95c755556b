// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Core data model for a synchronized room session.
//!
//! These types mirror the backend's REST payloads (serde field names match
//! the wire) and double as the live state the [`crate::store`] maintains.
//! Rounds are immutable once created; a new round supersedes the old one
//! rather than mutating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A collaborative session, identified by a stable id. At most one active
/// socket connection exists per room id at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<u32>,
}

impl Room {
    /// Minimal stand-in used when connecting by id before the room's
    /// metadata has been fetched.
    pub fn placeholder(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_owned(),
            name: String::new(),
            created: now,
            updated: now,
            participant_count: None,
        }
    }
}

/// A time-boxed phase within a room. `counter` increases monotonically.
///
/// `duration` is `HH:MM:SS`. Remaining time is derived, never stored — see
/// [`crate::countdown::seconds_left`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    pub room: String,
    pub counter: u32,
    pub duration: String,
    #[serde(default)]
    pub game: Option<String>,
    pub created: DateTime<Utc>,
}

/// Whether a message came from a user or was synthesized locally (round
/// transitions). System messages are never sent back to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    User,
    System,
}

/// One chat log entry. Append-only, ordered by `created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    pub message: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    /// Locally synthesized system message (e.g. round transition banner).
    pub fn system(room: &str, message: String, created: DateTime<Utc>) -> Self {
        Self {
            id: format!("sys-{}", Uuid::new_v4()),
            room: room.to_owned(),
            username: "System".to_owned(),
            first_name: "System".to_owned(),
            message,
            created,
            kind: MessageKind::System,
        }
    }
}

/// A game proposal belonging to exactly one round.
///
/// `user_vote_id` carries the current viewer's vote id when they voted, so
/// vote status is readable without a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub room: String,
    pub round: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    pub text: String,
    pub vote_count: i64,
    #[serde(default)]
    pub user_vote_id: Option<String>,
    pub created: DateTime<Utc>,
}

/// A vote cast on a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub username: String,
    pub proposal: String,
    pub created: DateTime<Utc>,
}

/// One user's current score within a round. New submissions by the same
/// user replace the entry rather than duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub room: String,
    pub round: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    pub score: f64,
    pub tries: u32,
    pub created: DateTime<Utc>,
}

/// The aggregate a live room connection maintains. Exactly one instance per
/// connection; reset to empty whenever a new room connection is established.
///
/// Invariants (enforced by the store on every transition):
/// - `proposals` only contains proposals of `current_round`, sorted by
///   `vote_count` descending;
/// - `leaderboard` is sorted by `score` descending, ties in arrival order;
/// - `messages` are sorted by `created` ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub messages: Vec<Message>,
    pub proposals: Vec<Proposal>,
    pub current_round: Option<Round>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
