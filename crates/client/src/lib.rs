// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! huddle — resilient real-time room-state synchronization client.
//!
//! Maintains a consistent, eventually-correct view of a collaborative
//! session (chat, proposals/votes, rounds, leaderboard) over an unreliable
//! WebSocket connection: reconciles server broadcasts into a single
//! [`model::RoomState`] aggregate, queues actions issued before the link is
//! ready, and recovers from transient network failures with exponential
//! backoff.
//!
//! The presentation-facing surface is [`store::RoomService`]; everything
//! else supports it.

pub mod api;
pub mod config;
pub mod countdown;
pub mod error;
pub mod identity;
pub mod model;
pub mod store;
pub mod transport;
pub mod wire;
