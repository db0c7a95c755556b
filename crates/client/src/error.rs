// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

use std::fmt;

/// WebSocket close code the backend emits for a transient server-side
/// fault. Triggers an immediate retry instead of the accumulated backoff.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Fault taxonomy for the synchronization core.
///
/// Only `RetriesExhausted` is terminal for a connection; everything else is
/// absorbed inside the transport and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Socket error or abnormal close; recovered via backoff.
    Transient,
    /// Server signaled an internal error on close; fast-path retry.
    ServerInternal,
    /// Reconnect attempts exhausted; surfaced to the caller.
    RetriesExhausted,
    /// Inbound frame failed to parse; dropped, connection unaffected.
    MalformedFrame,
    /// Action issued with no live connection; queued, never an error.
    NotConnected,
    /// Backend says the user already exists; treated as success.
    RegistrationConflict,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::ServerInternal => "server_internal",
            Self::RetriesExhausted => "retries_exhausted",
            Self::MalformedFrame => "malformed_frame",
            Self::NotConnected => "not_connected",
            Self::RegistrationConflict => "registration_conflict",
        }
    }
}

/// Classify a close code: 1011 means the fault was on the server side and a
/// prompt retry is likely to succeed.
pub fn classify_close(code: u16) -> Fault {
    if code == CLOSE_INTERNAL_ERROR {
        Fault::ServerInternal
    } else {
        Fault::Transient
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
