// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! WebSocket transport client for a single room.
//!
//! A spawned task owns the physical socket and drives the connection state
//! machine (idle → connecting → open → closed) behind a stable [`Transport`]
//! handle. Actions submitted while the link is still connecting are queued
//! and flushed FIFO on open; actions whose transmission failed are retained
//! in a bounded retry queue and resent after the next reconnect.
//!
//! Abnormal closes trigger reconnects with exponential backoff, except for
//! close code 1011 (server internal error), which retries almost
//! immediately. When the attempt cap is exhausted the task emits
//! [`TransportEvent::Failed`] and stops; a fresh transport must be built to
//! try again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{classify_close, Fault};
use crate::wire::{Action, Broadcast};

/// Fast-path retry delay after a server-internal-error close.
pub const INTERNAL_ERROR_RETRY: Duration = Duration::from_millis(100);

/// Upper bound on actions retained across reconnects.
pub const RETRY_QUEUE_CAP: usize = 32;

/// Delivery attempts for a retained action before it is dropped.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

/// Close code reported when the peer vanished without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

/// Connection parameters for one room transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Full connection URI including room id and credentials.
    pub url: String,
    /// Room id, for log context only.
    pub room_id: String,
    /// Maximum consecutive reconnect attempts.
    pub max_attempts: u32,
    /// Base reconnect delay, doubled per consecutive failure.
    pub base_delay: Duration,
}

/// Events surfaced to the transport owner.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Physical link established (initial connect or reconnect).
    Opened,
    /// A broadcast frame arrived and parsed.
    Broadcast(Broadcast),
    /// The link closed; a reconnect may follow.
    Closed { code: u16, reason: String },
    /// Terminal failure: reconnect attempts exhausted. No further events.
    Failed { fault: Fault, detail: String },
}

enum Command {
    Send(Action),
    Disconnect,
}

/// Handle to the connection task for one room.
///
/// Dropping the handle does not tear the connection down; call
/// [`Transport::disconnect`] (idempotent) to cancel reconnect timers, clear
/// queued messages, and close the socket.
pub struct Transport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    room_id: String,
}

impl Transport {
    /// Spawn the connection task. Lifecycle and inbound broadcasts arrive
    /// on the returned receiver; the connect itself is fire-and-forget.
    pub fn connect(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let room_id = config.room_id.clone();
        tokio::spawn(run(config, cmd_rx, event_tx, Arc::clone(&connected), cancel.clone()));
        (Self { cmd_tx, connected, cancel, room_id }, event_rx)
    }

    /// Submit an action for delivery. Never fails the caller: while
    /// connecting the action is queued, and after a terminal failure it is
    /// dropped with a warning.
    pub fn send(&self, action: Action) {
        if self.cmd_tx.send(Command::Send(action)).is_err() {
            warn!(
                room = %self.room_id,
                fault = %Fault::NotConnected,
                "transport task gone, action dropped"
            );
        }
    }

    /// Tear the connection down: cancel any pending reconnect, drop all
    /// queued messages, close the socket. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.cancel.cancel();
        let _ = self.cmd_tx.send(Command::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// False once the connection task has terminated (clean disconnect or
    /// exhausted retries). A dead handle silently drops every send; the
    /// owner must build a fresh transport to carry traffic again.
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

/// Build the room connection URI. Identity rides as connection parameters;
/// there is no separate auth handshake message.
pub fn build_room_url(ws_base: &str, room_id: &str, username: &str, password: &str) -> String {
    let base = ws_base.trim_end_matches('/');
    format!("{base}/room/{room_id}/?username={username}&password={password}")
}

/// Delay before reconnect attempt `attempt` (1-based): base doubled per
/// consecutive failure.
pub(crate) fn reconnect_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}

// ---------------------------------------------------------------------------
// Retry queue
// ---------------------------------------------------------------------------

pub(crate) struct RetryEntry {
    pub(crate) action: Action,
    pub(crate) attempts: u32,
}

/// Bounded queue of actions whose transmission failed, replayed after the
/// next successful open. Overflow evicts the oldest entry; an action that
/// keeps failing is dropped once its attempt count reaches the cap.
pub(crate) struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    cap: usize,
}

impl RetryQueue {
    pub(crate) fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), cap }
    }

    pub(crate) fn push(&mut self, action: Action, attempts: u32) {
        if attempts >= MAX_SEND_ATTEMPTS {
            warn!(kind = action.kind(), attempts, "dropping action after repeated send failures");
            return;
        }
        if self.entries.len() == self.cap {
            if let Some(evicted) = self.entries.pop_front() {
                warn!(kind = evicted.action.kind(), "retry queue full, evicting oldest action");
            }
        }
        self.entries.push_back(RetryEntry { action, attempts });
    }

    pub(crate) fn drain(&mut self) -> Vec<RetryEntry> {
        self.entries.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

async fn run(
    config: TransportConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    // Actions submitted while no socket is open yet.
    let mut pending: VecDeque<Action> = VecDeque::new();
    // Actions whose transmission failed on an ostensibly open socket.
    let mut retry = RetryQueue::new(RETRY_QUEUE_CAP);
    // Consecutive failed connect attempts since the last successful open.
    let mut attempt: u32 = 0;
    let mut fast_retry = false;

    'reconnect: loop {
        if attempt > 0 {
            let delay = if fast_retry {
                INTERNAL_ERROR_RETRY
            } else {
                reconnect_backoff(config.base_delay, attempt)
            };
            debug!(room = %config.room_id, attempt, ?delay, "reconnect scheduled");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = queue_commands(&mut cmd_rx, &mut pending) => return,
                () = cancel.cancelled() => return,
            }
        }
        fast_retry = false;

        // Connect, still accepting (and queueing) sends meanwhile.
        let stream = tokio::select! {
            result = tokio_tungstenite::connect_async(&config.url) => match result {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    attempt += 1;
                    if attempt >= config.max_attempts {
                        let _ = event_tx.send(TransportEvent::Failed {
                            fault: Fault::RetriesExhausted,
                            detail: format!(
                                "room {}: giving up after {attempt} connection attempts: {e}",
                                config.room_id
                            ),
                        });
                        return;
                    }
                    warn!(room = %config.room_id, attempt, "connect failed: {e}");
                    continue 'reconnect;
                }
            },
            () = queue_commands(&mut cmd_rx, &mut pending) => return,
            () = cancel.cancelled() => return,
        };

        attempt = 0;
        connected.store(true, Ordering::SeqCst);
        info!(room = %config.room_id, "websocket open");
        if event_tx.send(TransportEvent::Opened).is_err() {
            return;
        }

        let (mut ws_tx, mut ws_rx) = stream.split();

        // Replay retained failures first (they are oldest), then flush the
        // connecting-phase queue in submission order.
        for entry in retry.drain() {
            if let Err(e) = send_action(&mut ws_tx, &entry.action).await {
                warn!(room = %config.room_id, "resend failed: {e}");
                retry.push(entry.action, entry.attempts + 1);
            }
        }
        while let Some(action) = pending.pop_front() {
            if let Err(e) = send_action(&mut ws_tx, &action).await {
                warn!(room = %config.room_id, "flush failed: {e}");
                retry.push(action, 1);
            }
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Send(action)) => {
                        if let Err(e) = send_action(&mut ws_tx, &action).await {
                            // Treated as transient: retain and reconnect.
                            warn!(room = %config.room_id, kind = action.kind(), "send failed, retained for resend: {e}");
                            retry.push(action, 1);
                            connected.store(false, Ordering::SeqCst);
                            let _ = event_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSE,
                                reason: "send failed".to_owned(),
                            });
                            attempt = 1;
                            continue 'reconnect;
                        }
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        connected.store(false, Ordering::SeqCst);
                        return;
                    }
                },
                () = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    connected.store(false, Ordering::SeqCst);
                    return;
                }
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Broadcast>(&text) {
                            Ok(Broadcast::Unknown) => {
                                debug!(room = %config.room_id, "ignoring unknown broadcast tag");
                            }
                            Ok(broadcast) => {
                                if event_tx.send(TransportEvent::Broadcast(broadcast)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(
                                    room = %config.room_id,
                                    fault = %Fault::MalformedFrame,
                                    "dropping malformed frame: {e}"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        let (code, reason) = close
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(TransportEvent::Closed { code, reason });
                        if code == u16::from(CloseCode::Normal) {
                            debug!(room = %config.room_id, "clean close");
                            return;
                        }
                        fast_retry = classify_close(code) == Fault::ServerInternal;
                        attempt = 1;
                        continue 'reconnect;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(room = %config.room_id, "websocket error: {e}");
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: ABNORMAL_CLOSE,
                            reason: e.to_string(),
                        });
                        attempt = 1;
                        continue 'reconnect;
                    }
                    None => {
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: ABNORMAL_CLOSE,
                            reason: "connection lost".to_owned(),
                        });
                        attempt = 1;
                        continue 'reconnect;
                    }
                },
            }
        }
    }
}

/// Service the command channel while no socket is open: queue sends,
/// resolve on disconnect (or a dropped handle).
async fn queue_commands(
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<Action>,
) {
    loop {
        match cmd_rx.recv().await {
            Some(Command::Send(action)) => pending.push_back(action),
            Some(Command::Disconnect) | None => return,
        }
    }
}

/// Serialize and transmit one action as a JSON text frame.
async fn send_action<S>(ws_tx: &mut S, action: &Action) -> anyhow::Result<()>
where
    S: Sink<Message> + SinkExt<Message> + Unpin,
    <S as Sink<Message>>::Error: std::fmt::Display,
{
    let text = serde_json::to_string(action)?;
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| anyhow::anyhow!("websocket send failed: {e}"))
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
