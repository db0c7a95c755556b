// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Test harness for end-to-end room synchronization tests.
//!
//! Runs an in-process WebSocket stub standing in for the room backend.
//! Handshakes can be held back to observe client-side queueing, frames can
//! be pushed to simulate broadcasts, and connections closed with chosen
//! codes to exercise the reconnect path.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// An in-process stand-in for the room backend's WebSocket endpoint.
///
/// Accepts any number of connections. While the gate is closed, accepted
/// sockets sit unanswered (the client stays in its connecting phase);
/// [`StubServer::release`] lets all held handshakes proceed.
pub struct StubServer {
    addr: SocketAddr,
    gate_tx: watch::Sender<bool>,
    uris: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
    handshakes: Arc<AtomicUsize>,
    actions: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl StubServer {
    /// Start with handshakes answered immediately.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(true).await
    }

    /// Start with handshakes held until [`StubServer::release`].
    pub async fn start_gated() -> anyhow::Result<Self> {
        Self::start_inner(false).await
    }

    /// Start on a specific address, e.g. a port a previous backend died on.
    pub async fn start_on(addr: SocketAddr) -> anyhow::Result<Self> {
        Self::from_listener(TcpListener::bind(addr).await?, true)
    }

    async fn start_inner(open: bool) -> anyhow::Result<Self> {
        Self::from_listener(TcpListener::bind("127.0.0.1:0").await?, open)
    }

    fn from_listener(listener: TcpListener, open: bool) -> anyhow::Result<Self> {
        let addr = listener.local_addr()?;
        let (gate_tx, gate_rx) = watch::channel(open);
        let uris = Arc::new(Mutex::new(Vec::new()));
        let peers = Arc::new(Mutex::new(Vec::new()));
        let handshakes = Arc::new(AtomicUsize::new(0));
        let (action_tx, actions) = mpsc::unbounded_channel();

        {
            let uris = Arc::clone(&uris);
            let peers = Arc::clone(&peers);
            let handshakes = Arc::clone(&handshakes);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else { return };
                    tokio::spawn(serve_peer(
                        stream,
                        gate_rx.clone(),
                        Arc::clone(&uris),
                        Arc::clone(&peers),
                        Arc::clone(&handshakes),
                        action_tx.clone(),
                    ));
                }
            });
        }

        Ok(Self { addr, gate_tx, uris, peers, handshakes, actions })
    }

    /// Base URL clients derive their room URL from.
    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Let all held (and future) handshakes proceed.
    pub fn release(&self) {
        self.gate_tx.send_replace(true);
    }

    /// Number of completed WebSocket handshakes so far.
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Request paths (with query strings) seen during handshakes.
    pub fn request_uris(&self) -> Vec<String> {
        self.uris.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    /// Push a frame to every connected peer.
    pub fn broadcast(&self, value: &serde_json::Value) {
        let frame = Message::text(value.to_string());
        if let Ok(mut list) = self.peers.lock() {
            list.retain(|peer| peer.send(frame.clone()).is_ok());
        }
    }

    /// Close every connected peer with the given close code.
    pub fn close_all(&self, code: u16) {
        let frame =
            Message::Close(Some(CloseFrame { code: CloseCode::from(code), reason: "".into() }));
        if let Ok(mut list) = self.peers.lock() {
            for peer in list.drain(..) {
                let _ = peer.send(frame.clone());
            }
        }
    }

    /// Next JSON frame received from any peer.
    pub async fn next_action(&mut self, timeout: Duration) -> anyhow::Result<serde_json::Value> {
        match tokio::time::timeout(timeout, self.actions.recv()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => anyhow::bail!("stub server stopped"),
            Err(_) => anyhow::bail!("no action within {timeout:?}"),
        }
    }

    /// Assert silence: no frame arrives within `window`.
    pub async fn no_action_within(&mut self, window: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(window, self.actions.recv()).await {
            Ok(Some(value)) => anyhow::bail!("unexpected action: {value}"),
            _ => Ok(()),
        }
    }
}

async fn serve_peer(
    stream: TcpStream,
    mut gate: watch::Receiver<bool>,
    uris: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
    handshakes: Arc<AtomicUsize>,
    actions: mpsc::UnboundedSender<serde_json::Value>,
) {
    loop {
        if *gate.borrow() {
            break;
        }
        if gate.changed().await.is_err() {
            return;
        }
    }

    let record = |req: &Request, resp: Response| {
        if let Ok(mut seen) = uris.lock() {
            seen.push(req.uri().to_string());
        }
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record).await else { return };
    handshakes.fetch_add(1, Ordering::SeqCst);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    if let Ok(mut list) = peers.lock() {
        list.push(out_tx);
    }

    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(frame) => {
                    if ws.send(frame).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str(&text) else { continue };
                    if actions.send(value).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            },
        }
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}
