// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Headless huddle client.
//!
//! Joins a room, streams the chat log and round transitions to stdout, and
//! sends stdin lines as chat messages. With no room argument it lists the
//! rooms the backend knows about.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::{error, warn};

use huddle::api::ApiClient;
use huddle::config::Config;
use huddle::countdown;
use huddle::identity::{FileKv, IdentityStore, KvStore, MemoryKv};
use huddle::model::Message;
use huddle::store::RoomService;

/// Headless client for a huddle room.
#[derive(Debug, Parser)]
#[command(name = "huddle", version, about)]
struct Args {
    /// Room id to join. Omit to list rooms.
    room: Option<String>,

    /// REST API base URL.
    #[arg(long, env = "HUDDLE_API_URL")]
    api_url: Option<String>,

    /// Room WebSocket base URL.
    #[arg(long, env = "HUDDLE_WS_URL")]
    ws_url: Option<String>,

    /// Credentials file (flat JSON key-value store).
    #[arg(long, env = "HUDDLE_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "HUDDLE_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HUDDLE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = run(args).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(args: &Args) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match args.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().init(),
        _ => fmt::fmt().with_env_filter(filter).init(),
    }
}

/// Pick the credentials store: explicit path, then `~/.huddle`, then an
/// in-memory fallback (throwaway identity) when no home is available.
fn open_credentials(args: &Args) -> Box<dyn KvStore> {
    let path = args.credentials.clone().or_else(|| {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home).join(".huddle").join("credentials.json")
        })
    });
    match path {
        Some(path) => Box::new(FileKv::open(&path)),
        None => {
            warn!("no HOME and no --credentials path, using a throwaway identity");
            Box::new(MemoryKv::new())
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(url) = &args.api_url {
        config.api_url = url.trim_end_matches('/').to_owned();
    }
    if let Some(url) = &args.ws_url {
        config.ws_url = url.trim_end_matches('/').to_owned();
    }

    let identity = Arc::new(IdentityStore::new(open_credentials(&args)));
    let api = ApiClient::new(&config, Arc::clone(&identity))?;
    api.ensure_registered().await?;

    let Some(room_id) = args.room else {
        let rooms = api.rooms().await?;
        if rooms.is_empty() {
            println!("no rooms");
            return Ok(());
        }
        for room in rooms {
            println!("{}  {}", room.id, room.name);
        }
        return Ok(());
    };

    let room = api.room(&room_id).await?;
    println!("joining {} as {}", room.name, identity.username());

    let service = Arc::new(RoomService::new(config, Arc::clone(&identity)));
    service.connect(room.clone()).await;

    // Prime from REST snapshots; the socket takes over from here.
    if let Ok(messages) = api.messages(&room.id).await {
        service.set_messages(messages);
    }
    if let Ok(proposals) = api.proposals(&room.id).await {
        service.set_proposals(proposals);
    }
    if let Ok(rounds) = api.rounds(&room.id).await {
        service.set_round(rounds.into_iter().max_by_key(|r| r.counter));
    }
    if let Ok(leaderboard) = api.leaderboard(&room.id).await {
        service.set_leaderboard(leaderboard);
    }

    let mut state_rx = service.subscribe_state();
    let mut printed = HashSet::new();
    let mut round_counter = None;
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                for message in unseen(&state.messages, &mut printed) {
                    println!("[{}] {}: {}", message.created.format("%H:%M:%S"), message.username, message.message);
                }
                let counter = state.current_round.as_ref().map(|r| r.counter);
                if counter != round_counter {
                    round_counter = counter;
                    if let Some(round) = &state.current_round {
                        let left = countdown::seconds_left(Some(round), chrono::Utc::now());
                        println!("-- round #{} ({}s remaining) --", round.counter, left);
                    }
                }
            }
            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        service.send_message(line.trim().to_owned()).await;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    service.disconnect().await;
    Ok(())
}

/// Messages not reported yet, in display order. The log is kept sorted by
/// timestamp, so an arrival can land *before* already-reported entries; a
/// positional cursor would reprint the tail and skip the newcomer.
fn unseen<'a>(messages: &'a [Message], seen: &mut HashSet<String>) -> Vec<&'a Message> {
    messages.iter().filter(|m| seen.insert(m.id.clone())).collect()
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
