// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Endpoint and reconnection configuration for the synchronization core.

use std::time::Duration;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "https://play.huddle.gg/api/v1";

/// Default room WebSocket base URL.
pub const DEFAULT_WS_URL: &str = "wss://play.huddle.gg/ws";

/// Maximum consecutive reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;

/// Base reconnect delay, doubled on each consecutive failure.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Config {
    /// REST API base URL (no trailing slash), e.g. `https://host/api/v1`.
    pub api_url: String,
    /// WebSocket base URL (no trailing slash), e.g. `wss://host/ws`.
    pub ws_url: String,
    pub max_reconnects: u32,
    pub reconnect_base: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_base: DEFAULT_RECONNECT_BASE,
        }
    }
}

impl Config {
    /// Defaults overridden by `HUDDLE_API_URL` / `HUDDLE_WS_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("HUDDLE_API_URL") {
            if !url.is_empty() {
                config.api_url = url.trim_end_matches('/').to_owned();
            }
        }
        if let Ok(url) = std::env::var("HUDDLE_WS_URL") {
            if !url.is_empty() {
                config.ws_url = url.trim_end_matches('/').to_owned();
            }
        }
        config
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
