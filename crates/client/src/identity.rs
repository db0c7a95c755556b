// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! Process-wide persisted identity.
//!
//! Credentials are materialized lazily: the first read of the username or
//! password generates and persists one, so a fresh client can join a room
//! without any signup step. Two independent flags track whether the
//! identity was registered with the backend and whether the user explicitly
//! set a display name; both are flipped only after the corresponding
//! backend call succeeds.
//!
//! Persistence goes through the [`KvStore`] abstraction (flat string keys)
//! so the core stays testable without a real credentials file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

pub const KEY_USERNAME: &str = "username";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_IS_REGISTERED: &str = "is_registered";
pub const KEY_HAS_SET_FIRSTNAME: &str = "hasSetFirstname";
pub const KEY_FIRSTNAME: &str = "firstname";

const PASSWORD_LEN: usize = 12;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "daring", "eager", "fuzzy", "gentle", "hazel", "ivory", "jolly",
    "keen", "lively", "mellow", "nimble", "opal", "plucky", "quiet", "rustic", "sly", "tidy",
    "umber", "vivid", "witty", "zesty",
];

const NOUNS: &[&str] = &[
    "otter", "falcon", "badger", "cricket", "dolphin", "ermine", "finch", "gecko", "heron",
    "ibis", "jackal", "koala", "lemur", "marmot", "newt", "ocelot", "puffin", "quail", "raven",
    "stoat", "tapir", "urchin", "vole", "wombat",
];

// ---------------------------------------------------------------------------
// Key-value persistence
// ---------------------------------------------------------------------------

/// Flat string key-value persistence for identity state.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory store for tests and environments without a writable home.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.map.lock() {
            map.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.map.lock() {
            map.remove(key);
        }
    }
}

/// File-backed store: one flat JSON object, written through on every
/// mutation. Load errors fall back to an empty map with a warning.
pub struct FileKv {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileKv {
    pub fn open(path: &Path) -> Self {
        let cache = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "ignoring corrupt credentials file: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path: path.to_owned(), cache: Mutex::new(cache) }
    }

    fn persist(&self, map: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(map) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), "failed to persist credentials: {e}");
                }
            }
            Err(e) => warn!("failed to serialize credentials: {e}"),
        }
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.cache.lock() {
            map.insert(key.to_owned(), value.to_owned());
            self.persist(&map);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.cache.lock() {
            map.remove(key);
            self.persist(&map);
        }
    }
}

// ---------------------------------------------------------------------------
// Identity store
// ---------------------------------------------------------------------------

/// Lazily-materialized identity over a [`KvStore`].
pub struct IdentityStore {
    kv: Box<dyn KvStore>,
}

impl IdentityStore {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The persisted username, generating and persisting one on first read.
    pub fn username(&self) -> String {
        match self.kv.get(KEY_USERNAME) {
            Some(name) if !name.is_empty() => name,
            _ => {
                let name = generate_username();
                debug!(username = %name, "generated new identity");
                self.kv.set(KEY_USERNAME, &name);
                name
            }
        }
    }

    /// The persisted password, generating and persisting one on first read.
    pub fn password(&self) -> String {
        match self.kv.get(KEY_PASSWORD) {
            Some(pw) if !pw.is_empty() => pw,
            _ => {
                let pw = generate_password();
                self.kv.set(KEY_PASSWORD, &pw);
                pw
            }
        }
    }

    /// True when both credentials are already persisted (does not generate).
    pub fn has_credentials(&self) -> bool {
        self.kv.get(KEY_USERNAME).is_some_and(|v| !v.is_empty())
            && self.kv.get(KEY_PASSWORD).is_some_and(|v| !v.is_empty())
    }

    pub fn set_credentials(&self, username: &str, password: &str) {
        self.kv.set(KEY_USERNAME, username);
        self.kv.set(KEY_PASSWORD, password);
    }

    pub fn set_username(&self, username: &str) {
        self.kv.set(KEY_USERNAME, username);
    }

    /// Forget everything, including the registration flags.
    pub fn clear_credentials(&self) {
        self.kv.remove(KEY_USERNAME);
        self.kv.remove(KEY_PASSWORD);
        self.kv.remove(KEY_IS_REGISTERED);
        self.kv.remove(KEY_HAS_SET_FIRSTNAME);
        self.kv.remove(KEY_FIRSTNAME);
    }

    pub fn is_registered(&self) -> bool {
        self.kv.get(KEY_IS_REGISTERED).as_deref() == Some("true")
    }

    /// Flip only after a successful (or benignly conflicting) backend
    /// registration call.
    pub fn set_registered(&self, registered: bool) {
        self.kv.set(KEY_IS_REGISTERED, if registered { "true" } else { "false" });
    }

    pub fn has_set_firstname(&self) -> bool {
        self.kv.get(KEY_HAS_SET_FIRSTNAME).as_deref() == Some("true")
    }

    pub fn set_firstname_set(&self, has_set: bool) {
        self.kv.set(KEY_HAS_SET_FIRSTNAME, if has_set { "true" } else { "false" });
    }

    pub fn firstname(&self) -> Option<String> {
        self.kv.get(KEY_FIRSTNAME)
    }

    pub fn set_firstname(&self, firstname: &str) {
        self.kv.set(KEY_FIRSTNAME, firstname);
    }
}

/// Human-readable word-pair username, e.g. `brisk-otter-42`.
fn generate_username() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"brisk");
    let noun = NOUNS.choose(&mut rng).unwrap_or(&"otter");
    let suffix: u32 = rng.random_range(10..100);
    format!("{adjective}-{noun}-{suffix}")
}

/// Random alphanumeric password.
fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..PASSWORD_LEN).map(|_| rng.sample(rand::distr::Alphanumeric) as char).collect()
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
