// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Huddle contributors

//! REST bootstrap client.
//!
//! Everything the room socket does not cover: initial snapshot fetches and
//! the mutating fallback paths (registration, display name, room creation,
//! votes). Requests authenticate with HTTP Basic credentials taken from the
//! [`IdentityStore`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Fault;
use crate::identity::IdentityStore;
use crate::model::{LeaderboardEntry, Message, Proposal, Room, Round, Vote};

/// Timeout for every bootstrap request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    identity: Arc<IdentityStore>,
}

impl ApiClient {
    pub fn new(config: &Config, identity: Arc<IdentityStore>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base: config.api_url.trim_end_matches('/').to_owned(), identity })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }

    // -- users --------------------------------------------------------------

    /// Register the persisted identity with the backend if it is not
    /// already. A conflicting registration (user exists) is benign: the
    /// flag is set and the flow continues.
    pub async fn ensure_registered(&self) -> anyhow::Result<()> {
        if self.identity.is_registered() {
            return Ok(());
        }
        let username = self.identity.username();
        let password = self.identity.password();
        match self.register_user(&username, &password).await {
            Ok(()) => {
                self.identity.set_registered(true);
                info!(username = %username, "registered with backend");
                Ok(())
            }
            Err(e) if e.downcast_ref::<Fault>() == Some(&Fault::RegistrationConflict) => {
                self.identity.set_registered(true);
                debug!(username = %username, fault = %Fault::RegistrationConflict, "user already registered, continuing");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `POST /users/`. Fails with [`Fault::RegistrationConflict`] when the
    /// backend reports the user already exists.
    pub async fn register_user(&self, username: &str, password: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "username": username,
            "password": password,
            "email": format!("{username}@huddle.gg"),
        });
        let response = self.http.post(self.url("/users/")).json(&body).send().await?;
        match response.status() {
            StatusCode::CONFLICT | StatusCode::BAD_REQUEST => {
                Err(anyhow::Error::new(Fault::RegistrationConflict))
            }
            _ => {
                response.error_for_status()?;
                Ok(())
            }
        }
    }

    /// `PUT /users/update_username/`, then persist the new name locally.
    pub async fn update_username(&self, new_username: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({ "username": new_username });
        self.http
            .put(self.url("/users/update_username/"))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        self.identity.set_username(new_username);
        Ok(())
    }

    /// `PUT /users/update_firstname/`, then persist the display name and
    /// flip its flag — only on success.
    pub async fn update_firstname(&self, firstname: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({ "first_name": firstname });
        self.http
            .put(self.url("/users/update_firstname/"))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        self.identity.set_firstname(firstname);
        self.identity.set_firstname_set(true);
        Ok(())
    }

    // -- rooms --------------------------------------------------------------

    pub async fn rooms(&self) -> anyhow::Result<Vec<Room>> {
        self.get_json("/rooms/").await
    }

    pub async fn room(&self, room_id: &str) -> anyhow::Result<Room> {
        self.get_json(&format!("/rooms/{room_id}/")).await
    }

    pub async fn create_room(&self, name: &str, initial_prompt: &str) -> anyhow::Result<Room> {
        let body = serde_json::json!({ "name": name, "initial_prompt": initial_prompt });
        let response = self
            .http
            .post(self.url("/rooms/"))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .json(&body)
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }

    // -- snapshots ----------------------------------------------------------

    pub async fn messages(&self, room_id: &str) -> anyhow::Result<Vec<Message>> {
        self.get_json(&format!("/messages/?room={room_id}")).await
    }

    pub async fn proposals(&self, room_id: &str) -> anyhow::Result<Vec<Proposal>> {
        self.get_json(&format!("/proposals/?room={room_id}")).await
    }

    pub async fn rounds(&self, room_id: &str) -> anyhow::Result<Vec<Round>> {
        self.get_json(&format!("/rounds/?room={room_id}")).await
    }

    pub async fn leaderboard(&self, room_id: &str) -> anyhow::Result<Vec<LeaderboardEntry>> {
        self.get_json(&format!("/leaderboard/?room={room_id}")).await
    }

    // -- votes (fallback path) ----------------------------------------------

    pub async fn vote(&self, proposal_id: &str) -> anyhow::Result<Vote> {
        let body = serde_json::json!({ "proposal": proposal_id });
        let response = self
            .http
            .post(self.url("/votes/"))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .json(&body)
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn delete_vote(&self, vote_id: &str) -> anyhow::Result<()> {
        self.http
            .delete(self.url(&format!("/votes/{vote_id}/")))
            .basic_auth(self.identity.username(), Some(self.identity.password()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
