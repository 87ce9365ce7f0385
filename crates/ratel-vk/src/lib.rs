// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VK community API adapter for the Ratel bot backend.
//!
//! Implements [`PlatformClient`] over plain HTTPS calls to the VK method
//! API, covering the `groups` long-poll session, `messages`, `polls`,
//! `wall`, and the two-step upload flows.

pub mod api;
pub mod longpoll;
pub mod media;
pub mod upload;

use std::path::PathBuf;

use async_trait::async_trait;
use rand::Rng;
use ratel_config::model::VkConfig;
use ratel_core::error::RatelError;
use ratel_core::events::{OutboundMessage, PlatformEvent};
use ratel_core::platform::{PlatformClient, PlatformPoll};
use ratel_core::types::PeerId;
use tokio::sync::Mutex;
use tracing::{debug, info};

use longpoll::LongPollSession;

/// VK community client implementing [`PlatformClient`].
pub struct VkClient {
    http: reqwest::Client,
    token: String,
    group_id: i64,
    api_base: String,
    session: Mutex<Option<LongPollSession>>,
}

impl VkClient {
    /// Creates a new VK client. Requires `config.token` to be set.
    pub fn new(config: &VkConfig) -> Result<Self, RatelError> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| RatelError::Config("vk.token is required for the VK adapter".into()))?;
        if token.is_empty() {
            return Err(RatelError::Config("vk.token cannot be empty".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            token: token.to_string(),
            group_id: config.group_id,
            api_base: api::API_BASE.to_string(),
            session: Mutex::new(None),
        })
    }

    /// The community id this client acts as (negative by convention).
    pub fn group_id(&self) -> i64 {
        self.group_id
    }
}

#[async_trait]
impl PlatformClient for VkClient {
    async fn long_poll_check(&self) -> Result<Vec<PlatformEvent>, RatelError> {
        let mut slot = self.session.lock().await;
        let session = match slot.as_mut() {
            Some(session) => session,
            None => {
                let session = longpoll::open_session(self).await?;
                info!("long-poll session opened");
                slot.insert(session)
            }
        };
        match longpoll::check(self, session).await? {
            longpoll::CheckOutcome::Events(events) => Ok(events),
            longpoll::CheckOutcome::SessionLost => {
                // Keys and servers expire; the next check re-opens.
                debug!("long-poll session expired");
                *slot = None;
                Ok(Vec::new())
            }
        }
    }

    async fn long_poll_reset(&self) -> Result<(), RatelError> {
        *self.session.lock().await = None;
        Ok(())
    }

    async fn messages_send(&self, message: &OutboundMessage) -> Result<i64, RatelError> {
        let mut params = vec![
            ("peer_id", message.peer_id.0.to_string()),
            ("random_id", rand::thread_rng().r#gen::<i32>().to_string()),
        ];
        if !message.text.is_empty() {
            params.push(("message", message.text.clone()));
        }
        if let Some(attachment) = &message.attachment {
            params.push(("attachment", attachment.clone()));
        }
        if let Some(reply_to) = message.reply_to {
            params.push(("reply_to", reply_to.to_string()));
        }
        if let Some(keyboard) = &message.keyboard {
            params.push(("keyboard", keyboard.to_string()));
        }
        let response = self.call("messages.send", &params).await?;
        response
            .as_i64()
            .ok_or_else(|| RatelError::platform("messages.send returned a non-numeric id"))
    }

    async fn polls_create(
        &self,
        question: &str,
        options: &[String],
    ) -> Result<PlatformPoll, RatelError> {
        let answers = serde_json::to_string(options)
            .map_err(|e| RatelError::Internal(format!("poll answers encode: {e}")))?;
        let params = vec![
            ("question", question.to_string()),
            ("is_anonymous", "0".to_string()),
            ("owner_id", self.group_id.to_string()),
            ("add_answers", answers),
        ];
        let response = self.call("polls.create", &params).await?;
        api::parse_poll(&response)
    }

    async fn polls_get_by_id(
        &self,
        owner_id: i64,
        poll_id: i64,
    ) -> Result<PlatformPoll, RatelError> {
        let params = vec![
            ("owner_id", owner_id.to_string()),
            ("poll_id", poll_id.to_string()),
        ];
        let response = self.call("polls.getById", &params).await?;
        api::parse_poll(&response)
    }

    async fn wall_post(&self, message: &str, attachments: &[String]) -> Result<i64, RatelError> {
        let mut params = vec![
            ("owner_id", self.group_id.to_string()),
            ("from_group", "1".to_string()),
        ];
        if !message.is_empty() {
            params.push(("message", message.to_string()));
        }
        if !attachments.is_empty() {
            params.push(("attachments", attachments.join(",")));
        }
        let response = self.call("wall.post", &params).await?;
        response
            .get("post_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| RatelError::platform("wall.post returned no post_id"))
    }

    async fn upload_video_wall_and_post(&self, path: &PathBuf) -> Result<(), RatelError> {
        upload::video_to_wall(self, path).await
    }

    async fn upload_photo_message(
        &self,
        peer_id: PeerId,
        path: &PathBuf,
    ) -> Result<String, RatelError> {
        upload::photo_for_message(self, peer_id, path).await
    }
}
