// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed contracts for the remote services the bot calls over the broker.

use std::sync::Arc;

use async_trait::async_trait;
use ratel_core::RatelError;
use ratel_rpc::retry::call_retrying;
use ratel_rpc::{CallOptions, RetryPolicy, RpcClient};
use serde::{Deserialize, Serialize};

/// Image recognition is slow; its calls get a longer expiration.
pub const IMAGE_TAGS_TIMEOUT_SECS: u64 = 90;
pub const GPT_CHAT_TIMEOUT_SECS: u64 = 30;
pub const SPEECH_TO_TEXT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTagsRequest {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageTagsResponse {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub text_on_image: Option<String>,
    #[serde(default)]
    pub products_data: Vec<serde_json::Value>,
}

impl ImageTagsResponse {
    /// Everything searchable the recognizer produced, for trigger matching.
    pub fn search_terms(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .chain(self.description.as_deref())
            .chain(self.text_on_image.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GptChatRequest {
    pub user_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GptChatResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechToTextRequest {
    pub filename: String,
    pub base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechToTextResponse {
    pub text: String,
}

/// The remote calls the message handlers make. Behind a trait so tests can
/// substitute canned responses.
#[async_trait]
pub trait BotRpc: Send + Sync {
    async fn get_image_tags(&self, url: &str) -> Result<ImageTagsResponse, RatelError>;
    async fn gpt_chat(&self, user_id: i64, message: &str) -> Result<String, RatelError>;
    async fn speech_to_text(&self, filename: &str, base64: &str) -> Result<String, RatelError>;
}

/// Production gateway: an [`RpcClient`] under the configured retry policy.
pub struct RpcGateway {
    client: Arc<RpcClient>,
    policy: RetryPolicy,
}

impl RpcGateway {
    pub fn new(client: Arc<RpcClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl BotRpc for RpcGateway {
    async fn get_image_tags(&self, url: &str) -> Result<ImageTagsResponse, RatelError> {
        let request = ImageTagsRequest {
            url: url.to_string(),
        };
        let response = call_retrying(&self.policy, || {
            self.client.call::<_, ImageTagsResponse>(
                "get_image_tags",
                &request,
                CallOptions::expiring_secs(IMAGE_TAGS_TIMEOUT_SECS),
            )
        })
        .await?;
        Ok(response)
    }

    async fn gpt_chat(&self, user_id: i64, message: &str) -> Result<String, RatelError> {
        let request = GptChatRequest {
            user_id,
            message: message.to_string(),
        };
        let response = call_retrying(&self.policy, || {
            self.client.call::<_, GptChatResponse>(
                "gpt_chat",
                &request,
                CallOptions::expiring_secs(GPT_CHAT_TIMEOUT_SECS),
            )
        })
        .await?;
        Ok(response.message)
    }

    async fn speech_to_text(&self, filename: &str, base64: &str) -> Result<String, RatelError> {
        let request = SpeechToTextRequest {
            filename: filename.to_string(),
            base64: base64.to_string(),
        };
        let response = call_retrying(&self.policy, || {
            self.client.call::<_, SpeechToTextResponse>(
                "speech_to_text",
                &request,
                CallOptions::expiring_secs(SPEECH_TO_TEXT_TIMEOUT_SECS),
            )
        })
        .await?;
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tags_response_tolerates_missing_fields() {
        let response: ImageTagsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.tags.is_empty());
        assert!(response.description.is_none());
        assert!(response.text_on_image.is_none());
        assert!(response.products_data.is_empty());
    }

    #[test]
    fn image_tags_response_carries_full_recognizer_output() {
        let json = r#"{
            "tags": ["cat", "sofa"],
            "description": "a cat on a sofa",
            "text_on_image": "hello",
            "products_data": [{"name": "sofa", "price": 100}]
        }"#;
        let response: ImageTagsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.products_data.len(), 1);
        let terms: Vec<&str> = response.search_terms().collect();
        assert_eq!(terms, ["cat", "sofa", "a cat on a sofa", "hello"]);
    }

    #[test]
    fn chat_request_carries_user_id_and_message() {
        let request = GptChatRequest {
            user_id: 42,
            message: "hi".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_id"], 42);
        assert_eq!(json["message"], "hi");
    }

    #[test]
    fn speech_request_carries_filename_and_base64() {
        let request = SpeechToTextRequest {
            filename: "voice.ogg".into(),
            base64: "b2dn".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["filename"], "voice.ogg");
        assert_eq!(json["base64"], "b2dn");
    }
}
