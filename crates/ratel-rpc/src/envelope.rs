// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire envelope carried on broker queues.
//!
//! One JSON document per message. The body travels base64-encoded so the
//! envelope stays valid JSON regardless of payload bytes. Every reply carries
//! the originating correlation id and exactly one kind.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::codec;
use crate::error::RpcError;

/// The message kind. A request observes exactly one terminal reply kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Success,
    Canceled,
    Error,
    Exception,
    NoHandler,
}

/// A broker message: request or reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Opaque unique token echoed on the reply.
    pub correlation_id: String,
    /// RPC method name; present on requests only.
    #[serde(default)]
    pub method: Option<String>,
    pub kind: MessageKind,
    pub content_type: String,
    /// Base64-encoded body bytes; empty string for a null body.
    #[serde(default)]
    pub body: String,
    /// Reply queue for requests; absent on replies.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub priority: u8,
    /// Milliseconds the request stays valid, bounded by the caller's await.
    #[serde(default)]
    pub expiration_ms: Option<u64>,
    /// Epoch milliseconds at creation.
    pub timestamp: i64,
}

impl Envelope {
    /// Build a request envelope with a fresh correlation id.
    pub fn request(
        method: &str,
        body: &[u8],
        reply_to: &str,
        priority: u8,
        expiration_ms: Option<u64>,
    ) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().simple().to_string(),
            method: Some(method.to_string()),
            kind: MessageKind::Request,
            content_type: codec::CONTENT_TYPE_JSON.to_string(),
            body: BASE64.encode(body),
            reply_to: Some(reply_to.to_string()),
            priority,
            expiration_ms,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build the reply to this envelope, echoing the correlation id.
    pub fn reply(&self, kind: MessageKind, body: &[u8]) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            method: None,
            kind,
            content_type: codec::CONTENT_TYPE_JSON.to_string(),
            body: BASE64.encode(body),
            reply_to: None,
            priority: self.priority,
            expiration_ms: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Decode the body back into raw bytes.
    pub fn body_bytes(&self) -> Result<Vec<u8>, RpcError> {
        BASE64
            .decode(&self.body)
            .map_err(|e| RpcError::Codec(format!("invalid body encoding: {e}")))
    }

    /// Serialize the envelope for publishing.
    pub fn to_wire(&self) -> Result<String, RpcError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope off the wire.
    pub fn from_wire(raw: &str) -> Result<Self, RpcError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Body of an `error` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Body of an `exception` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionBody {
    pub class: String,
    pub message: String,
    #[serde(default = "default_exception_kind")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn default_exception_kind() -> String {
    "unknown".to_string()
}

/// Body of a `no_handler` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoHandlerBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_reply_echoes_correlation_id() {
        let req = Envelope::request("ping", b"{}", "asynctask.clients.abc", 0, Some(30_000));
        let rep = req.reply(MessageKind::Success, b"{\"pong\":true}");
        assert_eq!(rep.correlation_id, req.correlation_id);
        assert_eq!(rep.kind, MessageKind::Success);
        assert!(rep.reply_to.is_none());
        assert!(rep.method.is_none());
    }

    #[test]
    fn wire_round_trip() {
        let req = Envelope::request("gpt_chat", b"{\"user_id\":1}", "q", 3, None);
        let raw = req.to_wire().unwrap();
        let back = Envelope::from_wire(&raw).unwrap();
        assert_eq!(back.correlation_id, req.correlation_id);
        assert_eq!(back.method.as_deref(), Some("gpt_chat"));
        assert_eq!(back.body_bytes().unwrap(), b"{\"user_id\":1}");
        assert_eq!(back.priority, 3);
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageKind::NoHandler).unwrap(),
            "\"no_handler\""
        );
        assert_eq!(MessageKind::Canceled.to_string(), "canceled");
    }

    #[test]
    fn empty_body_round_trips() {
        let req = Envelope::request("noop", b"", "q", 0, None);
        assert!(req.body_bytes().unwrap().is_empty());
    }
}
