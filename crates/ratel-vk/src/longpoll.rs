// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-poll session handling and wire-to-event mapping.
//!
//! The session triple (`server`, `key`, `ts`) comes from
//! `groups.getLongPollServer`. `failed: 1` just advances `ts`; `failed: 2`
//! and `3` invalidate the key and force a re-open.

use ratel_core::error::RatelError;
use ratel_core::events::{
    Attachment, CallbackPayload, PhotoSize, PlatformEvent, PollVoteEvent, VkMessage,
};
use ratel_core::types::{PeerId, UserId};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::VkClient;
use crate::api::wrap_http;

const WAIT_SECS: u32 = 25;

/// One allocated long-poll session.
#[derive(Debug, Clone)]
pub struct LongPollSession {
    pub server: String,
    pub key: String,
    pub ts: String,
}

pub(crate) enum CheckOutcome {
    Events(Vec<PlatformEvent>),
    /// The key or server expired; the caller must re-open.
    SessionLost,
}

pub(crate) async fn open_session(client: &VkClient) -> Result<LongPollSession, RatelError> {
    let params = vec![("group_id", client.group_id.abs().to_string())];
    let response = client.call("groups.getLongPollServer", &params).await?;

    #[derive(Deserialize)]
    struct Wire {
        server: String,
        key: String,
        ts: String,
    }
    let wire: Wire = serde_json::from_value(response)
        .map_err(|e| RatelError::platform(format!("long-poll server response: {e}")))?;
    Ok(LongPollSession {
        server: wire.server,
        key: wire.key,
        ts: wire.ts,
    })
}

pub(crate) async fn check(
    client: &VkClient,
    session: &mut LongPollSession,
) -> Result<CheckOutcome, RatelError> {
    let body: Value = client
        .http
        .get(&session.server)
        .query(&[
            ("act", "a_check"),
            ("key", session.key.as_str()),
            ("ts", session.ts.as_str()),
            ("wait", &WAIT_SECS.to_string()),
        ])
        .send()
        .await
        .map_err(|e| wrap_http("long_poll", e))?
        .json()
        .await
        .map_err(|e| wrap_http("long_poll", e))?;

    if let Some(failed) = body.get("failed").and_then(Value::as_i64) {
        if failed == 1 {
            if let Some(ts) = body.get("ts") {
                session.ts = ts_to_string(ts);
            }
            debug!("long-poll history lag, ts advanced");
            return Ok(CheckOutcome::Events(Vec::new()));
        }
        return Ok(CheckOutcome::SessionLost);
    }

    if let Some(ts) = body.get("ts") {
        session.ts = ts_to_string(ts);
    }
    let events = body
        .get("updates")
        .and_then(Value::as_array)
        .map(|updates| updates.iter().filter_map(map_update).collect())
        .unwrap_or_default();
    Ok(CheckOutcome::Events(events))
}

// The API is inconsistent about whether ts is a string or a number.
fn ts_to_string(ts: &Value) -> String {
    match ts {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map one wire update to a platform event. Unknown update types are
/// dropped with a debug log; a malformed payload of a known type warns.
pub(crate) fn map_update(update: &Value) -> Option<PlatformEvent> {
    let kind = update.get("type").and_then(Value::as_str)?;
    let object = update.get("object")?;
    let mapped = match kind {
        "message_new" => object
            .get("message")
            .or(Some(object))
            .and_then(parse_message)
            .map(PlatformEvent::NewMessage),
        "message_reply" => parse_message(object).map(PlatformEvent::MessageReply),
        "message_event" => serde_json::from_value::<WireCallback>(object.clone())
            .ok()
            .map(|w| {
                PlatformEvent::CallbackEvent(CallbackPayload {
                    user_id: UserId(w.user_id),
                    peer_id: PeerId(w.peer_id),
                    event_id: w.event_id,
                    payload: w.payload,
                })
            }),
        "poll_vote_new" => serde_json::from_value::<WireVote>(object.clone())
            .ok()
            .map(|w| {
                PlatformEvent::PollVoteNew(PollVoteEvent {
                    poll_id: w.poll_id,
                    owner_id: UserId(w.owner_id),
                    user_id: UserId(w.user_id),
                    option_id: w.option_id,
                })
            }),
        other => {
            debug!(kind = other, "ignoring unhandled update type");
            return None;
        }
    };
    if mapped.is_none() {
        warn!(kind, "dropping malformed update payload");
    }
    mapped
}

#[derive(Deserialize)]
struct WireCallback {
    user_id: i64,
    peer_id: i64,
    event_id: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct WireVote {
    poll_id: i64,
    owner_id: i64,
    user_id: i64,
    option_id: i64,
}

#[derive(Deserialize)]
struct WireMessage {
    id: i64,
    from_id: i64,
    peer_id: i64,
    date: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Vec<Value>,
    #[serde(default)]
    reply_message: Option<Box<WireMessage>>,
}

fn parse_message(object: &Value) -> Option<VkMessage> {
    let wire: WireMessage = serde_json::from_value(object.clone()).ok()?;
    Some(convert_message(wire))
}

fn convert_message(wire: WireMessage) -> VkMessage {
    VkMessage {
        id: wire.id,
        from_id: UserId(wire.from_id),
        peer_id: PeerId(wire.peer_id),
        date: wire.date,
        text: wire.text,
        attachments: wire
            .attachments
            .iter()
            .filter_map(parse_attachment)
            .collect(),
        reply_message: wire
            .reply_message
            .map(|inner| Box::new(convert_message(*inner))),
    }
}

/// The wire shape nests the payload under a key named after the type:
/// `{"type": "photo", "photo": {...}}`.
fn parse_attachment(value: &Value) -> Option<Attachment> {
    let kind = value.get("type").and_then(Value::as_str)?;
    let payload = value.get(kind)?;
    match kind {
        "photo" => Some(Attachment::Photo {
            sizes: parse_sizes(payload.get("sizes")),
        }),
        "video" => Some(Attachment::Video {
            owner_id: payload.get("owner_id")?.as_i64()?,
            id: payload.get("id")?.as_i64()?,
            access_key: payload
                .get("access_key")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "wall" => Some(Attachment::Wall {
            attachments: payload
                .get("attachments")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(parse_attachment).collect())
                .unwrap_or_default(),
        }),
        "doc" => Some(Attachment::Doc {
            url: payload.get("url")?.as_str()?.to_string(),
            ext: payload
                .get("ext")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "story" => Some(Attachment::Story {
            photo_sizes: parse_sizes(payload.get("photo").and_then(|p| p.get("sizes"))),
        }),
        _ => None,
    }
}

fn parse_sizes(sizes: Option<&Value>) -> Vec<PhotoSize> {
    sizes
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| {
                    Some(PhotoSize {
                        url: s.get("url")?.as_str()?.to_string(),
                        width: s.get("width")?.as_u64()? as u32,
                        height: s.get("height")?.as_u64()? as u32,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
