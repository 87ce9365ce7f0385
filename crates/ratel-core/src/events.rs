// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform event and attachment model.
//!
//! Attachments form a tagged sum (`photo | video | wall | doc | story`).
//! The one operation every consumer needs is "extract the URL of the
//! largest image", which recurses through reposted wall content.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{PeerId, UserId};

/// Kinds of long-poll events the orchestrator dispatches on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewMessage,
    MessageReply,
    CallbackEvent,
    PollVoteNew,
}

/// A long-poll event together with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformEvent {
    NewMessage(VkMessage),
    MessageReply(VkMessage),
    CallbackEvent(CallbackPayload),
    PollVoteNew(PollVoteEvent),
}

impl PlatformEvent {
    /// The registry key this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            PlatformEvent::NewMessage(_) => EventKind::NewMessage,
            PlatformEvent::MessageReply(_) => EventKind::MessageReply,
            PlatformEvent::CallbackEvent(_) => EventKind::CallbackEvent,
            PlatformEvent::PollVoteNew(_) => EventKind::PollVoteNew,
        }
    }
}

/// An incoming chat message as delivered by the long-poll session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VkMessage {
    pub id: i64,
    pub from_id: UserId,
    pub peer_id: PeerId,
    /// Epoch seconds.
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// The message this one replies to, if any.
    #[serde(default)]
    pub reply_message: Option<Box<VkMessage>>,
}

impl VkMessage {
    /// Whether the message came from a group chat.
    pub fn from_chat(&self) -> bool {
        self.peer_id.is_chat()
    }

    /// Whether the message was authored by a community or bot.
    pub fn from_bot(&self) -> bool {
        self.from_id.is_group()
    }
}

/// A callback button press.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub user_id: UserId,
    pub peer_id: PeerId,
    pub event_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A new vote on a platform poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollVoteEvent {
    pub poll_id: i64,
    pub owner_id: UserId,
    pub user_id: UserId,
    pub option_id: i64,
}

/// One rendition of a photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// The platform attachment tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Photo {
        #[serde(default)]
        sizes: Vec<PhotoSize>,
    },
    Video {
        owner_id: i64,
        id: i64,
        #[serde(default)]
        access_key: Option<String>,
    },
    Wall {
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    Doc {
        url: String,
        #[serde(default)]
        ext: Option<String>,
    },
    Story {
        #[serde(default)]
        photo_sizes: Vec<PhotoSize>,
    },
}

impl Attachment {
    /// URL of the largest image carried by this attachment, recursing
    /// through reposted wall content. `None` for non-image attachments.
    pub fn largest_photo_url(&self) -> Option<&str> {
        match self {
            Attachment::Photo { sizes } | Attachment::Story { photo_sizes: sizes } => sizes
                .iter()
                .max_by_key(|s| u64::from(s.width) * u64::from(s.height))
                .map(|s| s.url.as_str()),
            Attachment::Wall { attachments } => attachments
                .iter()
                .find_map(|a| a.largest_photo_url()),
            Attachment::Video { .. } | Attachment::Doc { .. } => None,
        }
    }

    /// The `video<owner>_<id>[_<key>]` reference used for wall uploads.
    pub fn video_reference(&self) -> Option<String> {
        match self {
            Attachment::Video {
                owner_id,
                id,
                access_key,
            } => Some(match access_key {
                Some(key) => format!("video{owner_id}_{id}_{key}"),
                None => format!("video{owner_id}_{id}"),
            }),
            _ => None,
        }
    }
}

/// An outbound chat message submitted through the in-process worker queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub peer_id: PeerId,
    #[serde(default)]
    pub text: String,
    /// Platform attachment reference string, e.g. `photo-1_2`.
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
    /// Opaque keyboard JSON, passed through to the platform.
    #[serde(default)]
    pub keyboard: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(sizes: &[(u32, u32)]) -> Attachment {
        Attachment::Photo {
            sizes: sizes
                .iter()
                .map(|(w, h)| PhotoSize {
                    url: format!("https://img/{w}x{h}"),
                    width: *w,
                    height: *h,
                })
                .collect(),
        }
    }

    #[test]
    fn largest_photo_picks_max_area() {
        let a = photo(&[(100, 100), (1280, 720), (640, 480)]);
        assert_eq!(a.largest_photo_url(), Some("https://img/1280x720"));
    }

    #[test]
    fn wall_recurses_into_nested_attachments() {
        let wall = Attachment::Wall {
            attachments: vec![
                Attachment::Doc {
                    url: "https://doc".into(),
                    ext: None,
                },
                Attachment::Wall {
                    attachments: vec![photo(&[(10, 10)])],
                },
            ],
        };
        assert_eq!(wall.largest_photo_url(), Some("https://img/10x10"));
    }

    #[test]
    fn video_reference_formats() {
        let v = Attachment::Video {
            owner_id: -1,
            id: 2,
            access_key: None,
        };
        assert_eq!(v.video_reference().as_deref(), Some("video-1_2"));

        let v = Attachment::Video {
            owner_id: -1,
            id: 2,
            access_key: Some("abc".into()),
        };
        assert_eq!(v.video_reference().as_deref(), Some("video-1_2_abc"));
    }

    #[test]
    fn event_kind_round_trips_as_snake_case() {
        use std::str::FromStr;
        assert_eq!(EventKind::NewMessage.to_string(), "new_message");
        assert_eq!(
            EventKind::from_str("poll_vote_new").unwrap(),
            EventKind::PollVoteNew
        );
    }

    #[test]
    fn from_chat_matches_peer_threshold() {
        let mut msg = VkMessage::default();
        msg.peer_id = PeerId(2_000_000_001);
        assert!(msg.from_chat());
        msg.peer_id = PeerId(42);
        assert!(!msg.from_chat());
    }
}
