// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams behind which the third-party platform SDKs live.
//!
//! The orchestrator only ever sees these traits; the concrete VK HTTP
//! adapter lives in `ratel-vk`, and tests substitute recording doubles.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::RatelError;
use crate::events::{OutboundMessage, PlatformEvent};
use crate::types::PeerId;

/// One answer option of a platform poll with its current tally.
#[derive(Debug, Clone)]
pub struct PollOption {
    pub id: i64,
    pub text: String,
    pub votes: u32,
}

/// A platform-side poll as returned by `polls.create` / `polls.get_by_id`.
#[derive(Debug, Clone)]
pub struct PlatformPoll {
    pub id: i64,
    pub owner_id: i64,
    pub question: String,
    pub options: Vec<PollOption>,
}

impl PlatformPoll {
    /// The `poll<owner>_<id>` reference used to attach this poll to a message.
    pub fn attachment_reference(&self) -> String {
        format!("poll{}_{}", self.owner_id, self.id)
    }
}

/// The platform client surface the orchestrator consumes.
///
/// Mirrors the upstream API families (`long_poll`, `messages`, `wall`,
/// `upload`, `polls`) without exposing any SDK types.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Block on the long-poll session and return the next batch of events.
    async fn long_poll_check(&self) -> Result<Vec<PlatformEvent>, RatelError>;

    /// Drop and re-allocate the long-poll session after a transient failure.
    async fn long_poll_reset(&self) -> Result<(), RatelError>;

    /// Send a chat message; returns the platform message id.
    async fn messages_send(&self, message: &OutboundMessage) -> Result<i64, RatelError>;

    /// Create a poll owned by the community; `question` is free text.
    async fn polls_create(
        &self,
        question: &str,
        options: &[String],
    ) -> Result<PlatformPoll, RatelError>;

    /// Fetch a poll with its current vote tallies.
    async fn polls_get_by_id(&self, owner_id: i64, poll_id: i64)
    -> Result<PlatformPoll, RatelError>;

    /// Post an attachment reference to the community wall.
    async fn wall_post(&self, message: &str, attachments: &[String]) -> Result<i64, RatelError>;

    /// Upload a local video file to the wall and post it.
    async fn upload_video_wall_and_post(&self, path: &PathBuf) -> Result<(), RatelError>;

    /// Upload a photo for use in a chat message; returns the attachment reference.
    async fn upload_photo_message(
        &self,
        peer_id: PeerId,
        path: &PathBuf,
    ) -> Result<String, RatelError>;
}

/// Media retrieval behind an opaque downloader (yt-dlp and friends upstream).
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the video identified by its attachment reference into a
    /// temporary file. The caller removes the file when done.
    async fn download_video(&self, reference: &str) -> Result<PathBuf, RatelError>;

    /// Fetch a small media file (voice messages) into memory.
    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, RatelError>;
}

/// Object storage for ingest-chat photos (S3-compatible upstream).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the object fetched from `url` under `key`.
    async fn put_from_url(&self, key: &str, url: &str) -> Result<(), RatelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_attachment_reference_format() {
        let poll = PlatformPoll {
            id: 7,
            owner_id: -123,
            question: "42".into(),
            options: vec![],
        };
        assert_eq!(poll.attachment_reference(), "poll-123_7");
    }
}
