// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row models for the typed query modules.

use serde::{Deserialize, Serialize};

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRow {
    pub id: i64,
    /// Signed author id; negative means community or bot.
    pub from_id: i64,
    pub peer_id: i64,
    pub from_chat: bool,
    pub from_bot: bool,
    /// Epoch seconds.
    pub date: i64,
    pub text: String,
    /// Opaque attachment JSON.
    pub attachments: Option<String>,
    pub reply_message_id: Option<i64>,
}

/// A trigger phrase with its optional canned answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRow {
    pub id: i64,
    /// Case-folded on write.
    pub trigger: String,
    pub answer: Option<String>,
    pub attachment: Option<String>,
    pub enabled: bool,
}

/// One candidate answer under a matched trigger phrase.
#[derive(Debug, Clone)]
pub struct TriggerCandidate {
    pub id: i64,
    pub trigger: String,
    pub answer: Option<String>,
    pub attachment: Option<String>,
}

/// An append-only record of a trigger firing.
#[derive(Debug, Clone)]
pub struct TriggerHistoryRow {
    pub id: i64,
    pub trigger_id: i64,
    pub author_id: i64,
    /// Snapshot of the matched message, JSON.
    pub message: String,
    pub created_at: String,
}

/// A cron-scheduled outbound send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSendRow {
    pub id: i64,
    pub cron: String,
    pub peer_id: i64,
    pub message: String,
    pub enabled: bool,
}

/// A voting poll mirror row.
#[derive(Debug, Clone)]
pub struct PollRow {
    pub id: i64,
    /// Platform-side attachment reference, e.g. `video-1_2`.
    pub key: String,
    pub service: String,
    /// Disabled means the result was already acted on.
    pub enabled: bool,
}

/// A presence session: half-open interval per (user, kind).
#[derive(Debug, Clone)]
pub struct PresenceSessionRow {
    pub id: i64,
    pub user_id: i64,
    /// `activity` or `status`.
    pub kind: String,
    pub name: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// Terminal state of an in-process bot task.
#[derive(Debug, Clone)]
pub struct BotTaskRow {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    /// JSON projection of the captured arguments.
    pub args: String,
    pub tries: u32,
    /// JSON array of error strings.
    pub errors: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub done_at: Option<String>,
}
