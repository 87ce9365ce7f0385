// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Ratel bot backend.
//!
//! This crate provides the foundational error type, the platform event and
//! attachment model, and the trait seams behind which the third-party
//! platform SDKs live. Every other workspace crate builds on top of it.

pub mod error;
pub mod events;
pub mod platform;
pub mod types;

pub use error::RatelError;
pub use events::{Attachment, EventKind, OutboundMessage, PlatformEvent, VkMessage};
pub use platform::{MediaFetcher, ObjectStore, PlatformClient, PlatformPoll, PollOption};
pub use types::{PeerId, UserId, CHAT_PEER_BASE};
