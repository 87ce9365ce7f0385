// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence session tracking.
//!
//! Consumes activity and status observations, either pushed by an event
//! handler or pulled from a [`PresenceFeed`] on an interval, and maintains
//! half-open session rows in storage. Session semantics (one open session
//! per user and kind) live in the storage layer; this crate adds the
//! exclusion filter and the feed loops.

mod tracker;

pub use ratel_storage::queries::presence::SessionChange;
pub use tracker::{Observation, PresenceFeed, PresenceKind, PresenceTracker};
