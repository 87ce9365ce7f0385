// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common scalar types and platform constants.

use serde::{Deserialize, Serialize};

/// Conversation peer identifiers at or above this value are group chats;
/// below it they are direct dialogs.
pub const CHAT_PEER_BASE: i64 = 2_000_000_000;

/// A platform peer (dialog or chat) identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub i64);

impl PeerId {
    /// Whether this peer is a group chat rather than a direct dialog.
    pub fn is_chat(self) -> bool {
        self.0 >= CHAT_PEER_BASE
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A platform user identifier. Negative values denote communities and bots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Whether the id belongs to a community or bot rather than a person.
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_peer_threshold() {
        assert!(PeerId(CHAT_PEER_BASE).is_chat());
        assert!(PeerId(CHAT_PEER_BASE + 1).is_chat());
        assert!(!PeerId(CHAT_PEER_BASE - 1).is_chat());
        assert!(!PeerId(12345).is_chat());
    }

    #[test]
    fn negative_ids_are_groups() {
        assert!(UserId(-1).is_group());
        assert!(!UserId(42).is_group());
    }
}
