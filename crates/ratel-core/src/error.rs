// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the Ratel workspace.

use thiserror::Error;

/// The primary error type used across Ratel services and adapters.
#[derive(Debug, Error)]
pub enum RatelError {
    /// Configuration errors (invalid TOML, missing required fields, bad cron).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Platform client errors (long-poll failure, send failure, upload failure).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// RPC bus errors surfaced to callers outside `ratel-rpc`.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RatelError {
    /// Shorthand for a platform error without an underlying source.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_stable() {
        assert_eq!(
            RatelError::Config("bad cron".into()).to_string(),
            "configuration error: bad cron"
        );
        assert_eq!(
            RatelError::platform("long-poll failed").to_string(),
            "platform error: long-poll failed"
        );
        assert_eq!(
            RatelError::Rpc("no handler".into()).to_string(),
            "rpc error: no handler"
        );
    }
}
