// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RPC error taxonomy.
//!
//! Mirrors the reply kinds a caller can observe, plus the local transport
//! failures. Which variants are retried, and at what cost to the retry
//! budget, is decided in [`crate::retry`].

use thiserror::Error;

/// Errors surfaced by RPC calls and the worker loop.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The remote handler was canceled mid-flight, or the call was canceled
    /// locally (client close, channel close without cause).
    #[error("task canceled")]
    Canceled,

    /// The remote handler reported a logical error.
    #[error("task error: {message}")]
    Task { message: String },

    /// The remote handler raised an exception.
    #[error("task exception [{class}]: {message}")]
    Exception {
        /// The remote's self-declared class string. The retry ignore-set is
        /// matched against this field, never against a local type name.
        class: String,
        message: String,
        kind: String,
        data: Option<serde_json::Value>,
    },

    /// No handler is registered for the requested method.
    #[error("no handler: {0}")]
    NoHandler(String),

    /// The request could not be routed: no live consumer on the service queue.
    #[error("message returned: no route to service queue")]
    Returned,

    /// The call did not complete within its expiration.
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The reply channel closed with the given cause.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Broker transport failure.
    #[error("broker error: {0}")]
    Broker(String),

    /// Payload (de)serialization failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Caller misuse that must never be retried.
    #[error("programming error: {0}")]
    Programming(String),
}

impl From<redis::RedisError> for RpcError {
    fn from(e: redis::RedisError) -> Self {
        RpcError::Broker(e.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Codec(e.to_string())
    }
}

impl From<RpcError> for ratel_core::RatelError {
    fn from(e: RpcError) -> Self {
        ratel_core::RatelError::Rpc(e.to_string())
    }
}
