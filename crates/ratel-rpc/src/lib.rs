// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlated request/reply RPC over the Redis broker.
//!
//! One well-known service queue per worker (`tasks.<service>`), one
//! auto-deleted reply queue per client (`asynctask.clients.<hex>`). Every
//! request carries a fresh correlation id; every reply carries it back with
//! exactly one kind out of `success | canceled | error | exception |
//! no_handler`. Mandatory routing is approximated with a TTL'd
//! consumer-presence key per service queue: publishing to a queue with no
//! live consumer fails as [`RpcError::Returned`].

pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod retry;
pub mod worker;

pub use client::{CallOptions, RpcClient};
pub use envelope::{Envelope, MessageKind};
pub use error::RpcError;
pub use retry::RetryPolicy;
pub use worker::{HandlerError, RpcWorker};

/// Naming convention for service queues.
pub fn service_queue_name(service: &str) -> String {
    format!("tasks.{service}")
}

/// Naming convention for the per-queue consumer-presence key.
pub fn presence_key_name(queue: &str) -> String {
    format!("{queue}.consumers")
}
