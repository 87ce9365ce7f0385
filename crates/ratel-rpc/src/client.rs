// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RPC client: typed calls with correlated replies.
//!
//! One client per target service queue. On construction the client declares
//! its own reply queue with a random unique name and starts a consumer that
//! drains it. Replies are matched against an owned pending map keyed by
//! correlation id; the map is mutated only by the reply consumer and the
//! call path. Orphan replies are dropped. On close every pending call is
//! canceled in one pass and the reply queue is deleted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec;
use crate::envelope::{Envelope, ErrorBody, ExceptionBody, MessageKind, NoHandlerBody};
use crate::error::RpcError;
use crate::presence_key_name;

/// Per-call knobs.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub priority: u8,
    /// Upper bound on the await; the remote handler is not canceled on expiry.
    pub expiration: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            expiration: Duration::from_secs(60),
        }
    }
}

impl CallOptions {
    /// Options with the given expiration in seconds.
    pub fn expiring_secs(secs: u64) -> Self {
        Self {
            expiration: Duration::from_secs(secs),
            ..Self::default()
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Envelope, RpcError>>>>>;

/// An RPC client bound to one target service queue.
pub struct RpcClient {
    manager: ConnectionManager,
    service_queue: String,
    reply_queue: String,
    pending: PendingMap,
    cancel: CancellationToken,
    consumer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RpcClient {
    /// Create a client for the given service queue and start its reply consumer.
    pub fn new(manager: ConnectionManager, service_queue: impl Into<String>) -> Self {
        let reply_queue = format!(
            "asynctask.clients.{}",
            uuid::Uuid::new_v4().simple()
        );
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let consumer = tokio::spawn(consume_replies(
            manager.clone(),
            reply_queue.clone(),
            pending.clone(),
            cancel.clone(),
        ));

        Self {
            manager,
            service_queue: service_queue.into(),
            reply_queue,
            pending,
            cancel,
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// The name of this client's reply queue.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Issue a typed call and await its reply.
    pub async fn call<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        opts: CallOptions,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = self.call_raw(method, request, opts).await?;
        codec::unpack(&body)
    }

    /// Issue a typed call whose success reply may carry an empty body.
    pub async fn call_nullable<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        opts: CallOptions,
    ) -> Result<Option<Resp>, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = self.call_raw(method, request, opts).await?;
        codec::unpack_optional(&body)
    }

    /// Issue a call expecting no response body at all.
    pub async fn call_unit<Req>(
        &self,
        method: &str,
        request: &Req,
        opts: CallOptions,
    ) -> Result<(), RpcError>
    where
        Req: Serialize,
    {
        let body = self.call_raw(method, request, opts).await?;
        codec::expect_empty(&body)
    }

    async fn call_raw<Req: Serialize>(
        &self,
        method: &str,
        request: &Req,
        opts: CallOptions,
    ) -> Result<Vec<u8>, RpcError> {
        let mut manager = self.manager.clone();

        // Mandatory routing: a queue with no live consumer returns the message.
        let routable: bool = manager
            .exists(presence_key_name(&self.service_queue))
            .await?;
        if !routable {
            return Err(RpcError::Returned);
        }

        let body = codec::pack(Some(request))?;
        let envelope = Envelope::request(
            method,
            &body,
            &self.reply_queue,
            opts.priority,
            Some(opts.expiration.as_millis() as u64),
        );
        let correlation_id = envelope.correlation_id.clone();

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            pending.insert(correlation_id.clone(), tx);
        }

        let wire = envelope.to_wire()?;
        let publish: Result<(), RpcError> = async {
            let _: () = manager.rpush(&self.service_queue, wire).await?;
            Ok(())
        }
        .await;
        if let Err(e) = publish {
            self.forget(&correlation_id);
            return Err(e);
        }

        debug!(
            method,
            correlation_id = correlation_id.as_str(),
            queue = self.service_queue.as_str(),
            "rpc call published"
        );

        let reply = match tokio::time::timeout(opts.expiration, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(RpcError::Canceled),
            Err(_) => {
                self.forget(&correlation_id);
                return Err(RpcError::Timeout(opts.expiration));
            }
        };

        reply_to_result(&reply)
    }

    fn forget(&self, correlation_id: &str) {
        let mut pending = self.pending.lock().expect("pending map poisoned");
        pending.remove(correlation_id);
    }

    /// Number of calls still awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().expect("pending map poisoned").len()
    }

    /// Cancel all pending calls, stop the consumer, and delete the reply queue.
    pub async fn close(&self) -> Result<(), RpcError> {
        self.cancel.cancel();

        let handle = self.consumer.lock().expect("consumer slot poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        fail_all_pending(&self.pending, || Err(RpcError::Canceled));

        let mut manager = self.manager.clone();
        let _: () = manager.del(&self.reply_queue).await?;
        debug!(reply_queue = self.reply_queue.as_str(), "rpc client closed");
        Ok(())
    }
}

/// Reply consumer loop: drain the reply queue and resolve pending calls.
async fn consume_replies(
    mut manager: ConnectionManager,
    reply_queue: String,
    pending: PendingMap,
    cancel: CancellationToken,
) {
    loop {
        let popped: Result<Option<(String, String)>, redis::RedisError> = tokio::select! {
            _ = cancel.cancelled() => break,
            res = manager.blpop(&reply_queue, 1.0) => res,
        };

        match popped {
            Ok(Some((_, payload))) => dispatch_reply(&pending, &payload),
            Ok(None) => continue,
            Err(e) => {
                // Channel closed with an error: fail every pending call with
                // the close cause in one pass.
                warn!(error = %e, "reply consumer lost the broker connection");
                let cause = e.to_string();
                fail_all_pending(&pending, || Err(RpcError::ChannelClosed(cause.clone())));
                break;
            }
        }
    }
}

/// Match one incoming reply against the pending map.
///
/// Orphan replies (no matching pending call) are dropped.
fn dispatch_reply(pending: &PendingMap, payload: &str) {
    let envelope = match Envelope::from_wire(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "dropping malformed reply");
            return;
        }
    };
    if envelope.kind == MessageKind::Request {
        warn!(
            correlation_id = envelope.correlation_id.as_str(),
            "dropping request kind on reply queue"
        );
        return;
    }

    let sender = {
        let mut map = pending.lock().expect("pending map poisoned");
        map.remove(&envelope.correlation_id)
    };
    match sender {
        Some(tx) => {
            // The call path may have timed out concurrently; a dead receiver
            // is the same as an orphan.
            let _ = tx.send(Ok(envelope));
        }
        None => {
            debug!(
                correlation_id = envelope.correlation_id.as_str(),
                "dropping orphan reply"
            );
        }
    }
}

/// Fail every pending call with the error produced by `make`.
fn fail_all_pending<F>(pending: &PendingMap, make: F)
where
    F: Fn() -> Result<Envelope, RpcError>,
{
    let drained: Vec<_> = {
        let mut map = pending.lock().expect("pending map poisoned");
        map.drain().collect()
    };
    for (_, tx) in drained {
        let _ = tx.send(make());
    }
}

/// Map a terminal reply envelope onto the caller-visible result.
fn reply_to_result(envelope: &Envelope) -> Result<Vec<u8>, RpcError> {
    let body = envelope.body_bytes()?;
    match envelope.kind {
        MessageKind::Success => Ok(body),
        MessageKind::Canceled => Err(RpcError::Canceled),
        MessageKind::Error => {
            let parsed: ErrorBody = codec::unpack(&body)?;
            Err(RpcError::Task {
                message: parsed.message,
            })
        }
        MessageKind::Exception => {
            let parsed: ExceptionBody = codec::unpack(&body)?;
            Err(RpcError::Exception {
                class: parsed.class,
                message: parsed.message,
                kind: parsed.kind,
                data: parsed.data,
            })
        }
        MessageKind::NoHandler => {
            let parsed: NoHandlerBody = codec::unpack(&body)?;
            Err(RpcError::NoHandler(parsed.message))
        }
        MessageKind::Request => Err(RpcError::Programming(
            "request kind observed as a reply".into(),
        )),
    }
}
