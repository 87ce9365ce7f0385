// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RPC worker: one durable service queue, dispatch by method name.
//!
//! Handlers are registered at startup by `(method, callable, payload type)`.
//! Every incoming request observes exactly one reply: `success`, `error`,
//! `exception`, `canceled`, or `no_handler`. A per-message guard enforces the
//! at-most-one-reply rule even when cancellation races completion. The worker
//! maintains a TTL'd consumer-presence key so clients can detect an
//! unroutable queue.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::Future;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::envelope::{Envelope, ErrorBody, ExceptionBody, MessageKind, NoHandlerBody};
use crate::error::RpcError;
use crate::presence_key_name;

/// Seconds the consumer-presence key stays alive between heartbeats.
const PRESENCE_TTL_SECS: u64 = 5;

/// How a handler reports failure. Anything else it returns is a success.
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// A logical error, delivered to the caller as an `error` reply.
    Error(String),
    /// An exception, delivered as an `exception` reply with its class string.
    Exception {
        class: String,
        message: String,
        data: Option<serde_json::Value>,
    },
}

impl HandlerError {
    /// Shorthand for an exception without extra data.
    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exception {
            class: class.into(),
            message: message.into(),
            data: None,
        }
    }
}

/// Request metadata exposed to handlers alongside the typed payload.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub correlation_id: String,
    pub method: String,
    pub priority: u8,
}

type BoxedHandlerFuture =
    Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, HandlerError>> + Send>>;
type HandlerFn = Arc<dyn Fn(RequestMeta, Vec<u8>) -> BoxedHandlerFuture + Send + Sync>;

/// An RPC worker bound to one service queue.
pub struct RpcWorker {
    manager: ConnectionManager,
    queue: String,
    prefetch: u16,
    handlers: HashMap<String, HandlerFn>,
}

impl RpcWorker {
    pub fn new(manager: ConnectionManager, queue: impl Into<String>, prefetch: u16) -> Self {
        Self {
            manager,
            queue: queue.into(),
            prefetch: prefetch.max(1),
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler for a method.
    ///
    /// The payload type is fixed at registration; a request whose body cannot
    /// be unpacked into it yields an `exception` reply.
    pub fn register<Req, Resp, F, Fut>(&mut self, method: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(RequestMeta, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Resp>, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: HandlerFn = Arc::new(move |meta: RequestMeta, body: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: Req = codec::unpack(&body).map_err(|e| HandlerError::Exception {
                    class: "DeserializationError".into(),
                    message: e.to_string(),
                    data: None,
                })?;
                let response = handler(meta, payload).await?;
                match response {
                    Some(value) => {
                        let bytes =
                            codec::pack(Some(&value)).map_err(|e| HandlerError::Exception {
                                class: "SerializationError".into(),
                                message: e.to_string(),
                                data: None,
                            })?;
                        Ok(Some(bytes))
                    }
                    None => Ok(None),
                }
            }) as BoxedHandlerFuture
        });
        self.handlers.insert(method.to_string(), erased);
    }

    /// Registered method names, for startup logging.
    pub fn methods(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Consume the service queue until canceled.
    ///
    /// Concurrency is bounded by `prefetch` (default 1, which serializes
    /// handling). The presence key is refreshed on every loop turn and
    /// deleted on exit.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RpcError> {
        let presence_key = presence_key_name(&self.queue);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(usize::from(self.prefetch)));
        let mut manager = self.manager.clone();

        info!(
            queue = self.queue.as_str(),
            methods = ?self.methods(),
            "rpc worker consuming"
        );

        loop {
            let _: () = manager
                .set_ex(&presence_key, "1", PRESENCE_TTL_SECS)
                .await?;

            let popped: Option<(String, String)> = tokio::select! {
                _ = cancel.cancelled() => break,
                res = manager.blpop(&self.queue, 1.0) => res?,
            };
            let Some((_, payload)) = popped else {
                continue;
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| RpcError::Broker("worker semaphore closed".into()))?
                }
            };

            let manager = self.manager.clone();
            let handlers = self.handlers.clone();
            let child_cancel = cancel.child_token();
            tokio::spawn(async move {
                let _permit = permit;
                process_message(manager, &handlers, &payload, child_cancel).await;
            });
        }

        let _: () = manager.del(&presence_key).await?;
        info!(queue = self.queue.as_str(), "rpc worker stopped");
        Ok(())
    }
}

/// Handle one incoming frame end to end.
async fn process_message(
    manager: ConnectionManager,
    handlers: &HashMap<String, HandlerFn>,
    payload: &str,
    cancel: CancellationToken,
) {
    let envelope = match Envelope::from_wire(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "dropping malformed request frame");
            return;
        }
    };
    if envelope.kind != MessageKind::Request {
        warn!(kind = %envelope.kind, "dropping non-request frame on service queue");
        return;
    }

    let guard = ReplyGuard::new(manager, envelope.clone());

    let Some(method) = envelope.method.clone() else {
        guard
            .send_no_handler("message carries no method header")
            .await;
        return;
    };
    let Some(handler) = handlers.get(&method) else {
        guard
            .send_no_handler(&format!("no handler registered for method '{method}'"))
            .await;
        return;
    };

    let body = match envelope.body_bytes() {
        Ok(body) => body,
        Err(e) => {
            guard
                .send_exception("DeserializationError", &e.to_string(), None)
                .await;
            return;
        }
    };

    let meta = RequestMeta {
        correlation_id: envelope.correlation_id.clone(),
        method: method.clone(),
        priority: envelope.priority,
    };

    debug!(
        method = method.as_str(),
        correlation_id = meta.correlation_id.as_str(),
        "handling rpc request"
    );

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            guard.send_canceled().await;
            return;
        }
        outcome = handler(meta, body) => outcome,
    };

    match outcome {
        Ok(Some(bytes)) => guard.send_success(&bytes).await,
        Ok(None) => guard.send_success(&[]).await,
        Err(HandlerError::Error(message)) => guard.send_error(&message).await,
        Err(HandlerError::Exception {
            class,
            message,
            data,
        }) => guard.send_exception(&class, &message, data).await,
    }
}

/// At-most-one-reply guard for a single incoming request.
///
/// Reply publishing is non-mandatory: a reply queue that vanished while the
/// handler ran is logged and forgotten.
struct ReplyGuard {
    manager: ConnectionManager,
    envelope: Envelope,
    sent: AtomicBool,
}

impl ReplyGuard {
    fn new(manager: ConnectionManager, envelope: Envelope) -> Self {
        Self {
            manager,
            envelope,
            sent: AtomicBool::new(false),
        }
    }

    async fn send(&self, kind: MessageKind, body: &[u8]) {
        if self.sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(reply_to) = self.envelope.reply_to.clone() else {
            debug!(
                correlation_id = self.envelope.correlation_id.as_str(),
                "request carries no reply queue, dropping reply"
            );
            return;
        };
        let reply = self.envelope.reply(kind, body);
        let wire = match reply.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                error!(error = %e, "failed to serialize reply");
                return;
            }
        };
        let mut manager = self.manager.clone();
        let published: Result<(), redis::RedisError> = manager.rpush(&reply_to, wire).await;
        if let Err(e) = published {
            warn!(error = %e, reply_to = reply_to.as_str(), "failed to publish reply");
        }
    }

    async fn send_success(&self, body: &[u8]) {
        self.send(MessageKind::Success, body).await;
    }

    async fn send_canceled(&self) {
        self.send(MessageKind::Canceled, &[]).await;
    }

    async fn send_error(&self, message: &str) {
        let body = serde_json::to_vec(&ErrorBody {
            message: message.to_string(),
        })
        .unwrap_or_default();
        self.send(MessageKind::Error, &body).await;
    }

    async fn send_exception(&self, class: &str, message: &str, data: Option<serde_json::Value>) {
        let body = serde_json::to_vec(&ExceptionBody {
            class: class.to_string(),
            message: message.to_string(),
            kind: "unknown".to_string(),
            data,
        })
        .unwrap_or_default();
        self.send(MessageKind::Exception, &body).await;
    }

    async fn send_no_handler(&self, message: &str) {
        let body = serde_json::to_vec(&NoHandlerBody {
            message: message.to_string(),
        })
        .unwrap_or_default();
        self.send(MessageKind::NoHandler, &body).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_exception_shorthand() {
        let e = HandlerError::exception("Captcha", "captcha needed");
        match e {
            HandlerError::Exception { class, data, .. } => {
                assert_eq!(class, "Captcha");
                assert!(data.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn typed_registration_unpacks_and_packs() {
        use serde::Deserialize;

        #[derive(Deserialize)]
        struct Req {
            n: i64,
        }
        #[derive(Serialize)]
        struct Resp {
            doubled: i64,
        }

        // Exercise the erased wrapper without a broker: build it the way
        // register() does and call it directly.
        let handler = |_meta: RequestMeta, req: Req| async move {
            Ok::<_, HandlerError>(Some(Resp { doubled: req.n * 2 }))
        };
        let handler = Arc::new(handler);
        let erased: HandlerFn = Arc::new(move |meta, body: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: Req = codec::unpack(&body).map_err(|e| HandlerError::Exception {
                    class: "DeserializationError".into(),
                    message: e.to_string(),
                    data: None,
                })?;
                let response = handler(meta, payload).await?;
                match response {
                    Some(value) => Ok(Some(codec::pack(Some(&value)).unwrap())),
                    None => Ok(None),
                }
            }) as BoxedHandlerFuture
        });

        let meta = RequestMeta {
            correlation_id: "c1".into(),
            method: "double".into(),
            priority: 0,
        };
        let out = erased(meta.clone(), b"{\"n\":21}".to_vec()).await.unwrap();
        assert_eq!(out.unwrap(), b"{\"doubled\":42}");

        let err = erased(meta, b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Exception { class, .. } if class == "DeserializationError"
        ));
    }

    #[test]
    fn prefetch_floor_is_one() {
        // A zero prefetch would deadlock the semaphore; the constructor
        // clamps it.
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        // ConnectionManager needs a live server; only check the clamp logic
        // through a standalone computation here.
        let _ = client;
        assert_eq!(0u16.max(1), 1);
    }
}
