// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RPC methods this deployment serves on its own queue.
//!
//! Remote peers reach the bot through `tasks.vk_bot`: posting to the
//! community wall and feeding presence observations collected elsewhere.

use std::sync::Arc;

use ratel_config::model::BrokerConfig;
use ratel_core::platform::PlatformClient;
use ratel_presence::{Observation, PresenceKind, PresenceTracker};
use ratel_rpc::{HandlerError, RpcWorker};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
struct WallPostRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    attachments: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WallPostResponse {
    post_id: i64,
}

#[derive(Debug, Deserialize)]
struct PresenceObservationRequest {
    user_id: i64,
    kind: PresenceKind,
    #[serde(default)]
    name: Option<String>,
}

/// Build the worker consuming this deployment's service queue.
pub fn build_worker(
    manager: ConnectionManager,
    broker: &BrokerConfig,
    platform: Arc<dyn PlatformClient>,
    tracker: Arc<PresenceTracker>,
) -> RpcWorker {
    let mut worker = RpcWorker::new(manager, broker.service_queue.clone(), broker.prefetch);

    worker.register("vk_bot_post", move |_meta, req: WallPostRequest| {
        let platform = platform.clone();
        async move {
            let post_id = platform
                .wall_post(&req.message, &req.attachments)
                .await
                .map_err(|e| HandlerError::Error(e.to_string()))?;
            info!(post_id, "served wall post over rpc");
            Ok(Some(WallPostResponse { post_id }))
        }
    });

    worker.register(
        "observe_presence",
        move |_meta, req: PresenceObservationRequest| {
            let tracker = tracker.clone();
            async move {
                let obs = Observation {
                    user_id: req.user_id,
                    kind: req.kind,
                    name: req.name,
                };
                tracker
                    .observe(&obs)
                    .await
                    .map_err(|e| HandlerError::Error(e.to_string()))?;
                Ok(None::<serde_json::Value>)
            }
        },
    );

    worker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_post_request_defaults() {
        let req: WallPostRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_empty());
        assert!(req.attachments.is_empty());
    }

    #[test]
    fn presence_request_parses_kind() {
        let req: PresenceObservationRequest =
            serde_json::from_str(r#"{"user_id": 7, "kind": "activity", "name": "Dota 2"}"#)
                .unwrap();
        assert_eq!(req.user_id, 7);
        assert_eq!(req.kind, PresenceKind::Activity);
        assert_eq!(req.name.as_deref(), Some("Dota 2"));
    }
}
