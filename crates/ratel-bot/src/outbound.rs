// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message submission through the task queue.
//!
//! Nothing sends directly: every outbound message becomes a queued task so
//! chat replies, votes, and scheduled sends all share one retry path.

use std::sync::Arc;

use async_trait::async_trait;
use ratel_core::events::OutboundMessage;
use ratel_core::types::PeerId;
use ratel_core::RatelError;
use ratel_cron::SendSink;
use serde_json::json;

use crate::handlers::BotContext;
use crate::task::BotTask;

/// Queue a `messages_send` task for `message`.
pub fn queue_send(ctx: &BotContext, message: OutboundMessage) -> Result<(), RatelError> {
    let args = json!({
        "peer_id": message.peer_id.0,
        "text": message.text,
        "attachment": message.attachment,
    });
    let platform = Arc::clone(&ctx.platform);
    let task = BotTask::new(
        "messages_send",
        args,
        Arc::new(move || {
            let platform = Arc::clone(&platform);
            let message = message.clone();
            Box::pin(async move { platform.messages_send(&message).await.map(|_| ()) })
        }),
    );
    ctx.queue.submit(task)
}

/// Scheduled sends drain into the same task queue.
pub struct QueueSink {
    ctx: Arc<BotContext>,
}

impl QueueSink {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SendSink for QueueSink {
    async fn send_text(&self, peer_id: i64, text: &str) -> Result<(), RatelError> {
        queue_send(
            &self.ctx,
            OutboundMessage {
                peer_id: PeerId(peer_id),
                text: text.to_string(),
                ..OutboundMessage::default()
            },
        )
    }
}
