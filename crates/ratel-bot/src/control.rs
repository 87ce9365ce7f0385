// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pub/sub control plane.
//!
//! Operators publish JSON envelopes `{"command": "...", "data": {...}?}` on
//! one well-known channel; every subscribed deployment applies them to its
//! own bot service. The listener runs outside the service lifecycle so a
//! stopped bot can still be started remotely.

use std::sync::Arc;

use futures::StreamExt;
use ratel_core::RatelError;
use serde::Deserialize;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::BotService;

/// Commands accepted on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    SendOnScheduleRestart,
}

/// The wire envelope. `data` is accepted and currently unused; commands
/// carry no parameters yet.
#[derive(Debug, Deserialize)]
pub struct ControlEnvelope {
    pub command: ControlCommand,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ControlEnvelope {
    /// Parse one channel payload. Subscribe-confirmation frames arrive as
    /// bare integers and are not commands; they map to `Ok(None)`.
    pub fn parse(payload: &str) -> Result<Option<Self>, serde_json::Error> {
        let trimmed = payload.trim();
        if trimmed.parse::<i64>().is_ok() {
            return Ok(None);
        }
        serde_json::from_str(trimmed).map(Some)
    }
}

/// Subscribe to `channel` and apply control commands until cancelled.
pub async fn run_control_listener(
    redis_client: redis::Client,
    channel: &str,
    bot: Arc<BotService>,
    cancel: CancellationToken,
) -> Result<(), RatelError> {
    let mut pubsub = redis_client
        .get_async_pubsub()
        .await
        .map_err(wrap_redis)?;
    pubsub.subscribe(channel).await.map_err(wrap_redis)?;
    info!(channel, "control listener subscribed");

    let mut stream = pubsub.on_message();
    loop {
        let message = tokio::select! {
            message = stream.next() => match message {
                Some(message) => message,
                None => {
                    warn!("control channel closed");
                    return Err(RatelError::Internal("control channel closed".into()));
                }
            },
            _ = cancel.cancelled() => {
                info!("control listener stopped");
                return Ok(());
            }
        };

        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "non-text control payload dropped");
                continue;
            }
        };
        match ControlEnvelope::parse(&payload) {
            Ok(Some(envelope)) => apply(&bot, envelope.command).await,
            Ok(None) => debug!("subscribe confirmation frame ignored"),
            Err(e) => warn!(payload = payload.as_str(), error = %e, "invalid control envelope"),
        }
    }
}

async fn apply(bot: &BotService, command: ControlCommand) {
    info!(command = %command, "control command received");
    let result = match command {
        ControlCommand::ServiceStart => bot.start().await,
        ControlCommand::ServiceStop => bot.stop().await,
        ControlCommand::ServiceRestart => bot.restart().await,
        ControlCommand::SendOnScheduleRestart => bot.reload_schedules().await.map(|_| ()),
    };
    if let Err(e) = result {
        warn!(command = %command, error = %e, "control command failed");
    }
}

fn wrap_redis(e: redis::RedisError) -> RatelError {
    RatelError::Internal(format!("control channel: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_all_commands() {
        for (payload, expected) in [
            (r#"{"command":"service_start"}"#, ControlCommand::ServiceStart),
            (r#"{"command":"service_stop"}"#, ControlCommand::ServiceStop),
            (
                r#"{"command":"service_restart"}"#,
                ControlCommand::ServiceRestart,
            ),
            (
                r#"{"command":"send_on_schedule_restart"}"#,
                ControlCommand::SendOnScheduleRestart,
            ),
        ] {
            let envelope = ControlEnvelope::parse(payload).unwrap().unwrap();
            assert_eq!(envelope.command, expected);
            assert!(envelope.data.is_none());
        }
    }

    #[test]
    fn envelope_carries_optional_data() {
        let envelope =
            ControlEnvelope::parse(r#"{"command":"service_start","data":{"reason":"deploy"}}"#)
                .unwrap()
                .unwrap();
        assert_eq!(envelope.command, ControlCommand::ServiceStart);
        assert_eq!(envelope.data.unwrap()["reason"], "deploy");
    }

    #[test]
    fn subscribe_confirmation_frame_is_not_a_command() {
        assert!(ControlEnvelope::parse("1").unwrap().is_none());
        assert!(ControlEnvelope::parse(" 2 ").unwrap().is_none());
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        assert!(ControlEnvelope::parse("service_start").is_err());
        assert!(ControlEnvelope::parse(r#"{"command":"reboot"}"#).is_err());
        assert!(ControlEnvelope::parse("{").is_err());
    }
}
