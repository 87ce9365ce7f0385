// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat command registry.
//!
//! A command is the first word after the prefix; the rest of the line is
//! its argument string. Unknown commands stay silent so ordinary messages
//! starting with the prefix character do not spam the chat.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ratel_core::events::{OutboundMessage, VkMessage};
use ratel_core::RatelError;
use ratel_storage::queries::{dyn_config, triggers};
use serde_json::json;
use tracing::{debug, warn};

use crate::handlers::BotContext;
use crate::outbound::queue_send;

/// One chat command. Returns the reply text, if any.
#[async_trait]
pub trait Command: Send + Sync {
    async fn run(
        &self,
        ctx: &BotContext,
        msg: &VkMessage,
        args: &str,
    ) -> Result<Option<String>, RatelError>;
}

pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registry with the built-in command set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping", Arc::new(Ping));
        registry.register("trigger", Arc::new(AddTrigger));
        registry.register("exclude", Arc::new(ExcludeActivity));
        registry
    }

    pub fn register(&mut self, name: &str, command: Arc<dyn Command>) {
        self.commands.insert(name.to_string(), command);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Parse and run the command carried by `msg`. Replies go through the task
/// queue; failures are logged here and never bubble to the listener.
pub async fn dispatch(ctx: &BotContext, msg: &VkMessage) {
    let line = msg.text.trim();
    let Some(rest) = line.strip_prefix(&ctx.bot.command_prefix) else {
        return;
    };
    let mut parts = rest.splitn(2, char::is_whitespace);
    let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
        return;
    };
    let args = parts.next().unwrap_or("").trim();

    let Some(command) = ctx.commands.get(name) else {
        debug!(command = name, "unknown command ignored");
        return;
    };

    match command.run(ctx, msg, args).await {
        Ok(Some(reply)) => {
            if let Err(e) = queue_send(
                ctx,
                OutboundMessage {
                    peer_id: msg.peer_id,
                    text: reply,
                    ..OutboundMessage::default()
                },
            ) {
                warn!(command = name, error = %e, "command reply not queued");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(command = name, error = %e, "command failed"),
    }
}

/// Liveness check.
struct Ping;

#[async_trait]
impl Command for Ping {
    async fn run(
        &self,
        _ctx: &BotContext,
        _msg: &VkMessage,
        _args: &str,
    ) -> Result<Option<String>, RatelError> {
        Ok(Some("pong".to_string()))
    }
}

/// `!trigger <phrase> | <answer>` adds a trigger with its canned answer.
struct AddTrigger;

#[async_trait]
impl Command for AddTrigger {
    async fn run(
        &self,
        ctx: &BotContext,
        _msg: &VkMessage,
        args: &str,
    ) -> Result<Option<String>, RatelError> {
        let Some((phrase, answer)) = args.split_once('|') else {
            return Ok(Some("usage: trigger <phrase> | <answer>".to_string()));
        };
        let phrase = phrase.trim();
        let answer = answer.trim();
        if phrase.is_empty() || answer.is_empty() {
            return Ok(Some("usage: trigger <phrase> | <answer>".to_string()));
        }
        triggers::insert_trigger(&ctx.db, phrase, Some(answer), None, true).await?;
        Ok(Some(format!("trigger \"{}\" added", phrase.to_lowercase())))
    }
}

/// `!exclude <activity>` hides an activity from the presence tracker.
struct ExcludeActivity;

#[async_trait]
impl Command for ExcludeActivity {
    async fn run(
        &self,
        ctx: &BotContext,
        _msg: &VkMessage,
        args: &str,
    ) -> Result<Option<String>, RatelError> {
        if args.is_empty() {
            return Ok(Some("usage: exclude <activity name>".to_string()));
        }
        let mut excluded = dyn_config::exclude_activities(&ctx.db).await?;
        if !excluded.iter().any(|e| e == args) {
            excluded.push(args.to_string());
            dyn_config::set_key(&ctx.db, dyn_config::KEY_EXCLUDE_ACTIVITIES, json!(excluded))
                .await?;
        }
        Ok(Some(format!("activity \"{args}\" excluded")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = CommandRegistry::with_builtins();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["exclude", "ping", "trigger"]);
    }
}
