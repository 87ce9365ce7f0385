// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Ratel bot backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Ratel configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RatelConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Message broker (Redis) settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// VK community settings.
    #[serde(default)]
    pub vk: VkConfig,

    /// Bot orchestrator settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Cron scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Presence tracker settings.
    #[serde(default)]
    pub presence: PresenceConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "ratel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Message broker configuration. Redis carries both the task queues and the
/// pub/sub control channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// The service queue this deployment's worker consumes.
    #[serde(default = "default_service_queue")]
    pub service_queue: String,

    /// The service queue outbound calls target (the ML worker pool).
    #[serde(default = "default_remote_queue")]
    pub remote_queue: String,

    /// Pub/sub channel carrying control-plane commands.
    #[serde(default = "default_control_channel")]
    pub control_channel: String,

    /// Number of in-flight messages a worker processes at once.
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,

    /// Retry attempts for the client-side retry wrapper.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Seconds to wait between retry attempts.
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,

    /// Remote exception classes that never consume a retry attempt.
    #[serde(default = "default_ignore_classes")]
    pub ignore_exception_classes: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            service_queue: default_service_queue(),
            remote_queue: default_remote_queue(),
            control_channel: default_control_channel(),
            prefetch: default_prefetch(),
            retry_attempts: default_retry_attempts(),
            retry_wait_secs: default_retry_wait_secs(),
            ignore_exception_classes: default_ignore_classes(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_service_queue() -> String {
    "tasks.vk_bot".to_string()
}

fn default_remote_queue() -> String {
    "tasks.ml".to_string()
}

fn default_control_channel() -> String {
    "vk_service_redis_queue".to_string()
}

fn default_prefetch() -> u16 {
    1
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_wait_secs() -> u64 {
    5
}

fn default_ignore_classes() -> Vec<String> {
    vec!["Captcha".to_string(), "TooManyRequests".to_string()]
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "ratel.db".to_string()
}

/// VK community configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VkConfig {
    /// Community access token. `None` disables the platform adapter.
    #[serde(default)]
    pub token: Option<String>,

    /// The community id (negative by platform convention).
    #[serde(default = "default_group_id")]
    pub group_id: i64,

    /// Mention alias of the community, e.g. `@club1`.
    #[serde(default)]
    pub group_alias: Option<String>,

    /// Peer id of the chat from which media is accepted for reposting.
    #[serde(default)]
    pub ingest_peer_id: i64,
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            token: None,
            group_id: default_group_id(),
            group_alias: None,
            ingest_peer_id: 0,
        }
    }
}

fn default_group_id() -> i64 {
    -1
}

/// Bot orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Retry budget for in-process tasks before permanent failure.
    #[serde(default = "default_task_retries")]
    pub task_retries: u32,

    /// Seconds the platform listener backs off after a transient failure.
    #[serde(default = "default_listener_backoff_secs")]
    pub listener_backoff_secs: u64,

    /// Seconds to wait between stop and start on a restart command.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,

    /// Command prefix for chat commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            task_retries: default_task_retries(),
            listener_backoff_secs: default_listener_backoff_secs(),
            restart_delay_secs: default_restart_delay_secs(),
            command_prefix: default_command_prefix(),
        }
    }
}

fn default_task_retries() -> u32 {
    3
}

fn default_listener_backoff_secs() -> u64 {
    30
}

fn default_restart_delay_secs() -> u64 {
    30
}

fn default_command_prefix() -> String {
    "!".to_string()
}

/// Cron scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Cron driving the orphan-activity sweeper.
    #[serde(default = "default_sweeper_cron")]
    pub sweeper_cron: String,

    /// Unfinished activity sessions older than this are orphans.
    #[serde(default = "default_orphan_timeout_hours")]
    pub orphan_timeout_hours: u32,

    /// Seconds a job sleeps after an application error before resuming.
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweeper_cron: default_sweeper_cron(),
            orphan_timeout_hours: default_orphan_timeout_hours(),
            error_pause_secs: default_error_pause_secs(),
        }
    }
}

fn default_sweeper_cron() -> String {
    "0 * * * *".to_string()
}

fn default_orphan_timeout_hours() -> u32 {
    48
}

fn default_error_pause_secs() -> u64 {
    300
}

/// Presence tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Seconds between pulls of the polling presence feed.
    #[serde(default = "default_pull_interval_secs")]
    pub pull_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            pull_interval_secs: default_pull_interval_secs(),
        }
    }
}

fn default_pull_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RatelConfig::default();
        assert_eq!(config.broker.control_channel, "vk_service_redis_queue");
        assert_eq!(config.broker.retry_attempts, 5);
        assert_eq!(config.broker.retry_wait_secs, 5);
        assert_eq!(config.bot.task_retries, 3);
        assert_eq!(config.scheduler.orphan_timeout_hours, 48);
        assert_eq!(config.scheduler.error_pause_secs, 300);
        assert_eq!(config.presence.pull_interval_secs, 60);
    }

    #[test]
    fn ignore_classes_default_contains_captcha() {
        let config = BrokerConfig::default();
        assert!(
            config
                .ignore_exception_classes
                .iter()
                .any(|c| c == "Captcha")
        );
    }
}
