// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `serve` subcommand: wire every component and run until a signal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ratel_bot::BotService;
use ratel_bot::control::run_control_listener;
use ratel_bot::rpc_methods::{BotRpc, RpcGateway};
use ratel_config::RatelConfig;
use ratel_core::RatelError;
use ratel_core::platform::{MediaFetcher, ObjectStore, PlatformClient};
use ratel_presence::PresenceTracker;
use ratel_rpc::{RetryPolicy, RpcClient};
use ratel_storage::Database;
use ratel_vk::VkClient;
use ratel_vk::media::{LocalObjectStore, YtDlpFetcher};
use tracing::{info, warn};

use crate::{rpc_service, shutdown};

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("ratel={log_level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn wrap_redis(e: redis::RedisError) -> RatelError {
    RatelError::Rpc(e.to_string())
}

/// Run the full service until SIGINT/SIGTERM.
pub async fn run_serve(config: RatelConfig) -> Result<(), RatelError> {
    init_tracing(&config.service.log_level);
    info!(
        service = config.service.name.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "ratel starting"
    );

    let db = Arc::new(Database::open(&config.storage.database_path).await?);

    let redis_client = redis::Client::open(config.broker.url.as_str()).map_err(wrap_redis)?;
    let manager = redis::aio::ConnectionManager::new(redis_client.clone())
        .await
        .map_err(wrap_redis)?;

    let rpc_client = Arc::new(RpcClient::new(
        manager.clone(),
        config.broker.remote_queue.clone(),
    ));
    let mut policy =
        RetryPolicy::with_ignored(config.broker.ignore_exception_classes.iter().cloned());
    policy.attempts = config.broker.retry_attempts;
    policy.wait = Duration::from_secs(config.broker.retry_wait_secs);
    let rpc: Arc<dyn BotRpc> = Arc::new(RpcGateway::new(Arc::clone(&rpc_client), policy));

    let platform: Arc<dyn PlatformClient> = Arc::new(VkClient::new(&config.vk)?);
    let media: Arc<dyn MediaFetcher> = Arc::new(YtDlpFetcher::new(std::env::temp_dir()));
    let objects_root = Path::new(&config.storage.database_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("objects");
    let store: Option<Arc<dyn ObjectStore>> = Some(Arc::new(LocalObjectStore::new(objects_root)));

    let bot = Arc::new(BotService::new(
        Arc::clone(&db),
        Arc::clone(&platform),
        media,
        store,
        rpc,
        config.clone(),
    ));

    let tracker = Arc::new(PresenceTracker::new(Arc::clone(&db)));
    let worker = rpc_service::build_worker(
        manager,
        &config.broker,
        Arc::clone(&platform),
        tracker,
    );

    let cancel = shutdown::install_signal_handler();

    let control = tokio::spawn({
        let bot = Arc::clone(&bot);
        let cancel = cancel.clone();
        let channel = config.broker.control_channel.clone();
        async move { run_control_listener(redis_client, &channel, bot, cancel).await }
    });
    let service_worker = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    bot.start().await?;

    cancel.cancelled().await;
    info!("ratel shutting down");

    bot.stop().await?;

    match control.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "control listener exited with error"),
        Err(e) => warn!(error = %e, "control listener task panicked"),
    }
    match service_worker.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "rpc worker exited with error"),
        Err(e) => warn!(error = %e, "rpc worker task panicked"),
    }

    if let Err(e) = rpc_client.close().await {
        warn!(error = %e, "rpc client close failed");
    }
    db.close().await?;
    info!("ratel stopped");
    Ok(())
}
