// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot orchestrator for the Ratel backend.
//!
//! [`BotService`] owns one run of the bot: the long-poll listener, the
//! serial task worker, and the cron scheduler, all under one cancellation
//! token. The service moves through `stopped -> starting -> running ->
//! stopping -> stopped`; the control plane drives these transitions at
//! runtime over pub/sub.

pub mod commands;
pub mod control;
pub mod handlers;
pub mod outbound;
pub mod rpc_methods;
pub mod task;
pub mod voting;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use ratel_config::RatelConfig;
use ratel_core::platform::{MediaFetcher, ObjectStore, PlatformClient};
use ratel_core::RatelError;
use ratel_cron::Scheduler;
use ratel_storage::Database;
use strum::Display;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use commands::CommandRegistry;
use handlers::BotContext;
use outbound::QueueSink;
use rpc_methods::BotRpc;
use worker::TaskWorker;

/// Lifecycle states of the bot service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BotState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct BotRun {
    cancel: CancellationToken,
    listener: JoinHandle<()>,
    worker: JoinHandle<()>,
    scheduler: Arc<Scheduler>,
}

/// The orchestrator. One instance per process; start and stop cycle the
/// run, the instance itself lives for the whole process.
pub struct BotService {
    db: Arc<Database>,
    platform: Arc<dyn PlatformClient>,
    media: Arc<dyn MediaFetcher>,
    store: Option<Arc<dyn ObjectStore>>,
    rpc: Arc<dyn BotRpc>,
    config: RatelConfig,
    state: Mutex<BotState>,
    run: Mutex<Option<BotRun>>,
}

impl BotService {
    pub fn new(
        db: Arc<Database>,
        platform: Arc<dyn PlatformClient>,
        media: Arc<dyn MediaFetcher>,
        store: Option<Arc<dyn ObjectStore>>,
        rpc: Arc<dyn BotRpc>,
        config: RatelConfig,
    ) -> Self {
        Self {
            db,
            platform,
            media,
            store,
            rpc,
            config,
            state: Mutex::new(BotState::Stopped),
            run: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> BotState {
        *self.state.lock().await
    }

    /// Bring the service up. A start while not stopped is ignored with a
    /// warning; the control plane may deliver duplicates.
    pub async fn start(&self) -> Result<(), RatelError> {
        {
            let mut state = self.state.lock().await;
            if *state != BotState::Stopped {
                warn!(state = %state, "start ignored");
                return Ok(());
            }
            *state = BotState::Starting;
        }
        info!("bot service starting");

        let cancel = CancellationToken::new();
        let (queue, task_worker) =
            TaskWorker::new(Arc::clone(&self.db), self.config.bot.task_retries);
        let worker = tokio::spawn(task_worker.run(cancel.clone()));

        let ctx = Arc::new(BotContext {
            db: Arc::clone(&self.db),
            platform: Arc::clone(&self.platform),
            media: Arc::clone(&self.media),
            store: self.store.clone(),
            rpc: Arc::clone(&self.rpc),
            queue,
            commands: Arc::new(CommandRegistry::with_builtins()),
            vk: self.config.vk.clone(),
            bot: self.config.bot.clone(),
        });

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&self.db),
            Arc::new(QueueSink::new(Arc::clone(&ctx))),
            Duration::from_secs(self.config.scheduler.error_pause_secs),
            cancel.clone(),
        ));
        scheduler
            .add_sweep_job(
                &self.config.scheduler.sweeper_cron,
                i64::from(self.config.scheduler.orphan_timeout_hours),
            )
            .await?;
        scheduler.reload_from_storage().await?;

        let backoff = Duration::from_secs(self.config.bot.listener_backoff_secs);
        let listener = tokio::spawn(listener_loop(Arc::clone(&ctx), cancel.clone(), backoff));

        *self.run.lock().await = Some(BotRun {
            cancel,
            listener,
            worker,
            scheduler,
        });
        *self.state.lock().await = BotState::Running;
        info!("bot service running");
        Ok(())
    }

    /// Tear the run down and wait for the loops to exit. A stop while not
    /// running is ignored with a warning.
    pub async fn stop(&self) -> Result<(), RatelError> {
        {
            let mut state = self.state.lock().await;
            if *state != BotState::Running {
                warn!(state = %state, "stop ignored");
                return Ok(());
            }
            *state = BotState::Stopping;
        }
        info!("bot service stopping");

        if let Some(run) = self.run.lock().await.take() {
            run.scheduler.shutdown().await;
            run.cancel.cancel();
            let _ = run.listener.await;
            let _ = run.worker.await;
        }

        *self.state.lock().await = BotState::Stopped;
        info!("bot service stopped");
        Ok(())
    }

    /// Stop, wait the configured delay, start. Used by the control plane;
    /// the delay lets in-flight platform state settle before the new run.
    pub async fn restart(&self) -> Result<(), RatelError> {
        self.stop().await?;
        let delay = Duration::from_secs(self.config.bot.restart_delay_secs);
        info!(delay_secs = self.config.bot.restart_delay_secs, "restart delay");
        tokio::time::sleep(delay).await;
        self.start().await
    }

    /// Drop the active send jobs and re-seed them from storage. Returns the
    /// number of jobs seeded; a reload while stopped is a no-op because the
    /// next start reloads anyway.
    pub async fn reload_schedules(&self) -> Result<usize, RatelError> {
        let run = self.run.lock().await;
        match run.as_ref() {
            Some(run) => run.scheduler.reload_from_storage().await,
            None => {
                warn!("schedule reload ignored, service not running");
                Ok(0)
            }
        }
    }
}

/// The long-poll listener: check, dispatch the batch in order, repeat.
/// Transient failures reset the session and back off.
async fn listener_loop(ctx: Arc<BotContext>, cancel: CancellationToken, backoff: Duration) {
    info!("platform listener started");
    loop {
        let batch = tokio::select! {
            batch = ctx.platform.long_poll_check() => batch,
            _ = cancel.cancelled() => break,
        };
        match batch {
            Ok(events) => {
                for event in &events {
                    handlers::dispatch_event(&ctx, event).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "long poll failed, resetting session");
                if let Err(e) = ctx.platform.long_poll_reset().await {
                    warn!(error = %e, "long-poll reset failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
    info!("platform listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ratel_core::events::{OutboundMessage, PlatformEvent};
    use ratel_core::platform::{PlatformPoll, PollOption};
    use ratel_core::types::PeerId;
    use rpc_methods::ImageTagsResponse;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct IdlePlatform;

    #[async_trait]
    impl PlatformClient for IdlePlatform {
        async fn long_poll_check(&self) -> Result<Vec<PlatformEvent>, RatelError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Vec::new())
        }
        async fn long_poll_reset(&self) -> Result<(), RatelError> {
            Ok(())
        }
        async fn messages_send(&self, _message: &OutboundMessage) -> Result<i64, RatelError> {
            Ok(1)
        }
        async fn polls_create(
            &self,
            question: &str,
            options: &[String],
        ) -> Result<PlatformPoll, RatelError> {
            Ok(PlatformPoll {
                id: 1,
                owner_id: -1,
                question: question.to_string(),
                options: options
                    .iter()
                    .enumerate()
                    .map(|(i, text)| PollOption {
                        id: i as i64,
                        text: text.clone(),
                        votes: 0,
                    })
                    .collect(),
            })
        }
        async fn polls_get_by_id(
            &self,
            owner_id: i64,
            poll_id: i64,
        ) -> Result<PlatformPoll, RatelError> {
            Ok(PlatformPoll {
                id: poll_id,
                owner_id,
                question: String::new(),
                options: Vec::new(),
            })
        }
        async fn wall_post(
            &self,
            _message: &str,
            _attachments: &[String],
        ) -> Result<i64, RatelError> {
            Ok(1)
        }
        async fn upload_video_wall_and_post(&self, _path: &PathBuf) -> Result<(), RatelError> {
            Ok(())
        }
        async fn upload_photo_message(
            &self,
            _peer_id: PeerId,
            _path: &PathBuf,
        ) -> Result<String, RatelError> {
            Ok("photo1_1".to_string())
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaFetcher for NoMedia {
        async fn download_video(&self, _reference: &str) -> Result<PathBuf, RatelError> {
            Err(RatelError::platform("no media in tests"))
        }
        async fn download_bytes(&self, _url: &str) -> Result<Vec<u8>, RatelError> {
            Err(RatelError::platform("no media in tests"))
        }
    }

    struct NoRpc;

    #[async_trait]
    impl BotRpc for NoRpc {
        async fn get_image_tags(&self, _url: &str) -> Result<ImageTagsResponse, RatelError> {
            Ok(ImageTagsResponse::default())
        }
        async fn gpt_chat(&self, _user_id: i64, _message: &str) -> Result<String, RatelError> {
            Ok(String::new())
        }
        async fn speech_to_text(
            &self,
            _filename: &str,
            _base64: &str,
        ) -> Result<String, RatelError> {
            Ok(String::new())
        }
    }

    async fn service() -> (Arc<BotService>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("svc.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let mut config = RatelConfig::default();
        config.bot.restart_delay_secs = 0;
        let service = Arc::new(BotService::new(
            db,
            Arc::new(IdlePlatform),
            Arc::new(NoMedia),
            None,
            Arc::new(NoRpc),
            config,
        ));
        (service, dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_transitions() {
        let (service, _dir) = service().await;
        assert_eq!(service.state().await, BotState::Stopped);

        service.start().await.unwrap();
        assert_eq!(service.state().await, BotState::Running);

        // Duplicate start from the control plane is a no-op.
        service.start().await.unwrap();
        assert_eq!(service.state().await, BotState::Running);

        service.stop().await.unwrap();
        assert_eq!(service.state().await, BotState::Stopped);

        // Duplicate stop likewise.
        service.stop().await.unwrap();
        assert_eq!(service.state().await, BotState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_cycles_back_to_running() {
        let (service, _dir) = service().await;
        service.start().await.unwrap();
        service.restart().await.unwrap();
        assert_eq!(service.state().await, BotState::Running);
        service.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reload_schedules_reseeds_running_scheduler() {
        let (service, _dir) = service().await;

        // Nothing to reload while stopped.
        assert_eq!(service.reload_schedules().await.unwrap(), 0);

        service.start().await.unwrap();
        assert_eq!(service.reload_schedules().await.unwrap(), 0);

        ratel_storage::queries::schedules::insert(&service.db, "0 18 * * *", 200, "evening", true)
            .await
            .unwrap();
        ratel_storage::queries::schedules::insert(&service.db, "0 9 * * *", 200, "morning", true)
            .await
            .unwrap();
        ratel_storage::queries::schedules::insert(&service.db, "0 12 * * *", 200, "noon", false)
            .await
            .unwrap();

        assert_eq!(service.reload_schedules().await.unwrap(), 2);
        service.stop().await.unwrap();
    }

    #[test]
    fn states_display_snake_case() {
        assert_eq!(BotState::Stopped.to_string(), "stopped");
        assert_eq!(BotState::Starting.to_string(), "starting");
    }
}
