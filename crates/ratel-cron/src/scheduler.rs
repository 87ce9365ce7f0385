// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler: owns the spawned cron jobs and their cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use croner::Cron;
use ratel_core::RatelError;
use ratel_storage::Database;
use ratel_storage::queries::schedules;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sweep::sweep_presence;

/// Outbound delivery target for scheduled sends. The bot service implements
/// this over its in-process task queue so scheduled messages share the same
/// retry path as everything else.
#[async_trait]
pub trait SendSink: Send + Sync {
    async fn send_text(&self, peer_id: i64, text: &str) -> Result<(), RatelError>;
}

/// Producer for dynamic message bodies.
#[async_trait]
pub trait MessageFetch: Send + Sync {
    async fn fetch(&self) -> Result<String, RatelError>;
}

/// What a periodic send job delivers: a fixed message or one fetched at
/// fire time.
#[derive(Clone)]
pub enum MessageSource {
    Static(String),
    Fetch(Arc<dyn MessageFetch>),
}

impl MessageSource {
    async fn resolve(&self) -> Result<String, RatelError> {
        match self {
            MessageSource::Static(text) => Ok(text.clone()),
            MessageSource::Fetch(fetcher) => fetcher.fetch().await,
        }
    }
}

struct JobHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns all cron jobs of the service. Dropping the scheduler does not stop
/// the jobs; call [`Scheduler::shutdown`] or cancel the parent token.
pub struct Scheduler {
    db: Arc<Database>,
    sink: Arc<dyn SendSink>,
    error_pause: Duration,
    cancel: CancellationToken,
    send_jobs: Mutex<Vec<JobHandle>>,
    sweep_job: Mutex<Option<JobHandle>>,
}

impl Scheduler {
    /// `cancel` is the service-level token; every job runs under a child of
    /// it so a service stop tears down all jobs at once.
    pub fn new(
        db: Arc<Database>,
        sink: Arc<dyn SendSink>,
        error_pause: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            sink,
            error_pause,
            cancel,
            send_jobs: Mutex::new(Vec::new()),
            sweep_job: Mutex::new(None),
        }
    }

    /// Spawn one periodic send job. The cron pattern is validated here;
    /// a bad pattern surfaces instead of silently never firing.
    pub async fn add_send_job(
        &self,
        cron_expr: &str,
        peer_id: i64,
        source: MessageSource,
    ) -> Result<(), RatelError> {
        let cron = parse_cron(cron_expr)?;
        let job_cancel = self.cancel.child_token();
        let sink = Arc::clone(&self.sink);
        let error_pause = self.error_pause;
        let expr = cron_expr.to_string();
        let cancel = job_cancel.clone();

        let handle = tokio::spawn(async move {
            debug!(cron = expr.as_str(), peer_id, "send job armed");
            loop {
                if !wait_for_next(&cron, &cancel).await {
                    break;
                }
                let text = match source.resolve().await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(cron = expr.as_str(), error = %e, "message fetch failed");
                        if !pause(error_pause, &cancel).await {
                            break;
                        }
                        continue;
                    }
                };
                if let Err(e) = sink.send_text(peer_id, &text).await {
                    warn!(cron = expr.as_str(), peer_id, error = %e, "scheduled send failed");
                    if !pause(error_pause, &cancel).await {
                        break;
                    }
                }
            }
            debug!(cron = expr.as_str(), "send job stopped");
        });

        self.send_jobs.lock().await.push(JobHandle {
            cancel: job_cancel,
            handle,
        });
        Ok(())
    }

    /// Spawn the presence sweeper job. At most one runs at a time; calling
    /// this again replaces the previous job.
    pub async fn add_sweep_job(
        &self,
        cron_expr: &str,
        orphan_timeout_hours: i64,
    ) -> Result<(), RatelError> {
        let cron = parse_cron(cron_expr)?;
        let job_cancel = self.cancel.child_token();
        let db = Arc::clone(&self.db);
        let error_pause = self.error_pause;
        let cancel = job_cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                if !wait_for_next(&cron, &cancel).await {
                    break;
                }
                match sweep_presence(&db, orphan_timeout_hours).await {
                    Ok(outcome) => {
                        if outcome.removed_total() > 0 {
                            info!(
                                orphaned = outcome.orphaned_activities,
                                duplicate = outcome.duplicate_statuses,
                                "presence sweep removed rows"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "presence sweep failed");
                        if !pause(error_pause, &cancel).await {
                            break;
                        }
                    }
                }
            }
        });

        let mut slot = self.sweep_job.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }
        *slot = Some(JobHandle {
            cancel: job_cancel,
            handle,
        });
        Ok(())
    }

    /// Drop all send jobs and re-seed them from the enabled rows in
    /// storage. Returns the number of jobs armed. The sweep job is not
    /// touched.
    pub async fn reload_from_storage(&self) -> Result<usize, RatelError> {
        {
            let mut jobs = self.send_jobs.lock().await;
            for job in jobs.drain(..) {
                job.cancel.cancel();
                let _ = job.handle.await;
            }
        }

        let rows = schedules::list_enabled(&self.db).await?;
        let count = rows.len();
        for row in rows {
            self.add_send_job(&row.cron, row.peer_id, MessageSource::Static(row.message))
                .await?;
        }
        info!(count, "schedule reloaded from storage");
        Ok(count)
    }

    /// Number of currently armed send jobs.
    pub async fn send_job_count(&self) -> usize {
        self.send_jobs.lock().await.len()
    }

    /// Cancel every job and wait for the loops to exit.
    pub async fn shutdown(&self) {
        let mut jobs = self.send_jobs.lock().await;
        for job in jobs.drain(..) {
            job.cancel.cancel();
            let _ = job.handle.await;
        }
        if let Some(job) = self.sweep_job.lock().await.take() {
            job.cancel.cancel();
            let _ = job.handle.await;
        }
        debug!("scheduler shut down");
    }
}

/// Seconds are accepted as an optional sixth field so operational patterns
/// stay plain five-field cron.
fn parse_cron(expr: &str) -> Result<Cron, RatelError> {
    Cron::new(expr)
        .with_seconds_optional()
        .parse()
        .map_err(|e| RatelError::Config(format!("invalid cron pattern {expr:?}: {e}")))
}

/// Sleep until the next occurrence. Returns false when cancelled or when
/// the pattern has no future occurrence.
async fn wait_for_next(cron: &Cron, cancel: &CancellationToken) -> bool {
    let now = Utc::now();
    let next = match cron.find_next_occurrence(&now, false) {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "cron pattern has no next occurrence");
            return false;
        }
    };
    let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Cancellable error pause. Returns false when cancelled.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::Mutex as AsyncMutex;

    struct RecordingSink {
        sent: AsyncMutex<Vec<(i64, String)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: AsyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SendSink for RecordingSink {
        async fn send_text(&self, peer_id: i64, text: &str) -> Result<(), RatelError> {
            self.sent.lock().await.push((peer_id, text.to_string()));
            Ok(())
        }
    }

    async fn scheduler(sink: Arc<RecordingSink>) -> (Scheduler, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("cron.db").to_str().unwrap())
            .await
            .unwrap();
        let sched = Scheduler::new(
            Arc::new(db),
            sink,
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        (sched, dir)
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected_up_front() {
        let sink = RecordingSink::new();
        let (sched, _dir) = scheduler(sink).await;
        let result = sched
            .add_send_job("not a cron", 1, MessageSource::Static("x".into()))
            .await;
        assert!(matches!(result, Err(RatelError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_second_job_fires() {
        let sink = RecordingSink::new();
        let (sched, _dir) = scheduler(Arc::clone(&sink)).await;

        sched
            .add_send_job("* * * * * *", 77, MessageSource::Static("tick".into()))
            .await
            .unwrap();

        // The six-field pattern fires every second; give it a little slack.
        let mut fired = false;
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if !sink.sent.lock().await.is_empty() {
                fired = true;
                break;
            }
        }
        sched.shutdown().await;
        assert!(fired, "job never fired");
        let sent = sink.sent.lock().await;
        assert_eq!(sent[0], (77, "tick".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reload_reseeds_jobs_from_storage() {
        let sink = RecordingSink::new();
        let (sched, _dir) = scheduler(sink).await;

        sched
            .add_send_job("0 0 1 1 *", 1, MessageSource::Static("old".into()))
            .await
            .unwrap();
        assert_eq!(sched.send_job_count().await, 1);

        schedules::insert(&sched.db, "0 18 * * *", 2, "a", true)
            .await
            .unwrap();
        schedules::insert(&sched.db, "0 9 * * *", 3, "b", true)
            .await
            .unwrap();
        schedules::insert(&sched.db, "0 9 * * *", 4, "off", false)
            .await
            .unwrap();

        let count = sched.reload_from_storage().await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(sched.send_job_count().await, 2);

        sched.shutdown().await;
        assert_eq!(sched.send_job_count().await, 0);
    }
}
