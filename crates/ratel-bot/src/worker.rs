// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The serial in-process task worker.
//!
//! One consumer loop executes tasks strictly one at a time, in submission
//! order. A failed task goes to the back of the queue until its retry
//! budget runs out; permanent failures and exhausted tasks get a terminal
//! record in storage.

use std::sync::Arc;

use ratel_core::RatelError;
use ratel_storage::Database;
use ratel_storage::queries::tasks;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::task::BotTask;

/// Handle for submitting tasks to the worker.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<BotTask>,
}

impl TaskQueue {
    pub fn submit(&self, task: BotTask) -> Result<(), RatelError> {
        debug!(uuid = task.uuid.as_str(), name = task.name.as_str(), "task queued");
        self.tx
            .send(task)
            .map_err(|_| RatelError::Internal("task worker is not running".into()))
    }
}

/// The consumer half. Created together with its [`TaskQueue`].
pub struct TaskWorker {
    rx: mpsc::UnboundedReceiver<BotTask>,
    requeue: mpsc::UnboundedSender<BotTask>,
    db: Arc<Database>,
    /// Retries after the initial attempt.
    max_retries: u32,
}

impl TaskWorker {
    pub fn new(db: Arc<Database>, max_retries: u32) -> (TaskQueue, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = TaskQueue { tx: tx.clone() };
        (
            queue,
            Self {
                rx,
                requeue: tx,
                db,
                max_retries,
            },
        )
    }

    /// Consume tasks until cancelled. Each task is awaited to completion
    /// before the next one starts.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(max_retries = self.max_retries, "task worker started");
        loop {
            let task = tokio::select! {
                task = self.rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            };
            self.process(task).await;
        }
        info!("task worker stopped");
    }

    async fn process(&self, mut task: BotTask) {
        match task.execute().await {
            Ok(()) => {
                debug!(uuid = task.uuid.as_str(), tries = task.tries, "task done");
                self.save(&task, true).await;
            }
            Err(e) => {
                if task.failed_permanently() {
                    error!(
                        uuid = task.uuid.as_str(),
                        name = task.name.as_str(),
                        error = %e,
                        "task failed permanently"
                    );
                    self.save(&task, false).await;
                } else if task.tries <= self.max_retries {
                    warn!(
                        uuid = task.uuid.as_str(),
                        tries = task.tries,
                        error = %e,
                        "task failed, requeued"
                    );
                    if self.requeue.send(task).is_err() {
                        warn!("task worker draining, retry dropped");
                    }
                } else {
                    error!(
                        uuid = task.uuid.as_str(),
                        name = task.name.as_str(),
                        tries = task.tries,
                        error = %e,
                        "task retry budget exhausted"
                    );
                    self.save(&task, false).await;
                }
            }
        }
    }

    async fn save(&self, task: &BotTask, succeeded: bool) {
        if let Err(e) = tasks::insert(&self.db, &task.to_row(succeeded)).await {
            error!(uuid = task.uuid.as_str(), error = %e, "terminal task record not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn database() -> (Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("w.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        (db, dir)
    }

    fn counting_task(name: &str, fail_first: u32) -> (BotTask, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task = BotTask::new(
            name,
            json!({}),
            Arc::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n < fail_first {
                        Err(RatelError::platform("transient"))
                    } else {
                        Ok(())
                    }
                })
            }),
        );
        (task, calls)
    }

    async fn wait_for_record(db: &Database, uuid: &str) -> ratel_storage::models::BotTaskRow {
        for _ in 0..100 {
            if let Some(row) = tasks::get_by_uuid(db, uuid).await.unwrap() {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no terminal record for {uuid}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn succeeding_after_retries_within_budget() {
        let (db, _dir) = database().await;
        let (queue, worker) = TaskWorker::new(Arc::clone(&db), 3);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let (task, calls) = counting_task("retryable", 2);
        let uuid = task.uuid.clone();
        queue.submit(task).unwrap();

        let row = wait_for_record(&db, &uuid).await;
        assert_eq!(row.tries, 3);
        assert!(row.done_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn budget_exhaustion_gives_failed_record() {
        let (db, _dir) = database().await;
        let (queue, worker) = TaskWorker::new(Arc::clone(&db), 3);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        // Never succeeds: initial attempt plus three retries.
        let (task, calls) = counting_task("doomed", u32::MAX);
        let uuid = task.uuid.clone();
        queue.submit(task).unwrap();

        let row = wait_for_record(&db, &uuid).await;
        assert_eq!(row.tries, 4);
        assert!(row.done_at.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn access_denied_skips_remaining_retries() {
        let (db, _dir) = database().await;
        let (queue, worker) = TaskWorker::new(Arc::clone(&db), 3);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let task = BotTask::new(
            "denied",
            json!({}),
            Arc::new(|| Box::pin(async { Err(RatelError::platform("Access denied")) })),
        );
        let uuid = task.uuid.clone();
        queue.submit(task).unwrap();

        let row = wait_for_record(&db, &uuid).await;
        assert_eq!(row.tries, 1);
        assert!(row.done_at.is_none());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tasks_run_serially_in_order() {
        let (db, _dir) = database().await;
        let (queue, worker) = TaskWorker::new(Arc::clone(&db), 0);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let mut uuids = Vec::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            let task = BotTask::new(
                format!("step-{i}"),
                json!({}),
                Arc::new(move || {
                    let order = Arc::clone(&order);
                    Box::pin(async move {
                        // A slow first task must still finish before the rest.
                        if i == 0 {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        order.lock().await.push(i);
                        Ok(())
                    })
                }),
            );
            uuids.push(task.uuid.clone());
            queue.submit(task).unwrap();
        }

        wait_for_record(&db, &uuids[2]).await;
        assert_eq!(*order.lock().await, vec![0, 1, 2]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
