// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process bot tasks.
//!
//! A task wraps a re-runnable closure plus its bookkeeping: uuid, attempt
//! count, the error of every failed attempt, and timestamps. Only the
//! terminal state is persisted; while the task is alive it exists solely in
//! the worker queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ratel_core::RatelError;
use ratel_storage::database::now_utc;
use ratel_storage::models::BotTaskRow;
use serde_json::Value;
use uuid::Uuid;

/// Failures whose message contains one of these fragments are permanent;
/// retrying cannot fix a revoked permission.
const PERMANENT_ERROR_FRAGMENTS: &[&str] = &["Access denied"];

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), RatelError>> + Send>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// A queued unit of work with its attempt history.
pub struct BotTask {
    pub uuid: String,
    pub name: String,
    /// JSON projection of the captured arguments, for the terminal record.
    pub args: Value,
    pub tries: u32,
    pub errors: Vec<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    run: TaskFn,
}

impl BotTask {
    pub fn new(name: impl Into<String>, args: Value, run: TaskFn) -> Self {
        Self {
            uuid: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            args,
            tries: 0,
            errors: Vec::new(),
            created_at: now_utc(),
            started_at: None,
            run,
        }
    }

    /// Run one attempt. Records the start timestamp on the first attempt
    /// and appends the error message on failure.
    pub async fn execute(&mut self) -> Result<(), RatelError> {
        if self.started_at.is_none() {
            self.started_at = Some(now_utc());
        }
        self.tries += 1;
        match (self.run)().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.errors.push(e.to_string());
                Err(e)
            }
        }
    }

    /// Whether the most recent failure is permanent and must not be
    /// retried.
    pub fn failed_permanently(&self) -> bool {
        self.errors
            .last()
            .is_some_and(|e| PERMANENT_ERROR_FRAGMENTS.iter().any(|f| e.contains(f)))
    }

    /// The terminal storage row. `done_at` is set only for a success.
    pub fn to_row(&self, succeeded: bool) -> BotTaskRow {
        BotTaskRow {
            id: 0,
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            args: self.args.to_string(),
            tries: self.tries,
            errors: serde_json::to_string(&self.errors).unwrap_or_else(|_| "[]".to_string()),
            created_at: self.created_at.clone(),
            started_at: self.started_at.clone(),
            done_at: succeeded.then(now_utc),
        }
    }
}

impl std::fmt::Debug for BotTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotTask")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("tries", &self.tries)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
