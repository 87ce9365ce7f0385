// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tracker: observation intake and the pull loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ratel_core::RatelError;
use ratel_storage::Database;
use ratel_storage::queries::presence::{self, SessionChange};
use ratel_storage::queries::dyn_config;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What kind of presence a session records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    /// What the user is doing, e.g. the game being played.
    Activity,
    /// Whether the user is online, idle, and so on.
    Status,
}

/// One observed presence fact. `name: None` means the user currently has no
/// activity or status of this kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub user_id: i64,
    pub kind: PresenceKind,
    pub name: Option<String>,
}

/// Source for periodic presence snapshots, one observation per tracked
/// user and kind.
#[async_trait]
pub trait PresenceFeed: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<Observation>, RatelError>;
}

/// Applies observations to storage, filtering excluded activity names.
pub struct PresenceTracker {
    db: Arc<Database>,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Apply one pushed observation.
    ///
    /// An activity name on the exclusion list is treated as no activity:
    /// it never opens a session and closes a tracked one the user left.
    pub async fn observe(&self, obs: &Observation) -> Result<SessionChange, RatelError> {
        let excluded = match obs.kind {
            PresenceKind::Activity => dyn_config::exclude_activities(&self.db).await?,
            PresenceKind::Status => Vec::new(),
        };
        self.apply(obs, &excluded).await
    }

    /// Apply a whole snapshot, loading the exclusion list once.
    pub async fn observe_snapshot(
        &self,
        snapshot: &[Observation],
    ) -> Result<Vec<SessionChange>, RatelError> {
        let excluded = dyn_config::exclude_activities(&self.db).await?;
        let mut changes = Vec::with_capacity(snapshot.len());
        for obs in snapshot {
            changes.push(self.apply(obs, &excluded).await?);
        }
        Ok(changes)
    }

    async fn apply(
        &self,
        obs: &Observation,
        excluded: &[String],
    ) -> Result<SessionChange, RatelError> {
        let name = match (&obs.name, obs.kind) {
            (Some(name), PresenceKind::Activity) if excluded.iter().any(|e| e == name) => None,
            (name, _) => name.as_deref(),
        };
        let change = presence::transition(&self.db, obs.user_id, &obs.kind.to_string(), name)
            .await?;
        if change != SessionChange::Same && change != SessionChange::Unchanged {
            debug!(user_id = obs.user_id, kind = %obs.kind, ?change, "presence transition");
        }
        Ok(change)
    }

    /// Poll `feed` every `interval` until cancelled. Snapshot failures are
    /// logged and the loop keeps going; the next interval retries.
    pub async fn run_pull_loop(
        &self,
        feed: Arc<dyn PresenceFeed>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match feed.snapshot().await {
                        Ok(snapshot) => {
                            if let Err(e) = self.observe_snapshot(&snapshot).await {
                                warn!(error = %e, "presence snapshot apply failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "presence snapshot fetch failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("presence pull loop stopped");
                    break;
                }
            }
        }
    }
}
