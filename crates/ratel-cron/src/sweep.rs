// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence table repair.
//!
//! Two kinds of garbage accumulate when the process dies between presence
//! events: activity sessions that never closed, and duplicate open status
//! rows for the same user. One sweep pass fixes both.

use ratel_core::RatelError;
use ratel_storage::Database;
use ratel_storage::queries::presence;

/// What one sweep pass removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Open activity sessions older than the orphan timeout.
    pub orphaned_activities: usize,
    /// Duplicate open status rows; the newest per user survives.
    pub duplicate_statuses: usize,
}

impl SweepOutcome {
    pub fn removed_total(&self) -> usize {
        self.orphaned_activities + self.duplicate_statuses
    }
}

/// Run one sweep pass over the presence tables.
pub async fn sweep_presence(
    db: &Database,
    orphan_timeout_hours: i64,
) -> Result<SweepOutcome, RatelError> {
    let orphaned_activities =
        presence::delete_orphans_older_than(db, "activity", orphan_timeout_hours).await?;
    let duplicate_statuses = presence::dedupe_open(db, "status").await?;
    Ok(SweepOutcome {
        orphaned_activities,
        duplicate_statuses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratel_storage::queries::presence::transition;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sweep_on_clean_tables_removes_nothing() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("sw.db").to_str().unwrap())
            .await
            .unwrap();

        transition(&db, 1, "activity", Some("Dota 2")).await.unwrap();
        transition(&db, 1, "status", Some("online")).await.unwrap();

        let outcome = sweep_presence(&db, 48).await.unwrap();
        assert_eq!(outcome.removed_total(), 0);

        // The live sessions survive the sweep.
        assert!(presence::find_open(&db, 1, "activity").await.unwrap().is_some());
        assert!(presence::find_open(&db, 1, "status").await.unwrap().is_some());
    }
}
