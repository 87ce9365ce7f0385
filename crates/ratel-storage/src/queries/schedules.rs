// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled-send records for the cron scheduler.

use ratel_core::RatelError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::ScheduledSendRow;

/// Insert a scheduled send. The cron expression is validated by the
/// scheduler when the job is seeded, not here.
pub async fn insert(
    db: &Database,
    cron: &str,
    peer_id: i64,
    message: &str,
    enabled: bool,
) -> Result<i64, RatelError> {
    let cron = cron.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_sends (cron, peer_id, message, enabled)
                 VALUES (?1, ?2, ?3, ?4)",
                params![cron, peer_id, message, enabled],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All enabled scheduled sends, in id order.
pub async fn list_enabled(db: &Database) -> Result<Vec<ScheduledSendRow>, RatelError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, cron, peer_id, message, enabled
                 FROM scheduled_sends
                 WHERE enabled = 1
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ScheduledSendRow {
                        id: row.get(0)?,
                        cron: row.get(1)?,
                        peer_id: row.get(2)?,
                        message: row.get(3)?,
                        enabled: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Enable or disable one scheduled send.
pub async fn set_enabled(db: &Database, id: i64, enabled: bool) -> Result<(), RatelError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE scheduled_sends SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn only_enabled_rows_are_listed() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("s.db").to_str().unwrap())
            .await
            .unwrap();

        let a = insert(&db, "0 18 * * *", 200, "evening", true).await.unwrap();
        insert(&db, "0 9 * * *", 200, "morning", false).await.unwrap();

        let rows = list_enabled(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, a);
        assert_eq!(rows[0].message, "evening");

        set_enabled(&db, a, false).await.unwrap();
        assert!(list_enabled(&db).await.unwrap().is_empty());

        db.close().await.unwrap();
    }
}
