// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal bot-task records.
//!
//! Tasks live in memory while they run; only the final outcome is persisted,
//! once, when the task leaves the queue for good.

use ratel_core::RatelError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::BotTaskRow;

/// Persist the terminal state of a task. The uuid is unique, so a double
/// save of the same task is rejected by the schema.
pub async fn insert(db: &Database, row: &BotTaskRow) -> Result<i64, RatelError> {
    let row = row.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bot_tasks
                 (uuid, name, args, tries, errors, created_at, started_at, done_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.uuid,
                    row.name,
                    row.args,
                    row.tries,
                    row.errors,
                    row.created_at,
                    row.started_at,
                    row.done_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a task record by uuid.
pub async fn get_by_uuid(db: &Database, uuid: &str) -> Result<Option<BotTaskRow>, RatelError> {
    let uuid = uuid.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, name, args, tries, errors, created_at, started_at, done_at
                 FROM bot_tasks WHERE uuid = ?1",
            )?;
            let mut rows = stmt.query_map(params![uuid], |row| {
                Ok(BotTaskRow {
                    id: row.get(0)?,
                    uuid: row.get(1)?,
                    name: row.get(2)?,
                    args: row.get(3)?,
                    tries: row.get(4)?,
                    errors: row.get(5)?,
                    created_at: row.get(6)?,
                    started_at: row.get(7)?,
                    done_at: row.get(8)?,
                })
            })?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::now_utc;
    use tempfile::tempdir;

    fn row(uuid: &str) -> BotTaskRow {
        BotTaskRow {
            id: 0,
            uuid: uuid.to_string(),
            name: "messages_send".to_string(),
            args: "{\"peer_id\":200}".to_string(),
            tries: 2,
            errors: "[\"timeout\"]".to_string(),
            created_at: now_utc(),
            started_at: Some(now_utc()),
            done_at: Some(now_utc()),
        }
    }

    #[tokio::test]
    async fn terminal_record_roundtrip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        insert(&db, &row("a-1")).await.unwrap();
        let stored = get_by_uuid(&db, "a-1").await.unwrap().unwrap();
        assert_eq!(stored.name, "messages_send");
        assert_eq!(stored.tries, 2);
        assert_eq!(stored.errors, "[\"timeout\"]");
    }

    #[tokio::test]
    async fn duplicate_uuid_is_rejected() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("d.db").to_str().unwrap())
            .await
            .unwrap();

        insert(&db, &row("b-1")).await.unwrap();
        assert!(insert(&db, &row("b-1")).await.is_err());
    }
}
