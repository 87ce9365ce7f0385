// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Poll mirror rows for the voting pipeline.
//!
//! The local row id is embedded into the platform poll question, so the
//! insert happens before the platform call and `get` resolves vote events
//! back to the subject key.

use ratel_core::RatelError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::PollRow;

/// Insert a poll mirror row for `key` on `service`. Returns the row id that
/// the caller embeds into the poll question.
pub async fn insert(db: &Database, key: &str, service: &str) -> Result<i64, RatelError> {
    let key = key.to_string();
    let service = service.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO polls (key, service, enabled) VALUES (?1, ?2, 1)",
                params![key, service],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one poll mirror row by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<PollRow>, RatelError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, key, service, enabled FROM polls WHERE id = ?1")?;
            let mut rows = stmt.query_map(params![id], |row| {
                Ok(PollRow {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    service: row.get(2)?,
                    enabled: row.get(3)?,
                })
            })?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// The newest enabled row for a subject key, if any.
pub async fn get_enabled_by_key(db: &Database, key: &str) -> Result<Option<PollRow>, RatelError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, key, service, enabled FROM polls
                 WHERE key = ?1 AND enabled = 1
                 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query_map(params![key], |row| {
                Ok(PollRow {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    service: row.get(2)?,
                    enabled: row.get(3)?,
                })
            })?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Disable a poll row. Returns true if this call flipped the flag, false if
/// the row was already disabled or does not exist. The caller acts on the
/// vote result only when this returns true, which makes replayed vote events
/// idempotent.
pub async fn disable(db: &Database, id: i64) -> Result<bool, RatelError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE polls SET enabled = 0 WHERE id = ?1 AND enabled = 1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("p.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn insert_get_roundtrip() {
        let (db, _dir) = setup().await;
        let id = insert(&db, "video-1_22", "vk").await.unwrap();
        let row = get(&db, id).await.unwrap().unwrap();
        assert_eq!(row.key, "video-1_22");
        assert_eq!(row.service, "vk");
        assert!(row.enabled);
    }

    #[tokio::test]
    async fn disable_flips_exactly_once() {
        let (db, _dir) = setup().await;
        let id = insert(&db, "video-1_22", "vk").await.unwrap();

        assert!(disable(&db, id).await.unwrap());
        // Replayed events see an already-disabled row.
        assert!(!disable(&db, id).await.unwrap());
        assert!(!disable(&db, id).await.unwrap());

        let row = get(&db, id).await.unwrap().unwrap();
        assert!(!row.enabled);
    }

    #[tokio::test]
    async fn disable_missing_row_is_false() {
        let (db, _dir) = setup().await;
        assert!(!disable(&db, 999).await.unwrap());
    }

    #[tokio::test]
    async fn enabled_by_key_picks_newest() {
        let (db, _dir) = setup().await;
        let a = insert(&db, "wall-1_5", "vk").await.unwrap();
        let b = insert(&db, "wall-1_5", "vk").await.unwrap();
        assert!(b > a);

        let row = get_enabled_by_key(&db, "wall-1_5").await.unwrap().unwrap();
        assert_eq!(row.id, b);

        disable(&db, b).await.unwrap();
        let row = get_enabled_by_key(&db, "wall-1_5").await.unwrap().unwrap();
        assert_eq!(row.id, a);
    }
}
