// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger/answer operations and trigger history.
//!
//! The match predicate is "message text contains the trigger phrase",
//! case-insensitive: the stored trigger is the needle, the incoming text is
//! the haystack. Triggers are case-folded on write.

use ratel_core::RatelError;
use rusqlite::params;

use crate::database::{Database, map_tr_err, now_utc};
use crate::models::{TriggerCandidate, TriggerRow};

/// Insert a trigger phrase. The phrase is lower-cased before storage.
pub async fn insert_trigger(
    db: &Database,
    trigger: &str,
    answer: Option<&str>,
    attachment: Option<&str>,
    enabled: bool,
) -> Result<i64, RatelError> {
    let trigger = trigger.to_lowercase();
    let answer = answer.map(str::to_string);
    let attachment = attachment.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO triggers (\"trigger\", answer, attachment, enabled)
                 VALUES (?1, ?2, ?3, ?4)",
                params![trigger, answer, attachment, enabled],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All enabled trigger candidates whose phrase occurs in `haystack`.
///
/// The haystack is the concatenation of message text, image tags, and image
/// descriptions; the caller flattens those before lookup.
pub async fn find_matching(
    db: &Database,
    haystack: &str,
) -> Result<Vec<TriggerCandidate>, RatelError> {
    let haystack = haystack.to_lowercase();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, \"trigger\", answer, attachment
                 FROM triggers
                 WHERE enabled = 1 AND instr(?1, \"trigger\") > 0
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![haystack], |row| {
                    Ok(TriggerCandidate {
                        id: row.get(0)?,
                        trigger: row.get(1)?,
                        answer: row.get(2)?,
                        attachment: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one trigger by id.
pub async fn get_trigger(db: &Database, id: i64) -> Result<Option<TriggerRow>, RatelError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, \"trigger\", answer, attachment, enabled FROM triggers WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], |row| {
                Ok(TriggerRow {
                    id: row.get(0)?,
                    trigger: row.get(1)?,
                    answer: row.get(2)?,
                    attachment: row.get(3)?,
                    enabled: row.get(4)?,
                })
            })?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Append a trigger-history row: which answer fired, for whom, on what message.
pub async fn insert_history(
    db: &Database,
    trigger_id: i64,
    author_id: i64,
    message_snapshot: &str,
) -> Result<i64, RatelError> {
    let message = message_snapshot.to_string();
    let created_at = now_utc();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO trigger_history (trigger_id, author_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![trigger_id, author_id, message, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Count history rows referencing a trigger (test and ops support).
pub async fn history_count(db: &Database, trigger_id: i64) -> Result<i64, RatelError> {
    db.connection()
        .call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM trigger_history WHERE trigger_id = ?1",
                params![trigger_id],
                |row| row.get(0),
            )?;
            Ok(count)
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
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn triggers_are_case_folded_on_write() {
        let (db, _dir) = setup().await;
        let id = insert_trigger(&db, "Hi There", Some("hello"), None, true)
            .await
            .unwrap();
        let row = get_trigger(&db, id).await.unwrap().unwrap();
        assert_eq!(row.trigger, "hi there");
    }

    #[tokio::test]
    async fn text_contains_trigger_direction() {
        let (db, _dir) = setup().await;
        insert_trigger(&db, "hi", Some("hello"), None, true)
            .await
            .unwrap();

        // The trigger is the needle inside the message text.
        let matches = find_matching(&db, "hi there").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].answer.as_deref(), Some("hello"));

        // The reverse direction must not match.
        let matches = find_matching(&db, "h").await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (db, _dir) = setup().await;
        insert_trigger(&db, "ping", Some("pong"), None, true)
            .await
            .unwrap();
        let matches = find_matching(&db, "PING me").await.unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn disabled_triggers_never_match() {
        let (db, _dir) = setup().await;
        insert_trigger(&db, "off", Some("x"), None, false)
            .await
            .unwrap();
        let matches = find_matching(&db, "off topic").await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn duplicate_trigger_is_rejected() {
        let (db, _dir) = setup().await;
        insert_trigger(&db, "uniq", None, None, true).await.unwrap();
        let result = insert_trigger(&db, "UNIQ", None, None, true).await;
        assert!(result.is_err(), "case-folded duplicate must hit the unique constraint");
    }

    #[tokio::test]
    async fn history_is_append_only_per_invocation() {
        let (db, _dir) = setup().await;
        let id = insert_trigger(&db, "hey", Some("ho"), None, true)
            .await
            .unwrap();
        insert_history(&db, id, 42, "{\"text\":\"hey\"}").await.unwrap();
        insert_history(&db, id, 42, "{\"text\":\"hey\"}").await.unwrap();
        assert_eq!(history_count(&db, id).await.unwrap(), 2);
    }
}
