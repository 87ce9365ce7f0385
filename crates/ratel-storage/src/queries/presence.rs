// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence session operations.
//!
//! A session is a half-open interval per (user, kind): `finished_at IS NULL`
//! means the user is currently in that activity or status. The invariant of
//! at most one open session per (user, kind) is maintained by `transition`,
//! which runs close-and-open in a single transaction. The sweeper operations
//! repair the invariant when a crash or missed event left garbage behind.

use ratel_core::RatelError;
use rusqlite::{Transaction, params};

use crate::database::{Database, map_tr_err, now_utc};
use crate::models::PresenceSessionRow;

/// Outcome of a presence observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// No open session existed and none was requested.
    Unchanged,
    /// Observed name equals the open session's name.
    Same,
    /// A session was opened with no previous one.
    Opened { name: String },
    /// The open session was closed and a new one opened.
    Switched { previous: String, name: String },
    /// The open session was closed and nothing replaced it.
    Closed { previous: String },
}

/// Reconcile the observed presence `name` against the stored open session
/// for `(user_id, kind)`. `None` means the user left the activity or status.
///
/// Close and open happen in one transaction so a crash cannot leave the pair
/// half applied.
pub async fn transition(
    db: &Database,
    user_id: i64,
    kind: &str,
    name: Option<&str>,
) -> Result<SessionChange, RatelError> {
    let kind = kind.to_string();
    let name = name.map(str::to_string);
    let now = now_utc();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let open = find_open_tx(&tx, user_id, &kind)?;
            let change = match (open, name) {
                (None, None) => SessionChange::Unchanged,
                (Some(open), Some(name)) if open.name == name => SessionChange::Same,
                (None, Some(name)) => {
                    open_tx(&tx, user_id, &kind, &name, &now)?;
                    SessionChange::Opened { name }
                }
                (Some(open), Some(name)) => {
                    close_tx(&tx, open.id, &now)?;
                    open_tx(&tx, user_id, &kind, &name, &now)?;
                    SessionChange::Switched {
                        previous: open.name,
                        name,
                    }
                }
                (Some(open), None) => {
                    close_tx(&tx, open.id, &now)?;
                    SessionChange::Closed {
                        previous: open.name,
                    }
                }
            };
            tx.commit()?;
            Ok(change)
        })
        .await
        .map_err(map_tr_err)
}

/// The open session for `(user_id, kind)`, newest first if the invariant is
/// violated.
pub async fn find_open(
    db: &Database,
    user_id: i64,
    kind: &str,
) -> Result<Option<PresenceSessionRow>, RatelError> {
    let kind = kind.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row = find_open_tx(&tx, user_id, &kind)?;
            tx.commit()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete open sessions of `kind` that started more than `hours` ago.
/// Returns the number of rows removed.
///
/// A session that stayed open that long was orphaned by a missed close
/// event, so its duration is meaningless and the row is dropped rather than
/// closed.
pub async fn delete_orphans_older_than(
    db: &Database,
    kind: &str,
    hours: i64,
) -> Result<usize, RatelError> {
    let kind = kind.to_string();
    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(hours))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM presence_sessions
                 WHERE kind = ?1 AND finished_at IS NULL AND started_at < ?2",
                params![kind, cutoff],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

/// Repair (user, kind) pairs that hold more than one open session: the
/// newest survives, the rest are deleted. Returns the number of rows removed.
pub async fn dedupe_open(db: &Database, kind: &str) -> Result<usize, RatelError> {
    let kind = kind.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM presence_sessions
                 WHERE kind = ?1 AND finished_at IS NULL
                   AND id NOT IN (
                       SELECT MAX(id) FROM presence_sessions
                       WHERE kind = ?1 AND finished_at IS NULL
                       GROUP BY user_id
                   )",
                params![kind],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

fn find_open_tx(
    tx: &Transaction<'_>,
    user_id: i64,
    kind: &str,
) -> Result<Option<PresenceSessionRow>, rusqlite::Error> {
    let mut stmt = tx.prepare(
        "SELECT id, user_id, kind, name, started_at, finished_at
         FROM presence_sessions
         WHERE user_id = ?1 AND kind = ?2 AND finished_at IS NULL
         ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![user_id, kind], |row| {
        Ok(PresenceSessionRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            name: row.get(3)?,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
        })
    })?;
    rows.next().transpose()
}

fn open_tx(
    tx: &Transaction<'_>,
    user_id: i64,
    kind: &str,
    name: &str,
    now: &str,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO presence_sessions (user_id, kind, name, started_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, kind, name, now],
    )?;
    Ok(())
}

fn close_tx(tx: &Transaction<'_>, id: i64, now: &str) -> Result<(), rusqlite::Error> {
    tx.execute(
        "UPDATE presence_sessions SET finished_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("pr.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn open_same_switch_close_lifecycle() {
        let (db, _dir) = setup().await;

        let change = transition(&db, 7, "activity", Some("Dota 2")).await.unwrap();
        assert_eq!(
            change,
            SessionChange::Opened {
                name: "Dota 2".into()
            }
        );

        // Repeated observation of the same name is a no-op.
        let change = transition(&db, 7, "activity", Some("Dota 2")).await.unwrap();
        assert_eq!(change, SessionChange::Same);

        let change = transition(&db, 7, "activity", Some("Factorio"))
            .await
            .unwrap();
        assert_eq!(
            change,
            SessionChange::Switched {
                previous: "Dota 2".into(),
                name: "Factorio".into()
            }
        );

        let change = transition(&db, 7, "activity", None).await.unwrap();
        assert_eq!(
            change,
            SessionChange::Closed {
                previous: "Factorio".into()
            }
        );
        assert!(find_open(&db, 7, "activity").await.unwrap().is_none());

        // Absent user with no observation stays absent.
        let change = transition(&db, 7, "activity", None).await.unwrap();
        assert_eq!(change, SessionChange::Unchanged);
    }

    #[tokio::test]
    async fn kinds_are_independent() {
        let (db, _dir) = setup().await;
        transition(&db, 7, "activity", Some("Dota 2")).await.unwrap();
        transition(&db, 7, "status", Some("online")).await.unwrap();

        transition(&db, 7, "activity", None).await.unwrap();
        assert!(find_open(&db, 7, "activity").await.unwrap().is_none());
        assert!(find_open(&db, 7, "status").await.unwrap().is_some());
    }

    async fn insert_open_at(db: &Database, user_id: i64, kind: &str, started_at: &str) {
        let kind = kind.to_string();
        let started_at = started_at.to_string();
        db.connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO presence_sessions (user_id, kind, name, started_at)
                     VALUES (?1, ?2, 'stale', ?3)",
                    params![user_id, kind, started_at],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn orphan_sweep_removes_only_stale_open_rows() {
        let (db, _dir) = setup().await;

        insert_open_at(&db, 1, "activity", "2020-01-01T00:00:00.000Z").await;
        transition(&db, 2, "activity", Some("fresh")).await.unwrap();

        let removed = delete_orphans_older_than(&db, "activity", 48).await.unwrap();
        assert_eq!(removed, 1);
        assert!(find_open(&db, 1, "activity").await.unwrap().is_none());
        assert!(find_open(&db, 2, "activity").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dedupe_keeps_newest_open_row() {
        let (db, _dir) = setup().await;

        insert_open_at(&db, 9, "status", "2020-01-01T00:00:00.000Z").await;
        insert_open_at(&db, 9, "status", "2020-01-02T00:00:00.000Z").await;
        insert_open_at(&db, 9, "status", "2020-01-03T00:00:00.000Z").await;
        insert_open_at(&db, 10, "status", "2020-01-01T00:00:00.000Z").await;

        let removed = dedupe_open(&db, "status").await.unwrap();
        assert_eq!(removed, 2);

        let survivor = find_open(&db, 9, "status").await.unwrap().unwrap();
        assert_eq!(survivor.started_at, "2020-01-03T00:00:00.000Z");
        assert!(find_open(&db, 10, "status").await.unwrap().is_some());
    }
}
