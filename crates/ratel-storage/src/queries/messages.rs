// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message history operations.

use ratel_core::RatelError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::ChatMessageRow;

/// Insert a chat message. Returns the row id.
///
/// `from_chat` is derived from the peer id threshold on the caller side and
/// stored denormalized for querying.
pub async fn insert_message(db: &Database, row: &ChatMessageRow) -> Result<i64, RatelError> {
    let row = row.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO chat_messages
                 (from_id, peer_id, from_chat, from_bot, date, text, attachments, reply_message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.from_id,
                    row.peer_id,
                    row.from_chat,
                    row.from_bot,
                    row.date,
                    row.text,
                    row.attachments,
                    row.reply_message_id,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent messages for a peer, newest first.
pub async fn recent_for_peer(
    db: &Database,
    peer_id: i64,
    limit: i64,
) -> Result<Vec<ChatMessageRow>, RatelError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, from_id, peer_id, from_chat, from_bot, date, text, attachments,
                        reply_message_id
                 FROM chat_messages
                 WHERE peer_id = ?1
                 ORDER BY date DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![peer_id, limit], |row| {
                    Ok(ChatMessageRow {
                        id: row.get(0)?,
                        from_id: row.get(1)?,
                        peer_id: row.get(2)?,
                        from_chat: row.get(3)?,
                        from_bot: row.get(4)?,
                        date: row.get(5)?,
                        text: row.get(6)?,
                        attachments: row.get(7)?,
                        reply_message_id: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn message(peer_id: i64, text: &str) -> ChatMessageRow {
        ChatMessageRow {
            id: 0,
            from_id: 42,
            peer_id,
            from_chat: peer_id >= 2_000_000_000,
            from_bot: false,
            date: 1_700_000_000,
            text: text.to_string(),
            attachments: None,
            reply_message_id: None,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();

        let id = insert_message(&db, &message(2_000_000_001, "привет"))
            .await
            .unwrap();
        assert!(id > 0);

        let rows = recent_for_peer(&db, 2_000_000_001, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "привет");
        assert!(rows[0].from_chat);

        db.close().await.unwrap();
    }
}
