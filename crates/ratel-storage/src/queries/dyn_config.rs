// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime-mutable configuration stored as a single JSON document.
//!
//! Operator commands flip keys here without a process restart. The document
//! lives in one row; updates are read-modify-write inside a transaction.

use ratel_core::RatelError;
use serde_json::{Map, Value};

use crate::database::{Database, map_tr_err};

/// Known document keys.
pub const KEY_REACTIONS_MAP: &str = "reactions_map";
pub const KEY_EXCLUDE_ACTIVITIES: &str = "exclude_activities";
pub const KEY_BOT_ACTIVITY_NAME: &str = "bot_activity_name";

/// Load the whole document.
pub async fn get(db: &Database) -> Result<Value, RatelError> {
    db.connection()
        .call(|conn| {
            let raw: String =
                conn.query_row("SELECT data FROM dynamic_config WHERE id = 1", [], |row| {
                    row.get(0)
                })?;
            Ok(raw)
        })
        .await
        .map_err(map_tr_err)
        .and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| RatelError::Internal(format!("dynamic_config is not JSON: {e}")))
        })
}

/// Set one top-level key, preserving the rest of the document. The
/// read-modify-write runs in a single transaction.
pub async fn set_key(db: &Database, key: &str, value: Value) -> Result<(), RatelError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let raw: String =
                tx.query_row("SELECT data FROM dynamic_config WHERE id = 1", [], |row| {
                    row.get(0)
                })?;
            let mut doc: Map<String, Value> =
                serde_json::from_str(&raw).unwrap_or_else(|_| Map::new());
            doc.insert(key, value);
            let raw = Value::Object(doc).to_string();
            tx.execute("UPDATE dynamic_config SET data = ?1 WHERE id = 1", [raw])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The reaction map for voting polls: option label to verdict. Falls back to
/// the built-in pair when the key is absent.
pub async fn reactions_map(db: &Database) -> Result<Vec<(String, bool)>, RatelError> {
    let doc = get(db).await?;
    let mut out = Vec::new();
    if let Some(Value::Object(map)) = doc.get(KEY_REACTIONS_MAP) {
        for (label, verdict) in map {
            if let Value::Bool(v) = verdict {
                out.push((label.clone(), *v));
            }
        }
    }
    if out.is_empty() {
        out.push(("\u{1f480}".to_string(), true));
        out.push(("Нет (no)".to_string(), false));
    }
    // Positive option first, matching the platform poll layout.
    out.sort_by_key(|(_, verdict)| !*verdict);
    Ok(out)
}

/// Activity names the presence tracker must not record.
pub async fn exclude_activities(db: &Database) -> Result<Vec<String>, RatelError> {
    let doc = get(db).await?;
    let mut out = Vec::new();
    if let Some(Value::Array(items)) = doc.get(KEY_EXCLUDE_ACTIVITIES) {
        for item in items {
            if let Value::String(s) = item {
                out.push(s.clone());
            }
        }
    }
    Ok(out)
}

/// The activity name the bot itself advertises, if configured.
pub async fn bot_activity_name(db: &Database) -> Result<Option<String>, RatelError> {
    let doc = get(db).await?;
    Ok(doc
        .get(KEY_BOT_ACTIVITY_NAME)
        .and_then(Value::as_str)
        .map(str::to_string))
}
