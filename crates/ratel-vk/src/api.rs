// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level method calls and response envelope handling.

use ratel_core::error::RatelError;
use ratel_core::platform::{PlatformPoll, PollOption};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::VkClient;

pub(crate) const API_BASE: &str = "https://api.vk.com/method";
pub(crate) const API_VERSION: &str = "5.199";

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: Option<Value>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    error_msg: String,
}

impl VkClient {
    /// Invoke one API method and unwrap the `response` envelope. API-level
    /// errors keep the upstream message verbatim, which the task layer
    /// matches for permanent failures such as "Access denied".
    pub(crate) async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Value, RatelError> {
        let url = format!("{}/{}", self.api_base, method);
        let mut form: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        form.push(("access_token", self.token.as_str()));
        form.push(("v", API_VERSION));

        let envelope: ApiEnvelope = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| wrap_http(method, e))?
            .json()
            .await
            .map_err(|e| wrap_http(method, e))?;

        if let Some(error) = envelope.error {
            return Err(RatelError::platform(format!(
                "{method}: {} (code {})",
                error.error_msg, error.error_code
            )));
        }
        let response = envelope
            .response
            .ok_or_else(|| RatelError::platform(format!("{method}: empty response envelope")))?;
        debug!(method, "api call ok");
        Ok(response)
    }
}

pub(crate) fn wrap_http(method: &str, e: reqwest::Error) -> RatelError {
    RatelError::Platform {
        message: format!("{method}: transport failure"),
        source: Some(Box::new(e)),
    }
}

/// Parse a poll object as returned by `polls.create` and `polls.getById`.
/// The latter wraps the object in a one-element array.
pub(crate) fn parse_poll(value: &Value) -> Result<PlatformPoll, RatelError> {
    let object = match value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| RatelError::platform("polls response was an empty array"))?,
        other => other,
    };
    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| RatelError::platform("poll object has no id"))?;
    let owner_id = object
        .get("owner_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| RatelError::platform("poll object has no owner_id"))?;
    let question = object
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let options = object
        .get("answers")
        .and_then(Value::as_array)
        .map(|answers| {
            answers
                .iter()
                .filter_map(|a| {
                    Some(PollOption {
                        id: a.get("id")?.as_i64()?,
                        text: a.get("text")?.as_str()?.to_string(),
                        votes: a.get("votes").and_then(Value::as_u64).unwrap_or(0) as u32,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(PlatformPoll {
        id,
        owner_id,
        question,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_poll_from_create_response() {
        let value = json!({
            "id": 7,
            "owner_id": -100,
            "question": "42",
            "answers": [
                {"id": 1, "text": "\u{1f480}", "votes": 2},
                {"id": 2, "text": "Нет (no)", "votes": 0}
            ]
        });
        let poll = parse_poll(&value).unwrap();
        assert_eq!(poll.id, 7);
        assert_eq!(poll.owner_id, -100);
        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[0].votes, 2);
    }

    #[test]
    fn parse_poll_unwraps_get_by_id_array() {
        let value = json!([{"id": 9, "owner_id": -1, "question": "q", "answers": []}]);
        let poll = parse_poll(&value).unwrap();
        assert_eq!(poll.id, 9);
        assert!(poll.options.is_empty());
    }

    #[test]
    fn parse_poll_rejects_garbage() {
        assert!(parse_poll(&json!({"nope": true})).is_err());
        assert!(parse_poll(&json!([])).is_err());
    }
}
