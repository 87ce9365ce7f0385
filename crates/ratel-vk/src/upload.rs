// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-step upload flows: allocate an upload URL, post the file, confirm.

use std::path::{Path, PathBuf};

use ratel_core::error::RatelError;
use ratel_core::types::PeerId;
use reqwest::multipart;
use serde_json::Value;
use tracing::info;

use crate::VkClient;
use crate::api::wrap_http;

/// Upload a local video file and publish it on the community wall.
/// `video.save` with `wallpost` set publishes in the same step.
pub(crate) async fn video_to_wall(client: &VkClient, path: &PathBuf) -> Result<(), RatelError> {
    let name = file_stem(path);
    let params = vec![
        ("group_id", client.group_id.abs().to_string()),
        ("name", name),
        ("wallpost", "1".to_string()),
    ];
    let saved = client.call("video.save", &params).await?;
    let upload_url = saved
        .get("upload_url")
        .and_then(Value::as_str)
        .ok_or_else(|| RatelError::platform("video.save returned no upload_url"))?;

    let form = file_form("video_file", path).await?;
    client
        .http
        .post(upload_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| wrap_http("video upload", e))?
        .error_for_status()
        .map_err(|e| wrap_http("video upload", e))?;

    info!(path = %path.display(), "video uploaded to wall");
    Ok(())
}

/// Upload a photo for use in a chat message and return its attachment
/// reference.
pub(crate) async fn photo_for_message(
    client: &VkClient,
    peer_id: PeerId,
    path: &PathBuf,
) -> Result<String, RatelError> {
    let params = vec![("peer_id", peer_id.0.to_string())];
    let server = client
        .call("photos.getMessagesUploadServer", &params)
        .await?;
    let upload_url = server
        .get("upload_url")
        .and_then(Value::as_str)
        .ok_or_else(|| RatelError::platform("upload server returned no upload_url"))?;

    let form = file_form("photo", path).await?;
    let uploaded: Value = client
        .http
        .post(upload_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| wrap_http("photo upload", e))?
        .json()
        .await
        .map_err(|e| wrap_http("photo upload", e))?;

    let params = vec![
        ("server", field_string(&uploaded, "server")?),
        ("photo", field_string(&uploaded, "photo")?),
        ("hash", field_string(&uploaded, "hash")?),
    ];
    let saved = client.call("photos.saveMessagesPhoto", &params).await?;
    let photo = saved
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| RatelError::platform("saveMessagesPhoto returned no photo"))?;

    let owner_id = photo
        .get("owner_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| RatelError::platform("saved photo has no owner_id"))?;
    let id = photo
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| RatelError::platform("saved photo has no id"))?;
    let reference = match photo.get("access_key").and_then(Value::as_str) {
        Some(key) => format!("photo{owner_id}_{id}_{key}"),
        None => format!("photo{owner_id}_{id}"),
    };
    Ok(reference)
}

async fn file_form(field: &str, path: &Path) -> Result<multipart::Form, RatelError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| RatelError::Platform {
        message: format!("cannot read upload file {}", path.display()),
        source: Some(Box::new(e)),
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(multipart::Form::new()
        .part(field.to_string(), multipart::Part::bytes(bytes).file_name(file_name)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

/// Upload responses mix strings and numbers for the same field across
/// mirrors; normalize to string.
fn field_string(value: &Value, key: &str) -> Result<String, RatelError> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) if !other.is_null() => Ok(other.to_string()),
        _ => Err(RatelError::platform(format!(
            "upload response missing field {key}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_string_normalizes_numbers() {
        let value = json!({"server": 123456, "photo": "[]", "hash": "abc"});
        assert_eq!(field_string(&value, "server").unwrap(), "123456");
        assert_eq!(field_string(&value, "photo").unwrap(), "[]");
        assert!(field_string(&value, "missing").is_err());
    }

    #[test]
    fn file_stem_falls_back() {
        assert_eq!(file_stem(Path::new("/tmp/clip.mp4")), "clip");
        assert_eq!(file_stem(Path::new("/")), "video");
    }
}
