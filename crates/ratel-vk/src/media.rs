// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media retrieval and object storage implementations.
//!
//! Video download shells out to yt-dlp, which handles the platform's
//! streaming formats. The object store is a plain directory tree fed over
//! HTTP.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ratel_core::error::RatelError;
use ratel_core::platform::{MediaFetcher, ObjectStore};
use tracing::{debug, info};
use uuid::Uuid;

/// [`MediaFetcher`] backed by the yt-dlp binary for video and plain HTTP
/// for small files.
pub struct YtDlpFetcher {
    output_dir: PathBuf,
    http: reqwest::Client,
}

impl YtDlpFetcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    /// An attachment reference becomes the public watch URL yt-dlp accepts.
    fn watch_url(reference: &str) -> String {
        format!("https://vk.com/{reference}")
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn download_video(&self, reference: &str) -> Result<PathBuf, RatelError> {
        let output = self
            .output_dir
            .join(format!("{}.mp4", Uuid::new_v4().simple()));
        let url = Self::watch_url(reference);
        debug!(reference, output = %output.display(), "downloading video");

        let status = tokio::process::Command::new("yt-dlp")
            .arg("--quiet")
            .arg("--output")
            .arg(&output)
            .arg(&url)
            .status()
            .await
            .map_err(|e| RatelError::Platform {
                message: "yt-dlp could not be spawned".into(),
                source: Some(Box::new(e)),
            })?;
        if !status.success() {
            return Err(RatelError::platform(format!(
                "yt-dlp exited with {status} for {reference}"
            )));
        }
        info!(reference, "video downloaded");
        Ok(output)
    }

    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, RatelError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| crate::api::wrap_http("media fetch", e))?
            .error_for_status()
            .map_err(|e| crate::api::wrap_http("media fetch", e))?
            .bytes()
            .await
            .map_err(|e| crate::api::wrap_http("media fetch", e))?;
        debug!(url, size = bytes.len(), "media fetched");
        Ok(bytes.to_vec())
    }
}

/// [`ObjectStore`] writing fetched objects under a local root directory.
pub struct LocalObjectStore {
    root: PathBuf,
    http: reqwest::Client,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            http: reqwest::Client::new(),
        }
    }

    fn target(&self, key: &str) -> PathBuf {
        // Keys are forward-slash namespaced; strip any leading separator.
        self.root.join(Path::new(key.trim_start_matches('/')))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_from_url(&self, key: &str, url: &str) -> Result<(), RatelError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| crate::api::wrap_http("object fetch", e))?
            .error_for_status()
            .map_err(|e| crate::api::wrap_http("object fetch", e))?
            .bytes()
            .await
            .map_err(|e| crate::api::wrap_http("object fetch", e))?;

        let target = self.target(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_io(&target, e))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| store_io(&target, e))?;
        debug!(key, size = bytes.len(), "object stored");
        Ok(())
    }
}

fn store_io(path: &Path, e: std::io::Error) -> RatelError {
    RatelError::Platform {
        message: format!("object store write {}", path.display()),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url_from_reference() {
        assert_eq!(
            YtDlpFetcher::watch_url("video-1_2"),
            "https://vk.com/video-1_2"
        );
    }

    #[test]
    fn target_path_is_rooted() {
        let store = LocalObjectStore::new("/data/objects");
        assert_eq!(
            store.target("/ingest/1_2.jpg"),
            PathBuf::from("/data/objects/ingest/1_2.jpg")
        );
    }
}
