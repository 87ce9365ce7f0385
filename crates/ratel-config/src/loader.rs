// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./ratel.toml` > `~/.config/ratel/ratel.toml` >
//! `/etc/ratel/ratel.toml` with environment variable overrides via the
//! `RATEL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RatelConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/ratel/ratel.toml` (system-wide)
/// 3. `~/.config/ratel/ratel.toml` (user XDG config)
/// 4. `./ratel.toml` (local directory)
/// 5. `RATEL_*` environment variables
pub fn load_config() -> Result<RatelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RatelConfig::default()))
        .merge(Toml::file("/etc/ratel/ratel.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("ratel/ratel.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("ratel.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string (testing and tooling).
pub fn load_config_from_str(toml_content: &str) -> Result<RatelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RatelConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RatelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RatelConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `RATEL_BROKER_SERVICE_QUEUE` must map to
/// `broker.service_queue`, not `broker.service.queue`.
fn env_provider() -> Env {
    const SECTIONS: [&str; 7] = [
        "service",
        "broker",
        "storage",
        "vk",
        "bot",
        "scheduler",
        "presence",
    ];
    Env::prefixed("RATEL_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        for section in SECTIONS {
            if let Some(rest) = key_str.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.into()
    })
}
