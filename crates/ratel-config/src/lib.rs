// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for the Ratel bot backend.
//!
//! Layered merge via Figment: compiled defaults, then system and user TOML
//! files, then a local `ratel.toml`, then `RATEL_*` environment variables.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RatelConfig;
