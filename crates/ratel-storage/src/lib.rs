// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Ratel bot backend.
//!
//! One [`Database`] per process; all access goes through typed query modules
//! under [`queries`]. Timestamps are stored as RFC 3339 UTC text.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
