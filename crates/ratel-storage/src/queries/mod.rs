// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod dyn_config;
pub mod messages;
pub mod polls;
pub mod presence;
pub mod schedules;
pub mod tasks;
pub mod triggers;
