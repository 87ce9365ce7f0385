// SPDX-FileCopyrightText: 2026 Ratel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cron scheduling: periodic outbound sends and storage sweepers.
//!
//! Every job is a spawned loop that sleeps until the next cron occurrence,
//! fires, and goes back to sleep. A job failure never kills the loop; the
//! job logs the error and pauses before rearming so a broken upstream does
//! not turn into a hot loop.

mod scheduler;
mod sweep;

pub use scheduler::{MessageFetch, MessageSource, Scheduler, SendSink};
pub use sweep::{SweepOutcome, sweep_presence};
