// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outcome of a single flush pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters describing what one pass over the queue did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Monotonic pass number, starting at 1.
    pub pass_id: u64,
    /// What started the pass (e.g. "enqueue", "periodic").
    pub trigger: String,
    /// Records handed to the transfer client.
    pub attempted: usize,
    /// Records confirmed by the remote store.
    pub delivered: usize,
    /// Records put back at the head after a failed attempt.
    pub requeued: usize,
    /// Records discarded because no path could be built for them.
    pub dropped_malformed: usize,
    /// The pass stopped taking records because the network was down.
    pub stopped_offline: bool,
    /// The pass was skipped because of retry backoff.
    pub deferred: bool,
    /// Queue length when the pass finished.
    pub remaining: usize,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    /// Creates an empty report for the given pass.
    pub fn new(pass_id: u64, trigger: impl Into<String>) -> Self {
        PassReport {
            pass_id,
            trigger: trigger.into(),
            attempted: 0,
            delivered: 0,
            requeued: 0,
            dropped_malformed: 0,
            stopped_offline: false,
            deferred: false,
            remaining: 0,
            finished_at: Utc::now(),
        }
    }

    /// Stamps the report as finished with `remaining` records left.
    pub fn finish(&mut self, remaining: usize) {
        self.remaining = remaining;
        self.finished_at = Utc::now();
    }

    /// Returns true if the pass attempted deliveries and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.delivered == 0
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
