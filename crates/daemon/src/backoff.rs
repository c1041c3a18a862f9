// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff between failed flush passes.
//!
//! A pass counts as failed when it attempted deliveries and none went
//! through. Each consecutive failure pushes the next backoff-respecting pass
//! further out:
//!
//! ```text
//! delay(n) = min(initial * factor^(n-1), max) * (1 ± jitter)
//! ```
//!
//! Any delivery resets the sequence.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::BackoffConfig;

/// Delay after `failures` consecutive failed passes, before jitter.
pub fn calculate_backoff(failures: u32, config: &BackoffConfig) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
    let delay_ms = config.initial_delay_ms as f64 * config.factor.powi(exponent);
    Duration::from_millis(delay_ms.min(config.max_delay_ms as f64) as u64)
}

/// Spreads `delay` by up to `jitter` (a fraction) in either direction.
fn apply_jitter<R: Rng>(delay: Duration, jitter: f64, rng: &mut R) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = rng.gen_range(-jitter..=jitter);
    delay.mul_f64((1.0 + spread).max(0.0))
}

/// Consecutive-failure state.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
    not_before: Option<Instant>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Backoff {
            config,
            failures: 0,
            not_before: None,
        }
    }

    /// Records a failed pass and returns the delay until the next one.
    pub fn record_failure(&mut self) -> Duration {
        self.record_failure_at(Instant::now())
    }

    fn record_failure_at(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = calculate_backoff(self.failures, &self.config);
        let delay = apply_jitter(base, self.config.jitter, &mut rand::thread_rng());
        self.not_before = Some(now + delay);
        delay
    }

    /// Clears the failure sequence.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.not_before = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Time left before a backoff-respecting pass may run.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Instant::now())
    }

    fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.not_before
            .map(|at| at.saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
