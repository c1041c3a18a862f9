// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Flush coordinator: drains the queue into the remote store.
//!
//! # Pass
//!
//! One pass walks the queue from the head:
//!
//! 1. Empty queue: nothing to do.
//! 2. Recent passes failed and the trigger respects backoff: deferred.
//! 3. Before each record is taken, connectivity is checked; offline stops
//!    the pass from taking more.
//! 4. Records without a valid path are dropped. The rest are delivered
//!    concurrently, up to `max_in_flight` at a time.
//! 5. A failed delivery puts its record back at the head, stamped so this
//!    pass does not pick it up again. Delivered and dropped records are
//!    completed in the store.
//! 6. Once every delivery it started has settled, the pass commits the
//!    store and returns.
//!
//! # Single flight
//!
//! Passes never overlap. A flush requested while a pass runs schedules one
//! follow-up pass (shared by every request that arrives meanwhile) and
//! resolves with that follow-up's report:
//!
//! ```text
//!  flush(A) ──► pass 1 ─────────────► pass 2 ──► idle
//!  flush(B) ───────┘ waits for 2         ▲
//!  flush(C) ───────────────────────────┘ (joins 2)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use possync_core::{PassReport, Upsert};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, Config};
use crate::connectivity::Connectivity;
use crate::store::{QueueStore, QueuedRecord, StoreResult};
use crate::transport::{Transfer, TransferResult};
use crate::triggers::Trigger;

/// Pass tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOptions {
    /// Deliveries allowed in flight at once.
    pub max_in_flight: usize,
    pub backoff: BackoffConfig,
}

impl Default for FlushOptions {
    fn default() -> Self {
        FlushOptions {
            max_in_flight: 16,
            backoff: BackoffConfig::default(),
        }
    }
}

impl FlushOptions {
    pub fn from_config(config: &Config) -> Self {
        FlushOptions {
            max_in_flight: config.flush.max_in_flight.max(1),
            backoff: config.backoff.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Gate {
    running: bool,
    /// Trigger for the follow-up pass, if one was requested.
    rerun: Option<Trigger>,
    /// Id of the most recently started pass.
    started: u64,
}

/// Runs flush passes over a queue store.
pub struct FlushCoordinator {
    store: Arc<dyn QueueStore>,
    transfer: Arc<dyn Transfer>,
    connectivity: Arc<dyn Connectivity>,
    max_in_flight: usize,
    backoff: Mutex<Backoff>,
    gate: Mutex<Gate>,
    reports: watch::Sender<Option<PassReport>>,
    running: watch::Sender<bool>,
    passes_completed: AtomicU64,
    dropped_malformed: AtomicU64,
}

type Attempt = (QueuedRecord, TransferResult<()>);

impl FlushCoordinator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transfer: Arc<dyn Transfer>,
        connectivity: Arc<dyn Connectivity>,
        options: FlushOptions,
    ) -> Self {
        FlushCoordinator {
            store,
            transfer,
            connectivity,
            max_in_flight: options.max_in_flight.max(1),
            backoff: Mutex::new(Backoff::new(options.backoff)),
            gate: Mutex::new(Gate::default()),
            reports: watch::Sender::new(None),
            running: watch::Sender::new(false),
            passes_completed: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
        }
    }

    /// The queue this coordinator drains.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Runs a pass, or joins the follow-up of the one already running.
    ///
    /// The pass itself runs on a spawned task, so dropping the returned
    /// future does not interrupt it.
    pub async fn flush(self: &Arc<Self>, trigger: Trigger) -> PassReport {
        let target = {
            let mut gate = self.lock_gate();
            if gate.running {
                gate.rerun = Some(match gate.rerun {
                    Some(pending) => pending.merge(trigger),
                    None => trigger,
                });
                gate.started + 1
            } else {
                gate.running = true;
                gate.started += 1;
                let pass_id = gate.started;
                self.running.send_replace(true);

                let this = Arc::clone(self);
                tokio::spawn(async move { this.drive(trigger, pass_id).await });
                pass_id
            }
        };
        self.wait_for(target, trigger).await
    }

    /// Waits until no pass is running.
    pub async fn settle(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Waits until no pass is running, giving up after `timeout`.
    ///
    /// Returns false on timeout.
    pub async fn settle_within(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.settle()).await.is_ok()
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Report of the most recent finished pass.
    pub fn last_report(&self) -> Option<PassReport> {
        self.reports.borrow().clone()
    }

    /// Receives every pass report as it is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<PassReport>> {
        self.reports.subscribe()
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    /// Records dropped as malformed since startup.
    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed.load(Ordering::Relaxed)
    }

    /// Counts records rejected before they reached the queue.
    pub fn count_malformed(&self, count: usize) {
        self.dropped_malformed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock_backoff().consecutive_failures()
    }

    /// Time left before a backoff-respecting pass may run.
    pub fn backoff_remaining(&self) -> Option<Duration> {
        self.lock_backoff().remaining()
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait_for(&self, target: u64, trigger: Trigger) -> PassReport {
        let mut rx = self.reports.subscribe();
        let report = rx
            .wait_for(|r| r.as_ref().is_some_and(|r| r.pass_id >= target))
            .await
            .ok()
            .and_then(|r| (*r).clone());
        report.unwrap_or_else(|| PassReport::new(target, trigger.as_str()))
    }

    /// Runs passes until no follow-up is pending.
    async fn drive(self: Arc<Self>, mut trigger: Trigger, mut pass_id: u64) {
        loop {
            let report = self.run_pass(pass_id, trigger).await;
            self.passes_completed.fetch_add(1, Ordering::Relaxed);
            self.reports.send_replace(Some(report));

            let next = {
                let mut gate = self.lock_gate();
                match gate.rerun.take() {
                    Some(next) => {
                        gate.started += 1;
                        Some((next, gate.started))
                    }
                    None => {
                        gate.running = false;
                        self.running.send_replace(false);
                        None
                    }
                }
            };

            match next {
                Some((next_trigger, next_id)) => {
                    trigger = next_trigger;
                    pass_id = next_id;
                }
                None => return,
            }
        }
    }

    async fn run_pass(&self, pass_id: u64, trigger: Trigger) -> PassReport {
        let mut report = PassReport::new(pass_id, trigger.as_str());

        match self.store.is_empty() {
            Ok(true) => {
                debug!("pass {} ({}): queue empty", pass_id, trigger);
                return self.finish(report);
            }
            Ok(false) => {}
            Err(e) => {
                error!("pass {} ({}): failed to read queue: {}", pass_id, trigger, e);
                return self.finish(report);
            }
        }

        if !trigger.bypasses_backoff() {
            if let Some(remaining) = self.backoff_remaining() {
                debug!(
                    "pass {} ({}): deferred, backoff {}ms remaining",
                    pass_id,
                    trigger,
                    remaining.as_millis()
                );
                report.deferred = true;
                return self.finish(report);
            }
        }

        if let Err(e) = self.drain(pass_id, &mut report).await {
            error!("pass {} ({}): queue store failed: {}", pass_id, trigger, e);
        }

        let report = self.finish(report);
        self.update_backoff(&report);
        report
    }

    async fn drain(&self, pass_id: u64, report: &mut PassReport) -> StoreResult<()> {
        let mut in_flight = FuturesUnordered::new();
        let mut result = Ok(());

        'take: loop {
            // Settle whatever already finished so failures reach the head
            // promptly.
            while let Some(Some((entry, outcome))) = in_flight.next().now_or_never() {
                if let Err(e) = self.settle_attempt(pass_id, report, entry, outcome) {
                    result = Err(e);
                    break 'take;
                }
            }

            if in_flight.len() >= self.max_in_flight {
                if let Some((entry, outcome)) = in_flight.next().await {
                    if let Err(e) = self.settle_attempt(pass_id, report, entry, outcome) {
                        result = Err(e);
                        break 'take;
                    }
                }
                continue;
            }

            if !self.connectivity.is_online() {
                info!("pass {}: offline, leaving remaining records queued", pass_id);
                report.stopped_offline = true;
                break;
            }

            let entry = match self.store.dequeue(pass_id) {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };

            match entry.record.to_upsert() {
                Ok(upsert) => {
                    report.attempted += 1;
                    debug!("pass {}: delivering {}", pass_id, upsert.path);
                    in_flight.push(deliver(self.transfer.as_ref(), entry, upsert));
                }
                Err(e) => {
                    report.dropped_malformed += 1;
                    self.count_malformed(1);
                    warn!("dropping record {}: {}", entry.record, e);
                    if let Err(e) = self.store.complete(&entry) {
                        result = Err(e);
                        break;
                    }
                }
            }
        }

        // Attempts already started still settle (and requeue) after a stop.
        while let Some((entry, outcome)) = in_flight.next().await {
            if let Err(e) = self.settle_attempt(pass_id, report, entry, outcome) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if let Err(e) = self.store.commit() {
            if result.is_ok() {
                result = Err(e);
            }
        }
        result
    }

    fn settle_attempt(
        &self,
        pass_id: u64,
        report: &mut PassReport,
        mut entry: QueuedRecord,
        outcome: TransferResult<()>,
    ) -> StoreResult<()> {
        match outcome {
            Ok(()) => {
                report.delivered += 1;
                self.store.complete(&entry)
            }
            Err(e) => {
                entry.mark_failed(pass_id);
                warn!(
                    "delivery of {} failed (attempt {}): {}",
                    entry.record, entry.attempts, e
                );
                report.requeued += 1;
                self.store.requeue_front(entry)
            }
        }
    }

    fn finish(&self, mut report: PassReport) -> PassReport {
        report.finish(self.store.len().unwrap_or(0));

        if report.attempted > 0 || report.dropped_malformed > 0 {
            info!(
                "pass {} ({}): delivered {}/{}, requeued {}, dropped {}, {} remaining",
                report.pass_id,
                report.trigger,
                report.delivered,
                report.attempted,
                report.requeued,
                report.dropped_malformed,
                report.remaining
            );
        }
        report
    }

    fn update_backoff(&self, report: &PassReport) {
        let mut backoff = self.lock_backoff();
        if report.all_failed() {
            let delay = backoff.record_failure();
            warn!(
                "pass {} delivered nothing ({} consecutive), backing off {}ms",
                report.pass_id,
                backoff.consecutive_failures(),
                delay.as_millis()
            );
        } else if report.delivered > 0 {
            backoff.record_success();
        }
    }
}

async fn deliver(transfer: &dyn Transfer, entry: QueuedRecord, upsert: Upsert) -> Attempt {
    let outcome = transfer.put(&upsert).await;
    (entry, outcome)
}

#[cfg(test)]
#[path = "flush_tests.rs"]
mod tests;
