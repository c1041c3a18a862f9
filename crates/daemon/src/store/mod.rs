// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-record queue.
//!
//! The flush coordinator only sees the [`QueueStore`] trait, so the same
//! drain/requeue logic runs against:
//! - [`MemoryStore`]: records live as long as the process
//! - [`JsonlStore`]: every mutation is journaled to a JSONL file
//!
//! # Ordering
//!
//! ```text
//!  head                                            tail
//!  ┌──────────────┬──────────────┬─────────────────────┐
//!  │ requeued     │ older        │ newly enqueued      │
//!  │ (failed)     │ records      │ records             │
//!  └──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! Failed records go back to the head so they are retried before anything
//! newer.

mod jsonl;
mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use std::collections::VecDeque;

use possync_core::PositionRecord;
use serde::{Deserialize, Serialize};

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A record waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRecord {
    pub record: PositionRecord,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Pass that last tried (and failed) to deliver this record.
    #[serde(skip)]
    pub last_pass: Option<u64>,
    /// Position in enqueue order, assigned by the store.
    #[serde(skip)]
    pub seq: u64,
}

impl QueuedRecord {
    /// Wraps a fresh record.
    pub fn new(record: PositionRecord) -> Self {
        QueuedRecord {
            record,
            attempts: 0,
            last_pass: None,
            seq: 0,
        }
    }

    /// Records a failed attempt made by `pass`.
    pub fn mark_failed(&mut self, pass: u64) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_pass = Some(pass);
    }
}

/// What to give up when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict from the head to make room for new records.
    #[default]
    DropOldest,
    /// Refuse incoming records once full.
    DropNewest,
}

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnqueueOutcome {
    /// Records appended.
    pub accepted: usize,
    /// Records discarded by the overflow policy (queued or incoming).
    pub dropped: usize,
}

/// Capacity settings shared by all stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Maximum queued records (None = unbounded).
    pub max_len: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for QueueLimits {
    fn default() -> Self {
        QueueLimits {
            max_len: None,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Storage for records awaiting delivery.
///
/// Implementations synchronize internally; every method takes `&self`.
pub trait QueueStore: Send + Sync {
    /// Appends records to the tail in the given order.
    fn enqueue(&self, records: Vec<PositionRecord>) -> StoreResult<EnqueueOutcome>;

    /// Takes the record nearest the head that `pass` has not tried yet.
    ///
    /// The record leaves the queue, but a durable store keeps it on disk
    /// until it is passed to [`complete`](Self::complete) or
    /// [`requeue_front`](Self::requeue_front).
    fn dequeue(&self, pass: u64) -> StoreResult<Option<QueuedRecord>>;

    /// Puts a record back at the head.
    ///
    /// Not subject to the capacity bound.
    fn requeue_front(&self, entry: QueuedRecord) -> StoreResult<()>;

    /// Forgets a dequeued record for good (delivered or dropped).
    fn complete(&self, _entry: &QueuedRecord) -> StoreResult<()> {
        Ok(())
    }

    /// Makes completions and requeues so far durable.
    ///
    /// Called once per pass rather than per record.
    fn commit(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Number of queued records.
    fn len(&self) -> StoreResult<usize>;

    /// Copy of the queue, head first.
    fn snapshot(&self) -> StoreResult<Vec<QueuedRecord>>;

    /// Check if the queue is empty.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Effect of [`Entries::push_back`].
#[derive(Debug, Default)]
pub(crate) struct Pushed {
    pub(crate) outcome: EnqueueOutcome,
    /// New records still queued afterwards, in order.
    pub(crate) appended: Vec<QueuedRecord>,
    /// Older records evicted to make room, head first.
    pub(crate) evicted: Vec<QueuedRecord>,
}

/// Queue contents plus the bookkeeping both stores share.
#[derive(Debug)]
pub(crate) struct Entries {
    items: VecDeque<QueuedRecord>,
    limits: QueueLimits,
    next_seq: u64,
}

impl Default for Entries {
    fn default() -> Self {
        Entries::new(QueueLimits::default())
    }
}

impl Entries {
    pub(crate) fn new(limits: QueueLimits) -> Self {
        Entries {
            items: VecDeque::new(),
            limits,
            next_seq: 1,
        }
    }

    /// Wraps records read back from disk; their `seq` values are kept.
    pub(crate) fn with_items(items: VecDeque<QueuedRecord>, limits: QueueLimits) -> Self {
        let next_seq = items.iter().map(|e| e.seq + 1).max().unwrap_or(1);
        Entries {
            items,
            limits,
            next_seq,
        }
    }

    pub(crate) fn items(&self) -> &VecDeque<QueuedRecord> {
        &self.items
    }

    pub(crate) fn limits(&self) -> QueueLimits {
        self.limits
    }

    pub(crate) fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Appends records, applying the overflow policy.
    ///
    /// The result lists what was appended and evicted, so callers can
    /// mirror exactly those or [`undo`](Self::undo) them.
    pub(crate) fn push_back(&mut self, records: Vec<PositionRecord>) -> Pushed {
        let mut pushed = Pushed::default();
        let first_seq = self.next_seq;

        for record in records {
            if let Some(max) = self.limits.max_len {
                if self.items.len() >= max {
                    match self.limits.overflow {
                        OverflowPolicy::DropNewest => {
                            pushed.outcome.dropped += 1;
                            continue;
                        }
                        OverflowPolicy::DropOldest => {
                            if max == 0 {
                                pushed.outcome.dropped += 1;
                                continue;
                            }
                            while self.items.len() >= max {
                                if let Some(old) = self.items.pop_front() {
                                    if old.seq >= first_seq {
                                        pushed.appended.retain(|e| e.seq != old.seq);
                                    } else {
                                        pushed.evicted.push(old);
                                    }
                                }
                                pushed.outcome.dropped += 1;
                            }
                        }
                    }
                }
            }

            let mut entry = QueuedRecord::new(record);
            entry.seq = self.allocate_seq();
            pushed.appended.push(entry.clone());
            self.items.push_back(entry);
            pushed.outcome.accepted += 1;
        }

        pushed
    }

    /// Reverts a [`push_back`](Self::push_back) whose mirror write failed.
    pub(crate) fn undo(&mut self, pushed: Pushed) {
        for _ in &pushed.appended {
            self.items.pop_back();
        }
        for entry in pushed.evicted.into_iter().rev() {
            self.items.push_front(entry);
        }
    }

    pub(crate) fn take_untried(&mut self, pass: u64) -> Option<QueuedRecord> {
        let index = self
            .items
            .iter()
            .position(|entry| entry.last_pass != Some(pass))?;
        self.items.remove(index)
    }

    pub(crate) fn push_front(&mut self, entry: QueuedRecord) {
        self.items.push_front(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
