// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory queue. Contents are lost when the process exits.

use std::sync::{Mutex, MutexGuard, PoisonError};

use possync_core::PositionRecord;

use super::{EnqueueOutcome, Entries, QueueLimits, QueueStore, QueuedRecord, StoreResult};

/// Queue held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::with_limits(QueueLimits::default())
    }

    /// Creates a queue with the given capacity settings.
    pub fn with_limits(limits: QueueLimits) -> Self {
        MemoryStore {
            entries: Mutex::new(Entries::new(limits)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueStore for MemoryStore {
    fn enqueue(&self, records: Vec<PositionRecord>) -> StoreResult<EnqueueOutcome> {
        Ok(self.lock().push_back(records).outcome)
    }

    fn dequeue(&self, pass: u64) -> StoreResult<Option<QueuedRecord>> {
        Ok(self.lock().take_untried(pass))
    }

    fn requeue_front(&self, entry: QueuedRecord) -> StoreResult<()> {
        self.lock().push_front(entry);
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock().len())
    }

    fn snapshot(&self) -> StoreResult<Vec<QueuedRecord>> {
        Ok(self.lock().items().iter().cloned().collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
