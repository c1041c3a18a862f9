// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue backed by a JSONL journal.
//!
//! The queue lives in memory. The file is an append-only log of changes
//! to it, one JSON object per line:
//!
//! ```text
//! {"op":"push","seq":7,"entry":{"record":{…},"attempts":0}}   added at the tail
//! {"op":"front","seq":7,"attempts":1}                       back at the head
//! {"op":"done","seq":7}                                      delivered or evicted
//! ```
//!
//! - Enqueue appends and fsyncs before returning
//! - Dequeue writes nothing, so a record taken but never completed is
//!   replayed on the next open
//! - Requeue and completion append without syncing; a commit syncs them
//!
//! On open the log is replayed and compacted to one `push` line per live
//! record. Commits also compact once most lines describe records that are
//! gone.

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use possync_core::PositionRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EnqueueOutcome, Entries, QueueLimits, QueueStore, QueuedRecord, StoreResult};

/// Journal length below which commits never compact.
const COMPACT_MIN_LINES: usize = 1024;

/// One journal line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Push { seq: u64, entry: QueuedRecord },
    Front { seq: u64, attempts: u32 },
    Done { seq: u64 },
}

impl Op {
    fn push(entry: &QueuedRecord) -> Self {
        Op::Push {
            seq: entry.seq,
            entry: entry.clone(),
        }
    }
}

/// Queue persisted as a JSON Lines journal.
#[derive(Debug)]
pub struct JsonlStore {
    /// Path to the journal file.
    path: PathBuf,
    journal: Mutex<Journal>,
}

#[derive(Debug)]
struct Journal {
    entries: Entries,
    /// Dequeued records not yet completed or requeued.
    in_flight: BTreeMap<u64, QueuedRecord>,
    file: File,
    /// Lines currently in the file.
    lines: usize,
    /// Appends not yet fsynced.
    unsynced: bool,
    /// A write failed part way, so the next write replaces the file.
    damaged: bool,
}

impl JsonlStore {
    /// Create or open a queue file at the given path.
    pub fn open(path: &Path, limits: QueueLimits) -> StoreResult<Self> {
        let replayed = replay(path)?;
        debug!(
            "opened queue file {} with {} records ({} journal lines)",
            path.display(),
            replayed.items.len(),
            replayed.lines
        );

        let stale = replayed.torn || replayed.lines > replayed.items.len();
        let mut journal = Journal {
            entries: Entries::with_items(replayed.items, limits),
            in_flight: BTreeMap::new(),
            file: open_append(path)?,
            lines: replayed.lines,
            unsynced: false,
            damaged: false,
        };
        if stale {
            journal.compact(path)?;
        }

        Ok(JsonlStore {
            path: path.to_path_buf(),
            journal: Mutex::new(journal),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> StoreResult<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

impl Journal {
    fn live(&self) -> usize {
        self.entries.len() + self.in_flight.len()
    }

    fn should_compact(&self) -> bool {
        self.lines >= COMPACT_MIN_LINES && self.lines > 2 * self.live()
    }

    /// Appends `ops`, or rewrites the file if an earlier write failed.
    fn append(&mut self, path: &Path, ops: &[Op]) -> StoreResult<()> {
        if self.damaged {
            return self.compact(path);
        }
        if ops.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for op in ops {
            serde_json::to_writer(&mut buf, op)?;
            buf.push(b'\n');
        }
        if let Err(e) = self.file.write_all(&buf) {
            self.damaged = true;
            return Err(e.into());
        }
        self.lines += ops.len();
        self.unsynced = true;
        Ok(())
    }

    fn sync(&mut self) -> StoreResult<()> {
        if self.unsynced {
            if let Err(e) = self.file.sync_data() {
                self.damaged = true;
                return Err(e.into());
            }
            self.unsynced = false;
        }
        Ok(())
    }

    /// Replaces the file with one `push` line per live record.
    ///
    /// In-flight records go first so a restart retries them before the
    /// rest of the queue.
    fn compact(&mut self, path: &Path) -> StoreResult<()> {
        let tmp_path = path.with_extension("jsonl.tmp");
        let mut lines = 0;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for entry in self.in_flight.values().chain(self.entries.items()) {
                serde_json::to_writer(&mut writer, &Op::push(entry))?;
                writer.write_all(b"\n")?;
                lines += 1;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        // The old handle points at the replaced file.
        self.damaged = true;
        self.file = open_append(path)?;
        debug!("compacted {} from {} to {} lines", path.display(), self.lines, lines);
        self.lines = lines;
        self.unsynced = false;
        self.damaged = false;
        Ok(())
    }
}

/// Queue state rebuilt from a journal.
#[derive(Debug, Default)]
struct Replayed {
    items: VecDeque<QueuedRecord>,
    lines: usize,
    /// The last line was cut short and skipped.
    torn: bool,
}

impl Replayed {
    fn apply(&mut self, op: Op) {
        match op {
            Op::Push { seq, mut entry } => {
                entry.seq = seq;
                self.items.push_back(entry);
            }
            Op::Front { seq, attempts } => {
                if let Some(mut entry) = self.remove(seq) {
                    entry.attempts = attempts;
                    self.items.push_front(entry);
                }
            }
            Op::Done { seq } => {
                self.remove(seq);
            }
        }
    }

    /// Completions almost always target the head, so the scan is short.
    fn remove(&mut self, seq: u64) -> Option<QueuedRecord> {
        let index = self.items.iter().position(|entry| entry.seq == seq)?;
        self.items.remove(index)
    }
}

fn replay(path: &Path) -> StoreResult<Replayed> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Replayed::default());
        }
        Err(e) => return Err(e.into()),
    };
    let text = String::from_utf8_lossy(&bytes);
    let ends_cleanly = text.is_empty() || text.ends_with('\n');

    let mut replayed = Replayed::default();
    let mut lines = text.lines().filter(|line| !line.trim().is_empty()).peekable();
    while let Some(line) = lines.next() {
        let op = match serde_json::from_str(line) {
            Ok(op) => op,
            Err(e) if !ends_cleanly && lines.peek().is_none() => {
                warn!("skipping truncated last line of {}: {}", path.display(), e);
                replayed.torn = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        replayed.lines += 1;
        replayed.apply(op);
    }
    Ok(replayed)
}

impl QueueStore for JsonlStore {
    fn enqueue(&self, records: Vec<PositionRecord>) -> StoreResult<EnqueueOutcome> {
        let mut journal = self.lock();
        let pushed = journal.entries.push_back(records);

        let mut ops: Vec<Op> = pushed
            .evicted
            .iter()
            .map(|entry| Op::Done { seq: entry.seq })
            .collect();
        ops.extend(pushed.appended.iter().map(Op::push));

        let written = journal.append(&self.path, &ops);
        if let Err(e) = written.and_then(|()| journal.sync()) {
            journal.damaged = true;
            journal.entries.undo(pushed);
            return Err(e);
        }
        Ok(pushed.outcome)
    }

    fn dequeue(&self, pass: u64) -> StoreResult<Option<QueuedRecord>> {
        let mut journal = self.lock();
        let taken = journal.entries.take_untried(pass);
        if let Some(entry) = &taken {
            journal.in_flight.insert(entry.seq, entry.clone());
        }
        Ok(taken)
    }

    fn requeue_front(&self, mut entry: QueuedRecord) -> StoreResult<()> {
        let mut journal = self.lock();
        let mut ops = Vec::with_capacity(2);
        if journal.in_flight.remove(&entry.seq).is_none() {
            // Not taken from this store, so the journal has never seen it.
            entry.seq = journal.entries.allocate_seq();
            ops.push(Op::push(&entry));
        }
        ops.push(Op::Front {
            seq: entry.seq,
            attempts: entry.attempts,
        });

        // The record stays queued in memory even if the write fails.
        journal.entries.push_front(entry);
        journal.append(&self.path, &ops)
    }

    fn complete(&self, entry: &QueuedRecord) -> StoreResult<()> {
        let mut journal = self.lock();
        if journal.in_flight.remove(&entry.seq).is_none() {
            return Ok(());
        }
        journal.append(&self.path, &[Op::Done { seq: entry.seq }])
    }

    fn commit(&self) -> StoreResult<()> {
        let mut journal = self.lock();
        if journal.damaged || journal.should_compact() {
            return journal.compact(&self.path);
        }
        journal.sync()
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock().entries.len())
    }

    fn snapshot(&self) -> StoreResult<Vec<QueuedRecord>> {
        Ok(self.lock().entries.items().iter().cloned().collect())
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
