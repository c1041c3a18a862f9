// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the in-memory queue.

#![allow(clippy::unwrap_used)]

use super::super::test_support::{keys, record};
use super::super::OverflowPolicy;
use super::*;
use yare::parameterized;

fn store_with(keys: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .enqueue(keys.iter().map(|k| record(k)).collect())
        .unwrap();
    store
}

#[test]
fn enqueue_preserves_order() {
    let store = store_with(&["a", "b", "c"]);
    assert_eq!(keys(&store.snapshot().unwrap()), ["a", "b", "c"]);
    assert_eq!(store.len().unwrap(), 3);
}

#[test]
fn enqueue_keeps_duplicates() {
    let store = store_with(&["a", "a"]);
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn empty_store() {
    let store = MemoryStore::new();
    assert!(store.is_empty().unwrap());
    assert!(store.dequeue(1).unwrap().is_none());
}

#[test]
fn dequeue_takes_from_head() {
    let store = store_with(&["a", "b"]);
    let first = store.dequeue(1).unwrap().unwrap();
    assert_eq!(first.record.key.as_deref(), Some("a"));
    assert_eq!(keys(&store.snapshot().unwrap()), ["b"]);
}

#[test]
fn requeue_front_is_retried_first() {
    let store = store_with(&["a", "b"]);
    let mut first = store.dequeue(1).unwrap().unwrap();
    first.mark_failed(1);
    store.requeue_front(first).unwrap();

    assert_eq!(keys(&store.snapshot().unwrap()), ["a", "b"]);

    // The next pass sees the failed record first.
    let retried = store.dequeue(2).unwrap().unwrap();
    assert_eq!(retried.record.key.as_deref(), Some("a"));
    assert_eq!(retried.attempts, 1);
}

#[test]
fn dequeue_skips_records_failed_in_same_pass() {
    let store = store_with(&["a", "b"]);
    let mut first = store.dequeue(1).unwrap().unwrap();
    first.mark_failed(1);
    store.requeue_front(first).unwrap();

    let next = store.dequeue(1).unwrap().unwrap();
    assert_eq!(next.record.key.as_deref(), Some("b"));
    assert!(store.dequeue(1).unwrap().is_none());
    assert_eq!(keys(&store.snapshot().unwrap()), ["a"]);
}

#[parameterized(
    drop_oldest = { OverflowPolicy::DropOldest, &["c", "d", "e"], 5, 2 },
    drop_newest = { OverflowPolicy::DropNewest, &["a", "b", "c"], 3, 2 },
)]
fn bounded_queue_applies_overflow_policy(
    overflow: OverflowPolicy,
    expected: &[&str],
    accepted: usize,
    dropped: usize,
) {
    let store = MemoryStore::with_limits(QueueLimits {
        max_len: Some(3),
        overflow,
    });
    let outcome = store
        .enqueue(vec![record("a"), record("b"), record("c"), record("d"), record("e")])
        .unwrap();

    assert_eq!(outcome.dropped, dropped);
    assert_eq!(outcome.accepted, accepted);
    assert_eq!(keys(&store.snapshot().unwrap()), expected);
}

#[test]
fn requeue_ignores_bound() {
    let store = MemoryStore::with_limits(QueueLimits {
        max_len: Some(1),
        overflow: OverflowPolicy::DropNewest,
    });
    store.enqueue(vec![record("a")]).unwrap();
    let taken = store.dequeue(1).unwrap().unwrap();
    store.enqueue(vec![record("b")]).unwrap();

    store.requeue_front(taken).unwrap();
    assert_eq!(keys(&store.snapshot().unwrap()), ["a", "b"]);
}

#[test]
fn zero_capacity_drops_everything() {
    let store = MemoryStore::with_limits(QueueLimits {
        max_len: Some(0),
        overflow: OverflowPolicy::DropOldest,
    });
    let outcome = store.enqueue(vec![record("a"), record("b")]).unwrap();
    assert_eq!(outcome.accepted, 0);
    assert_eq!(outcome.dropped, 2);
    assert!(store.is_empty().unwrap());
}
