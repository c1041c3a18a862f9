// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for daemon tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::put;
use axum::{Json, Router};
use possync_core::{PositionRecord, Upsert};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::connectivity::Connectivity;
use crate::transport::{Transfer, TransferError, TransferResult};

/// Create a well-formed record with the given key.
pub fn position(key: &str) -> PositionRecord {
    PositionRecord::new("d1", "2024-01-01", key)
        .with_coords(1, 2)
        .with_ts(100)
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ============================================================================
// MockTransfer
// ============================================================================

/// Transfer that records every attempt and fails on demand.
#[derive(Default)]
pub struct MockTransfer {
    attempts: Mutex<Vec<Upsert>>,
    delivered: Mutex<Vec<Upsert>>,
    failing_keys: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put fails.
    pub fn failing() -> Self {
        let transfer = Self::default();
        transfer.set_fail_all(true);
        transfer
    }

    /// Puts block until permits are added to the returned semaphore.
    pub fn held() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transfer = MockTransfer {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (transfer, gate)
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Puts for records with this key fail.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn attempts(&self) -> Vec<Upsert> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<Upsert> {
        self.delivered.lock().unwrap().clone()
    }

    /// Keys of successful puts, in completion order.
    pub fn delivered_keys(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .map(|u| u.path.key)
            .collect()
    }
}

impl Transfer for MockTransfer {
    fn put<'a>(
        &'a self,
        upsert: &'a Upsert,
    ) -> Pin<Box<dyn Future<Output = TransferResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(upsert.clone());

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            let fail = self.fail_all.load(Ordering::SeqCst)
                || self.failing_keys.lock().unwrap().contains(&upsert.path.key);
            if fail {
                return Err(TransferError::Status(503));
            }
            self.delivered.lock().unwrap().push(upsert.clone());
            Ok(())
        })
    }
}

// ============================================================================
// ScriptedConnectivity
// ============================================================================

/// Connectivity that answers from a script; the last answer repeats.
pub struct ScriptedConnectivity {
    script: Mutex<VecDeque<bool>>,
}

impl ScriptedConnectivity {
    pub fn new(script: &[bool]) -> Self {
        ScriptedConnectivity {
            script: Mutex::new(script.iter().copied().collect()),
        }
    }
}

impl Connectivity for ScriptedConnectivity {
    fn is_online(&self) -> bool {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap_or(true)
        } else {
            script.front().copied().unwrap_or(true)
        }
    }
}

// ============================================================================
// FakeStore
// ============================================================================

#[derive(Default)]
struct FakeState {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

/// In-process key-value store speaking the REST PUT interface.
///
/// Values are keyed by the raw (still percent-encoded) request path.
pub struct FakeStore {
    addr: SocketAddr,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

async fn handle_put(
    State(state): State<Arc<FakeState>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> StatusCode {
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    let path = uri.path().to_string();
    state.writes.lock().unwrap().push(path.clone());
    state.values.lock().unwrap().insert(path, body);
    StatusCode::OK
}

impl FakeStore {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/{*path}", put(handle_put))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeStore {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Value currently stored at `path`.
    pub fn value(&self, path: &str) -> Option<Value> {
        self.state.values.lock().unwrap().get(path).cloned()
    }

    /// Number of distinct paths holding a value.
    pub fn len(&self) -> usize {
        self.state.values.lock().unwrap().len()
    }

    /// Paths of accepted writes, in arrival order.
    pub fn writes(&self) -> Vec<String> {
        self.state.writes.lock().unwrap().clone()
    }

    /// While set, every PUT answers 503.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every response.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap();
        self.state.delay_ms.store(ms, Ordering::SeqCst);
    }
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        self.server.abort();
    }
}
