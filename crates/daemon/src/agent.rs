// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Request handling for the control socket.
//!
//! The agent turns requests into queue writes and triggers. It never waits
//! for a pass: producers get an answer as soon as their records are queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use possync_core::{decode_positions, ControlMessage, PlatformSignal};
use possync_ipc::{AgentStatus, Request, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connectivity::{Connectivity, ConnectivityState};
use crate::flush::FlushCoordinator;
use crate::triggers::{apply_signal, SignalAction, Trigger, TriggerSender};

/// Shared state behind the control socket.
pub struct Agent {
    coordinator: Arc<FlushCoordinator>,
    connectivity: Arc<ConnectivityState>,
    triggers: TriggerSender,
    shutdown: CancellationToken,
    start_time: Instant,
    dropped_overflow: AtomicU64,
}

impl Agent {
    pub fn new(
        coordinator: Arc<FlushCoordinator>,
        connectivity: Arc<ConnectivityState>,
        triggers: TriggerSender,
        shutdown: CancellationToken,
    ) -> Self {
        Agent {
            coordinator,
            connectivity,
            triggers,
            shutdown,
            start_time: Instant::now(),
            dropped_overflow: AtomicU64::new(0),
        }
    }

    /// Handles one request.
    pub fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Control { message } => self.handle_control(message),
            Request::Signal { signal } => self.handle_signal(&signal),
            Request::Status => Response::Status(self.status()),
            Request::Ping => Response::Pong,
            Request::Shutdown => {
                info!("shutdown requested");
                self.shutdown.cancel();
                Response::ShuttingDown
            }
        }
    }

    fn handle_control(&self, message: ControlMessage) -> Response {
        match message {
            ControlMessage::NewPositions { positions } => self.enqueue(positions),
            ControlMessage::SyncNow => self.trigger(Trigger::SyncNow, 0, 0),
            ControlMessage::Unknown => Response::ignored("unknown control message type"),
        }
    }

    fn handle_signal(&self, signal: &PlatformSignal) -> Response {
        match apply_signal(signal, &self.connectivity) {
            SignalAction::Flush(trigger) => self.trigger(trigger, 0, 0),
            SignalAction::MarkOffline => {
                info!("platform reported offline");
                self.accepted(0, 0)
            }
            SignalAction::Ignore => {
                debug!("ignoring signal {:?}", signal);
                Response::ignored("signal is not addressed to position sync")
            }
        }
    }

    fn enqueue(&self, positions: Vec<Value>) -> Response {
        let decoded = decode_positions(positions);
        for (index, e) in &decoded.rejected {
            warn!("dropping unreadable position at index {}: {}", index, e);
        }
        let rejected = decoded.rejected.len();
        self.coordinator.count_malformed(rejected);

        let count = decoded.records.len();
        let outcome = match self.coordinator.store().enqueue(decoded.records) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("failed to queue {} records: {}", count, e);
                return Response::error(format!("failed to queue records: {e}"));
            }
        };

        if outcome.dropped > 0 {
            warn!(
                "queue full: {} records dropped by overflow policy",
                outcome.dropped
            );
            self.dropped_overflow
                .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        }
        debug!("queued {} records", outcome.accepted);
        self.trigger(
            Trigger::Enqueue,
            outcome.accepted,
            outcome.dropped + rejected,
        )
    }

    fn trigger(&self, trigger: Trigger, accepted: usize, dropped: usize) -> Response {
        if !self.triggers.fire(trigger) {
            return Response::error("agent is shutting down");
        }
        self.accepted(accepted, dropped)
    }

    fn accepted(&self, accepted: usize, dropped: usize) -> Response {
        Response::Accepted {
            accepted,
            dropped,
            queue_len: self.queue_len(),
        }
    }

    fn queue_len(&self) -> usize {
        self.coordinator.store().len().unwrap_or(0)
    }

    /// Current agent status.
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            pid: std::process::id(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            queue_len: self.queue_len(),
            online: self.connectivity.is_online(),
            passes_completed: self.coordinator.passes_completed(),
            consecutive_failures: self.coordinator.consecutive_failures(),
            backoff_remaining_ms: self
                .coordinator
                .backoff_remaining()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            dropped_malformed: self.coordinator.dropped_malformed(),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            last_pass: self.coordinator.last_report(),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
