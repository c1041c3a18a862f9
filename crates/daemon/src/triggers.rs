// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger surface: everything that can start a flush pass.
//!
//! ```text
//!  NEW_POSITIONS ──┐
//!  SYNC_NOW ───────┤
//!  sync signal ────┤   mpsc    ┌──────────────┐
//!  probe recovery ─┼─────────► │ trigger loop │ ──► FlushCoordinator::flush
//!  periodic tick ──┤           └──────────────┘
//!  startup ────────┘
//! ```
//!
//! Sources never run passes themselves; they post a [`Trigger`] and return.
//! When the channel is full the trigger is merged into an overflow slot
//! that the next received trigger absorbs, so a backoff bypass is never
//! lost to a burst of routine triggers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use possync_core::PlatformSignal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connectivity::ConnectivityState;
use crate::flush::FlushCoordinator;

/// Pending triggers beyond this are merged into the next one received.
pub const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Why a flush pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Records were just enqueued.
    Enqueue,
    /// A producer asked for an immediate flush.
    SyncNow,
    /// The network came back.
    ConnectivityRestored,
    /// Periodic wakeup.
    Periodic,
    /// The daemon started with records already queued.
    Startup,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Enqueue => "enqueue",
            Trigger::SyncNow => "sync-now",
            Trigger::ConnectivityRestored => "connectivity-restored",
            Trigger::Periodic => "periodic",
            Trigger::Startup => "startup",
        }
    }

    /// Whether a pass started by this trigger ignores retry backoff.
    ///
    /// Only routine triggers (enqueue, periodic) wait out the backoff.
    pub fn bypasses_backoff(&self) -> bool {
        matches!(
            self,
            Trigger::SyncNow | Trigger::ConnectivityRestored | Trigger::Startup
        )
    }

    /// Combines two triggers coalesced into one pass.
    pub fn merge(self, other: Trigger) -> Trigger {
        if other.bypasses_backoff() && !self.bypasses_backoff() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the agent should do about a platform signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Run a pass.
    Flush(Trigger),
    /// Record that the network is gone.
    MarkOffline,
    /// The signal was registered for something else.
    Ignore,
}

/// Maps a platform signal to an action.
pub fn signal_action(signal: &PlatformSignal) -> SignalAction {
    if !signal.is_for_positions() {
        return SignalAction::Ignore;
    }
    match signal {
        PlatformSignal::Sync { .. } => SignalAction::Flush(Trigger::ConnectivityRestored),
        PlatformSignal::PeriodicSync { .. } => SignalAction::Flush(Trigger::Periodic),
        PlatformSignal::Offline => SignalAction::MarkOffline,
    }
}

/// Applies a signal's side effects on connectivity.
///
/// A sync signal means the platform saw the network come back, so the agent
/// stops treating itself as offline before the pass starts.
pub fn apply_signal(signal: &PlatformSignal, connectivity: &ConnectivityState) -> SignalAction {
    let action = signal_action(signal);
    match action {
        SignalAction::Flush(Trigger::ConnectivityRestored) => {
            connectivity.set_online(true);
        }
        SignalAction::MarkOffline => {
            connectivity.set_online(false);
        }
        _ => {}
    }
    action
}

/// Trigger that found the channel full, merged with any before it.
type Overflow = Arc<Mutex<Option<Trigger>>>;

fn lock_overflow(overflow: &Overflow) -> MutexGuard<'_, Option<Trigger>> {
    overflow.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sending half of the trigger channel.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<Trigger>,
    overflow: Overflow,
}

impl TriggerSender {
    /// Posts a trigger without waiting.
    ///
    /// Returns false only if the trigger loop has stopped. On a full channel
    /// the trigger rides along with the next one received.
    pub fn fire(&self, trigger: Trigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let mut slot = lock_overflow(&self.overflow);
                *slot = Some(slot.map_or(trigger, |pending| pending.merge(trigger)));
                drop(slot);
                debug!("trigger {} merged into pending passes", trigger);
                // Sending again after the slot is set guarantees some trigger
                // is received afterwards and picks it up.
                !matches!(
                    self.tx.try_send(trigger),
                    Err(mpsc::error::TrySendError::Closed(_))
                )
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Receiving half of the trigger channel.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<Trigger>,
    overflow: Overflow,
}

impl TriggerReceiver {
    /// Receives the next trigger, merged with any overflowed ones.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<Trigger> {
        let trigger = self.rx.recv().await?;
        Some(self.absorb(trigger))
    }

    pub fn try_recv(&mut self) -> Result<Trigger, mpsc::error::TryRecvError> {
        let trigger = self.rx.try_recv()?;
        Ok(self.absorb(trigger))
    }

    fn absorb(&self, trigger: Trigger) -> Trigger {
        match lock_overflow(&self.overflow).take() {
            Some(pending) => trigger.merge(pending),
            None => trigger,
        }
    }
}

/// Creates the trigger channel.
pub fn channel() -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
    let overflow = Overflow::default();
    (
        TriggerSender {
            tx,
            overflow: Arc::clone(&overflow),
        },
        TriggerReceiver { rx, overflow },
    )
}

/// Starts a pass for every trigger until cancelled or all senders are gone.
pub async fn run_trigger_loop(
    coordinator: Arc<FlushCoordinator>,
    mut rx: TriggerReceiver,
    cancel: CancellationToken,
) {
    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => break,
            trigger = rx.recv() => match trigger {
                Some(t) => t,
                None => break,
            },
        };

        debug!("trigger received: {}", trigger);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator.flush(trigger).await;
        });
    }
    debug!("trigger loop stopped");
}

/// Fires [`Trigger::Periodic`] every `interval` until cancelled.
pub async fn run_periodic(interval: Duration, triggers: TriggerSender, cancel: CancellationToken) {
    info!("periodic sync every {}s", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !triggers.fire(Trigger::Periodic) {
                    break;
                }
            }
        }
    }
    debug!("periodic timer stopped");
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
