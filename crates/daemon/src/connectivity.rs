// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity tracking.
//!
//! The flush coordinator asks [`Connectivity::is_online`] before taking each
//! record. The daemon's answer comes from [`ConnectivityState`], which is
//! updated by platform signals and by an optional TCP probe against the
//! remote store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::triggers::{Trigger, TriggerSender};

/// Answers "is the network reachable right now?".
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

impl<T: Connectivity + ?Sized> Connectivity for Arc<T> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// Connectivity flag shared between the monitor, signal handlers and
/// passes.
///
/// Uses an atomic for lock-free reads from the flush loop.
#[derive(Debug)]
pub struct ConnectivityState {
    online: AtomicBool,
}

impl ConnectivityState {
    pub fn new(online: bool) -> Self {
        ConnectivityState {
            online: AtomicBool::new(online),
        }
    }

    /// Sets the flag and returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel)
    }
}

impl Default for ConnectivityState {
    /// Starts online so the first pass is attempted.
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityState {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

/// Host and port to probe for a base URL.
pub fn probe_target(base_url: &str) -> Option<(String, u16)> {
    let url = reqwest::Url::parse(base_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

/// Returns true if a TCP connection to `host:port` opens within `timeout`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Periodically probes the remote store and reports recoveries.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Arc<ConnectivityState>,
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    triggers: TriggerSender,
}

impl ConnectivityMonitor {
    /// Returns None if the base URL has no probeable host.
    pub fn new(
        base_url: &str,
        state: Arc<ConnectivityState>,
        interval: Duration,
        timeout: Duration,
        triggers: TriggerSender,
    ) -> Option<Self> {
        let (host, port) = probe_target(base_url)?;
        Some(ConnectivityMonitor {
            state,
            host,
            port,
            interval,
            timeout,
            triggers,
        })
    }

    /// Probes once and applies the result.
    ///
    /// An offline to online transition fires
    /// [`Trigger::ConnectivityRestored`].
    pub async fn check(&self) -> bool {
        let online = probe(&self.host, self.port, self.timeout).await;
        let was_online = self.state.set_online(online);

        match (was_online, online) {
            (false, true) => {
                info!("connectivity restored ({}:{})", self.host, self.port);
                self.triggers.fire(Trigger::ConnectivityRestored);
            }
            (true, false) => {
                warn!("connectivity lost ({}:{} unreachable)", self.host, self.port);
            }
            _ => debug!("probe {}:{} online={}", self.host, self.port, online),
        }
        online
    }

    /// Runs until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "probing {}:{} every {}s",
            self.host,
            self.port,
            self.interval.as_secs()
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.check() => {}
            }
        }
        debug!("connectivity monitor stopped");
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
