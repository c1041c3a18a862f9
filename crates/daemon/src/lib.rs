// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! possyncd - background position sync agent.
//!
//! Producers hand position records to the daemon over a Unix socket. The
//! daemon queues them and relays each one to a remote key-value store with
//! an idempotent `PUT`, requeueing whatever fails so nothing is lost.
//!
//! # Main Components
//!
//! - [`store`] - the queue ([`MemoryStore`](store::MemoryStore), or the
//!   durable [`JsonlStore`](store::JsonlStore))
//! - [`transport`] - the transfer client ([`HttpTransfer`](transport::HttpTransfer))
//! - [`flush`] - the single-flight [`FlushCoordinator`](flush::FlushCoordinator)
//! - [`triggers`] - what starts a pass, and the trigger loop
//! - [`agent`] / [`server`] - the control socket
//! - [`runner`] - wires everything together

pub mod agent;
pub mod backoff;
pub mod config;
pub mod connectivity;
pub mod env;
pub mod error;
pub mod flush;
pub mod lifecycle;
pub mod runner;
pub mod server;
pub mod store;
pub mod transport;
pub mod triggers;

#[cfg(test)]
mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::DaemonPaths;
