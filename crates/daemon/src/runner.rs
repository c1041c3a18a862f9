// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon runner: wires the queue, transfer client and triggers together.
//!
//! The daemon:
//! 1. Acquires the instance lock and writes its PID file
//! 2. Opens the queue (durable when `queue.path` is set)
//! 3. Binds the control socket and reports readiness
//! 4. Starts the trigger loop, periodic timer and connectivity monitor
//! 5. Serves requests until shutdown, then lets the running pass settle

use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::Config;
use crate::connectivity::{Connectivity, ConnectivityMonitor, ConnectivityState};
use crate::error::Result;
use crate::flush::{FlushCoordinator, FlushOptions};
use crate::lifecycle::{DaemonPaths, Instance};
use crate::server;
use crate::store::{JsonlStore, MemoryStore, QueueStore};
use crate::transport::{HttpTransfer, Transfer};
use crate::triggers::{self, Trigger};

/// Runs the daemon until a shutdown request or a termination signal.
///
/// `ready` is called once the control socket accepts connections.
pub async fn run(config: Config, paths: DaemonPaths, ready: impl FnOnce() + Send) -> Result<()> {
    let instance = Instance::acquire(&paths)?;
    info!("possyncd starting, state_dir={}", paths.state_dir.display());

    let store = open_store(&config, &paths)?;
    let transfer: Arc<dyn Transfer> = Arc::new(HttpTransfer::new(&config.remote)?);
    let connectivity = Arc::new(ConnectivityState::default());
    let coordinator = Arc::new(FlushCoordinator::new(
        Arc::clone(&store),
        transfer,
        Arc::clone(&connectivity) as Arc<dyn Connectivity>,
        FlushOptions::from_config(&config),
    ));

    let (trigger_tx, trigger_rx) = triggers::channel();
    let shutdown = CancellationToken::new();
    let agent = Arc::new(Agent::new(
        Arc::clone(&coordinator),
        Arc::clone(&connectivity),
        trigger_tx.clone(),
        shutdown.clone(),
    ));

    let listener = UnixListener::bind(&paths.socket)?;
    info!("listening on {}", paths.socket.display());
    ready();

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(triggers::run_trigger_loop(
        Arc::clone(&coordinator),
        trigger_rx,
        shutdown.clone(),
    )));

    if let Some(interval) = config.triggers.periodic_interval() {
        tasks.push(tokio::spawn(triggers::run_periodic(
            interval,
            trigger_tx.clone(),
            shutdown.clone(),
        )));
    }

    if let Some(interval) = config.triggers.probe_interval() {
        match ConnectivityMonitor::new(
            &config.remote.base_url,
            Arc::clone(&connectivity),
            interval,
            config.triggers.probe_timeout(),
            trigger_tx.clone(),
        ) {
            Some(monitor) => tasks.push(tokio::spawn(monitor.run(shutdown.clone()))),
            None => warn!(
                "no probe target in {}, connectivity monitor disabled",
                config.remote.base_url
            ),
        }
    }

    let queued = store.len()?;
    if queued > 0 {
        info!("{} records queued from a previous run", queued);
        trigger_tx.fire(Trigger::Startup);
    }

    tasks.push(tokio::spawn(watch_signals(shutdown.clone())));

    server::serve(listener, agent, shutdown.clone()).await;

    shutdown.cancel();
    let grace = config.triggers.shutdown_grace();
    if !coordinator.settle_within(grace).await {
        warn!(
            "pass still running after {}ms, stopping anyway",
            grace.as_millis()
        );
    }
    for task in tasks {
        if let Err(e) = task.await {
            debug!("background task ended abnormally: {}", e);
        }
    }

    if let Err(e) = store.commit() {
        warn!("failed to sync queue file: {}", e);
    }
    let remaining = store.len().unwrap_or(0);
    drop(instance);
    info!("possyncd stopped, {} records queued", remaining);
    Ok(())
}

fn open_store(config: &Config, paths: &DaemonPaths) -> Result<Arc<dyn QueueStore>> {
    let limits = config.queue.limits();
    match config.queue.resolved_path(&paths.state_dir) {
        Some(path) => {
            info!("durable queue at {}", path.display());
            Ok(Arc::new(JsonlStore::open(&path, limits)?))
        }
        None => Ok(Arc::new(MemoryStore::with_limits(limits))),
    }
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot listen for SIGTERM: {}", e);
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::signal::ctrl_c() => shutdown.cancel(),
            }
            return;
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            shutdown.cancel();
        }
        _ = terminate.recv() => {
            info!("terminated, shutting down");
            shutdown.cancel();
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
