// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use possync_core::{ControlMessage, PlatformSignal};
use possync_ipc::{send_request, AgentStatus, Request, Response};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::oneshot;

use super::*;
use crate::error::Error;
use crate::test_helpers::{eventually, position, FakeStore};

fn config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.set_base_url(base_url).unwrap();
    config.triggers.periodic_interval_secs = 0;
    config.triggers.probe_interval_secs = 0;
    config.triggers.shutdown_grace_ms = 2_000;
    config
}

/// Starts the daemon and waits for it to report readiness.
async fn start(config: Config, state_dir: &Path) -> (DaemonPaths, JoinHandle<Result<()>>) {
    let paths = DaemonPaths::new(state_dir);
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(run(config, paths.clone(), move || {
        let _ = tx.send(());
    }));
    rx.await.unwrap();
    (paths, handle)
}

async fn status(socket: &Path) -> AgentStatus {
    match send_request(socket, &Request::Status).await.unwrap() {
        Response::Status(status) => status,
        other => panic!("unexpected response: {other:?}"),
    }
}

/// Polls status until `condition` holds or two seconds pass.
async fn wait_for_status(socket: &Path, condition: impl Fn(&AgentStatus) -> bool) -> AgentStatus {
    for _ in 0..200 {
        let current = status(socket).await;
        if condition(&current) {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("status condition not met in time");
}

async fn stop(paths: &DaemonPaths, handle: JoinHandle<Result<()>>) {
    let response = send_request(&paths.socket, &Request::Shutdown).await.unwrap();
    assert_eq!(response, Response::ShuttingDown);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn delivers_positions_and_stops_cleanly() {
    let remote = FakeStore::start().await;
    let temp = TempDir::new().unwrap();
    let (paths, handle) = start(config(&remote.base_url()), temp.path()).await;

    assert!(paths.pid.exists());
    assert!(paths.socket.exists());

    let request = Request::control(ControlMessage::new_positions(vec![position("k1")]));
    let response = send_request(&paths.socket, &request).await.unwrap();
    assert!(matches!(response, Response::Accepted { accepted: 1, .. }));

    eventually(|| remote.len() == 1).await;
    assert_eq!(
        remote.value("/ubicaciones/d1/2024-01-01/k1.json"),
        Some(json!({"lat": 1, "lon": 2, "ts": 100}))
    );
    let status =
        wait_for_status(&paths.socket, |s| s.queue_len == 0 && s.passes_completed >= 1).await;
    assert!(status.online);

    stop(&paths, handle).await;
    assert!(!paths.pid.exists());
    assert!(!paths.socket.exists());
}

#[tokio::test]
async fn second_instance_is_rejected() {
    let temp = TempDir::new().unwrap();
    let paths = DaemonPaths::new(temp.path());
    let _first = Instance::acquire(&paths).unwrap();

    let readied = AtomicBool::new(false);
    let result = run(config("http://127.0.0.1:9"), paths.clone(), || {
        readied.store(true, Ordering::SeqCst);
    })
    .await;

    assert!(matches!(result, Err(Error::AlreadyRunning(_))));
    assert!(!readied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn durable_queue_is_flushed_after_restart() {
    let remote = FakeStore::start().await;
    remote.set_failing(true);
    let temp = TempDir::new().unwrap();
    let mut config = config(&remote.base_url());
    config.queue.path = Some(PathBuf::from("queue.jsonl"));

    let (paths, handle) = start(config.clone(), temp.path()).await;
    let request = Request::control(ControlMessage::new_positions(vec![position("k1")]));
    send_request(&paths.socket, &request).await.unwrap();
    let status = wait_for_status(&paths.socket, |s| s.passes_completed >= 1).await;
    assert_eq!(status.queue_len, 1);
    assert_eq!(status.consecutive_failures, 1);
    stop(&paths, handle).await;
    assert!(temp.path().join("queue.jsonl").exists());

    remote.set_failing(false);
    let (paths, handle) = start(config, temp.path()).await;
    eventually(|| remote.len() == 1).await;

    let status =
        wait_for_status(&paths.socket, |s| s.queue_len == 0 && s.last_pass.is_some()).await;
    assert_eq!(status.last_pass.unwrap().trigger, "startup");
    stop(&paths, handle).await;
}

#[tokio::test]
async fn offline_signal_holds_records_until_sync_signal() {
    let remote = FakeStore::start().await;
    let temp = TempDir::new().unwrap();
    let (paths, handle) = start(config(&remote.base_url()), temp.path()).await;

    send_request(&paths.socket, &Request::signal(PlatformSignal::Offline))
        .await
        .unwrap();
    let request = Request::control(ControlMessage::new_positions(vec![position("k1")]));
    send_request(&paths.socket, &request).await.unwrap();
    let status = wait_for_status(&paths.socket, |s| s.passes_completed >= 1).await;
    assert!(!status.online);
    assert_eq!(status.queue_len, 1);
    assert_eq!(remote.len(), 0);

    send_request(&paths.socket, &Request::signal(PlatformSignal::sync()))
        .await
        .unwrap();
    eventually(|| remote.len() == 1).await;

    stop(&paths, handle).await;
}
