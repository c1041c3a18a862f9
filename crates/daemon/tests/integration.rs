// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the possyncd binary.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::put;
use axum::{Json, Router};
use possync_core::{ControlMessage, PositionRecord};
use possync_ipc::{send_request, Request, Response};
use serde_json::{json, Value};

type Values = Arc<Mutex<HashMap<String, Value>>>;

/// Minimal key-value store accepting PUTs at any path.
async fn spawn_remote() -> (String, Values) {
    async fn handle_put(
        State(values): State<Values>,
        uri: Uri,
        Json(body): Json<Value>,
    ) -> StatusCode {
        values.lock().unwrap().insert(uri.path().to_string(), body);
        StatusCode::OK
    }

    let values = Values::default();
    let app = Router::new()
        .route("/{*path}", put(handle_put))
        .with_state(Arc::clone(&values));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), values)
}

/// Helper to spawn the daemon and clean it up on drop.
struct DaemonProcess {
    child: Child,
    socket: PathBuf,
    temp_dir: tempfile::TempDir,
}

impl DaemonProcess {
    /// Spawns the daemon and blocks until it prints READY.
    fn spawn(base_url: &str) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            temp_dir.path().join("config.toml"),
            "[triggers]\nperiodic_interval_secs = 0\nprobe_interval_secs = 0\n",
        )
        .expect("write config");

        let mut child = Command::new(env!("CARGO_BIN_EXE_possyncd"))
            .arg("--state-dir")
            .arg(temp_dir.path())
            .arg("--base-url")
            .arg(base_url)
            .arg("--log-stderr")
            .env_remove("POSSYNC_BASE_URL")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon process");

        let stdout = child.stdout.take().expect("daemon stdout");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("read daemon stdout");
        assert_eq!(line.trim(), "READY", "daemon did not report readiness");

        DaemonProcess {
            child,
            socket: temp_dir.path().join("possyncd.sock"),
            temp_dir,
        }
    }

    fn state_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test(flavor = "multi_thread")]
async fn relays_positions_and_shuts_down() {
    let (base_url, values) = spawn_remote().await;
    let mut daemon = DaemonProcess::spawn(&base_url);

    assert_eq!(
        send_request(&daemon.socket, &Request::Ping).await.unwrap(),
        Response::Pong
    );

    let positions = vec![
        PositionRecord::new("d1", "2024-01-01", "k1")
            .with_coords(1, 2)
            .with_ts(100),
        PositionRecord::new("d1", "2024-01-01", "k2")
            .with_coords(3, 4)
            .with_ts(101),
    ];
    let response = send_request(
        &daemon.socket,
        &Request::control(ControlMessage::new_positions(positions)),
    )
    .await
    .unwrap();
    assert!(
        matches!(response, Response::Accepted { accepted: 2, .. }),
        "unexpected response: {response:?}"
    );

    wait_until(|| values.lock().unwrap().len() == 2).await;
    assert_eq!(
        values
            .lock()
            .unwrap()
            .get("/ubicaciones/d1/2024-01-01/k1.json"),
        Some(&json!({"lat": 1, "lon": 2, "ts": 100}))
    );

    match send_request(&daemon.socket, &Request::Status).await.unwrap() {
        Response::Status(status) => {
            assert_eq!(status.pid, daemon.child.id());
            assert_eq!(status.queue_len, 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let response = send_request(&daemon.socket, &Request::Shutdown).await.unwrap();
    assert_eq!(response, Response::ShuttingDown);

    let mut exited = None;
    for _ in 0..100 {
        if let Some(status) = daemon.child.try_wait().unwrap() {
            exited = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let status = exited.expect("daemon should exit after shutdown");
    assert!(status.success());
    assert!(!daemon.state_dir().join("possyncd.pid").exists());
    assert!(!daemon.socket.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_base_url_fails_to_start() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_possyncd"))
        .arg("--state-dir")
        .arg(temp_dir.path())
        .arg("--base-url")
        .arg("ftp://example.com")
        .arg("--log-stderr")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid base URL"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("READY"));
}
