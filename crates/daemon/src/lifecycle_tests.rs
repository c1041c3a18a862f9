// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;

#[test]
fn paths_live_in_state_dir() {
    let paths = DaemonPaths::new(Path::new("/state"));
    assert_eq!(paths.socket, PathBuf::from("/state/possyncd.sock"));
    assert_eq!(paths.pid, PathBuf::from("/state/possyncd.pid"));
    assert_eq!(paths.lock, PathBuf::from("/state/possyncd.lock"));
    assert_eq!(paths.log, PathBuf::from("/state/possyncd.log"));
    assert_eq!(paths.config, PathBuf::from("/state/config.toml"));
}

#[test]
fn second_lock_fails() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join(LOCK_NAME);

    let _first = acquire_lock(&lock_path).unwrap();
    let second = acquire_lock(&lock_path);
    assert!(matches!(second, Err(Error::AlreadyRunning(_))));
}

#[test]
fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join(LOCK_NAME);

    drop(acquire_lock(&lock_path).unwrap());
    assert!(acquire_lock(&lock_path).is_ok());
}

#[test]
fn pid_file_roundtrip() {
    let temp = TempDir::new().unwrap();
    let pid_path = temp.path().join(PID_NAME);

    write_pid_file(&pid_path).unwrap();
    assert_eq!(read_pid_file(&pid_path), Some(std::process::id()));
}

#[test]
fn read_pid_file_rejects_garbage() {
    let temp = TempDir::new().unwrap();
    let pid_path = temp.path().join(PID_NAME);

    assert_eq!(read_pid_file(&pid_path), None);
    std::fs::write(&pid_path, "not a pid").unwrap();
    assert_eq!(read_pid_file(&pid_path), None);
}

#[test]
fn instance_creates_and_cleans_up_files() {
    let temp = TempDir::new().unwrap();
    let paths = DaemonPaths::new(&temp.path().join("nested/state"));

    let instance = Instance::acquire(&paths).unwrap();
    assert!(paths.pid.exists());
    assert_eq!(instance.paths(), &paths);

    // Stand-in for the bound socket.
    std::fs::write(&paths.socket, "").unwrap();
    drop(instance);

    assert!(!paths.pid.exists());
    assert!(!paths.socket.exists());
}

#[test]
fn instance_removes_stale_socket() {
    let temp = TempDir::new().unwrap();
    let paths = DaemonPaths::new(temp.path());
    std::fs::write(&paths.socket, "").unwrap();

    let _instance = Instance::acquire(&paths).unwrap();
    assert!(!paths.socket.exists());
}

#[test]
fn second_instance_is_refused() {
    let temp = TempDir::new().unwrap();
    let paths = DaemonPaths::new(temp.path());

    let _first = Instance::acquire(&paths).unwrap();
    let second = Instance::acquire(&paths);
    assert!(matches!(second, Err(Error::AlreadyRunning(_))));
    // The refused instance must not touch the running one's files.
    assert!(paths.pid.exists());
}
