// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon files in the state directory: lock, PID, socket, log.
//!
//! A running daemon owns an exclusive `flock` on the lock file; a second
//! instance pointed at the same directory fails to start. The PID and socket
//! files are removed when the [`Instance`] guard drops.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::CONFIG_FILE_NAME;
use crate::error::{Error, Result};

/// Socket filename within the state directory.
pub const SOCKET_NAME: &str = "possyncd.sock";
/// PID filename within the state directory.
pub const PID_NAME: &str = "possyncd.pid";
/// Lock filename for single instance guarantee.
pub const LOCK_NAME: &str = "possyncd.lock";
/// Log filename within the state directory.
pub const LOG_NAME: &str = "possyncd.log";

/// Well-known paths under a state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub state_dir: PathBuf,
    pub socket: PathBuf,
    pub pid: PathBuf,
    pub lock: PathBuf,
    pub log: PathBuf,
    pub config: PathBuf,
}

impl DaemonPaths {
    pub fn new(state_dir: &Path) -> Self {
        DaemonPaths {
            state_dir: state_dir.to_path_buf(),
            socket: state_dir.join(SOCKET_NAME),
            pid: state_dir.join(PID_NAME),
            lock: state_dir.join(LOCK_NAME),
            log: state_dir.join(LOG_NAME),
            config: state_dir.join(CONFIG_FILE_NAME),
        }
    }
}

/// Acquire an exclusive lock, failing if another daemon holds it.
pub fn acquire_lock(lock_path: &Path) -> Result<File> {
    use fs2::FileExt;

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive().map_err(|_| {
        Error::AlreadyRunning(
            lock_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        )
    })?;
    Ok(file)
}

/// Write the current process ID.
pub fn write_pid_file(pid_path: &Path) -> std::io::Result<()> {
    fs::write(pid_path, std::process::id().to_string())
}

/// Read a PID file, if present and valid.
pub fn read_pid_file(pid_path: &Path) -> Option<u32> {
    fs::read_to_string(pid_path).ok()?.trim().parse().ok()
}

/// Remove a socket left behind by a daemon that did not shut down cleanly.
///
/// Only safe while holding the lock.
pub fn remove_stale_socket(socket_path: &Path) {
    if fs::remove_file(socket_path).is_ok() {
        debug!("removed stale socket {}", socket_path.display());
    }
}

/// Ownership of a state directory for the life of the daemon.
///
/// Holds the lock; dropping it removes the PID and socket files and
/// releases the lock.
#[derive(Debug)]
pub struct Instance {
    paths: DaemonPaths,
    _lock: File,
}

impl Instance {
    /// Takes the lock, writes the PID file and clears any stale socket.
    pub fn acquire(paths: &DaemonPaths) -> Result<Self> {
        fs::create_dir_all(&paths.state_dir)?;
        let lock = acquire_lock(&paths.lock).inspect_err(|_| {
            if let Some(pid) = read_pid_file(&paths.pid) {
                warn!("possyncd already running with pid {}", pid);
            }
        })?;
        let instance = Instance {
            paths: paths.clone(),
            _lock: lock,
        };
        write_pid_file(&paths.pid)?;
        remove_stale_socket(&paths.socket);
        Ok(instance)
    }

    pub fn paths(&self) -> &DaemonPaths {
        &self.paths
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.paths.pid);
        let _ = fs::remove_file(&self.paths.socket);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
