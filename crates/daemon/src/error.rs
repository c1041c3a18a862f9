// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the possync daemon.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Errors that stop the daemon from starting or running.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse {path}: {source}\n  hint: the config file must be valid TOML")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid base URL '{0}'\n  hint: use an http:// or https:// URL with a host, e.g. https://example.firebaseio.com")]
    InvalidBaseUrl(String),

    #[error("queue store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("another possyncd is already running in {0}\n  hint: stop it first or pass a different --state-dir")]
    AlreadyRunning(PathBuf),

    #[error("could not determine a state directory\n  hint: pass --state-dir or set POSSYNC_STATE_DIR")]
    NoStateDir,
}

/// A specialized Result type for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
