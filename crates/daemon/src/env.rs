// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables read by the daemon.
//!
//! Variable names are generated by `build.rs` into [`names`].

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Generated environment variable name constants.
pub mod names {
    include!(concat!(env!("OUT_DIR"), "/env_names.rs"));
}

/// Returns the value of `POSSYNC_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var(names::POSSYNC_STATE_DIR)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Returns the value of `POSSYNC_BASE_URL` if set.
pub fn base_url() -> Option<String> {
    std::env::var(names::POSSYNC_BASE_URL)
        .ok()
        .filter(|v| !v.is_empty())
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    std::env::var(names::XDG_STATE_HOME)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Builds the log filter from `RUST_LOG`, falling back to `default_level`
/// when the variable is unset or unparsable.
pub fn log_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(names::RUST_LOG).unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
