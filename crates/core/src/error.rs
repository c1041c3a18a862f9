// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for possync-core operations.

use thiserror::Error;

/// All possible errors that can occur in possync-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed record: missing or empty '{field}'\n  hint: deviceId, date and key are required path segments")]
    MalformedRecord { field: &'static str },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for possync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
