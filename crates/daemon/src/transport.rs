// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer abstraction for delivering records to the remote store.
//!
//! Provides a trait-based transfer layer that enables:
//! - Real HTTP PUTs for production
//! - Mock transfers for unit testing

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use possync_core::Upsert;
use reqwest::Client;
use tracing::trace;

use crate::config::RemoteConfig;

/// Error type for transfer operations.
///
/// Every variant is transient: the record is requeued and retried later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The store answered with a non-success status.
    #[error("remote store returned HTTP {0}")]
    Status(u16),

    /// The request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,
}

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Writes a single value at a path on the remote store.
///
/// Implementations must be idempotent: writing the same upsert twice leaves
/// the same state as writing it once.
pub trait Transfer: Send + Sync {
    /// Replaces the value at `upsert.path` with `upsert.payload`.
    fn put<'a>(
        &'a self,
        upsert: &'a Upsert,
    ) -> Pin<Box<dyn Future<Output = TransferResult<()>> + Send + 'a>>;
}

impl<T: Transfer + ?Sized> Transfer for Arc<T> {
    fn put<'a>(
        &'a self,
        upsert: &'a Upsert,
    ) -> Pin<Box<dyn Future<Output = TransferResult<()>> + Send + 'a>> {
        (**self).put(upsert)
    }
}

/// Transfer over the store's REST interface.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpTransfer {
    /// Create a transfer client for the configured remote.
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(HttpTransfer {
            client,
            base_url: config.base_url.clone(),
            collection: config.collection.clone(),
        })
    }

    /// Full URL an upsert is written to.
    pub fn url_for(&self, upsert: &Upsert) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            upsert.path.url_path(&self.collection)
        )
    }
}

fn classify(err: reqwest::Error) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout
    } else {
        TransferError::Network(err.to_string())
    }
}

impl Transfer for HttpTransfer {
    fn put<'a>(
        &'a self,
        upsert: &'a Upsert,
    ) -> Pin<Box<dyn Future<Output = TransferResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url_for(upsert);
            trace!("PUT {}", url);

            let response = self
                .client
                .put(&url)
                .json(&upsert.payload)
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransferError::Status(status.as_u16()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
