// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket server.
//!
//! One request per connection: read a frame, answer with a frame, close.
//! Frames that cannot be decoded get an `error` response.

use std::sync::Arc;
use std::time::Duration;

use possync_ipc::{framing_async, Request, Response};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::Agent;

/// Read/write deadline per connection.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts connections until `cancel` fires.
pub async fn serve(listener: UnixListener, agent: Arc<Agent>, cancel: CancellationToken) {
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &agent).await {
                debug!("connection error: {}", e);
            }
        });
    }
    info!("control socket closed");
}

/// Serves a single request on `stream`.
pub(crate) async fn handle_connection(
    mut stream: UnixStream,
    agent: &Agent,
) -> std::io::Result<()> {
    let read = tokio::time::timeout(
        IO_TIMEOUT,
        framing_async::read_message::<_, Request>(&mut stream),
    )
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "request timed out"))?;

    let response = match read {
        Ok(request) => {
            debug!("request: {:?}", request);
            agent.handle_request(request)
        }
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(e),
        Err(e) => {
            warn!("failed to read request: {}", e);
            Response::error(format!("invalid request: {e}"))
        }
    };

    tokio::time::timeout(IO_TIMEOUT, framing_async::write_message(&mut stream, &response))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "response timed out"))?
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
