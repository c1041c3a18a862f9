// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared IPC protocol for producer-daemon communication.
//!
//! This crate defines the message types and framing protocol used on the
//! `possyncd` control socket. Messages are serialized as JSON with
//! length-prefixed framing.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use possync_core::{ControlMessage, PassReport, PlatformSignal};

// ============================================================================
// Protocol types
// ============================================================================

/// Request sent to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// A producer control message (new positions, sync now).
    Control { message: ControlMessage },
    /// A platform signal (connectivity, periodic wakeup).
    Signal { signal: PlatformSignal },
    /// Get daemon status.
    Status,
    /// Ping to check if daemon is alive.
    Ping,
    /// Graceful shutdown.
    Shutdown,
}

impl Request {
    /// Wraps a control message.
    pub fn control(message: ControlMessage) -> Self {
        Request::Control { message }
    }

    /// Wraps a platform signal.
    pub fn signal(signal: PlatformSignal) -> Self {
        Request::Signal { signal }
    }
}

/// Response sent from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Request accepted; a flush has been scheduled.
    Accepted {
        /// Records added to the queue.
        accepted: usize,
        /// Records discarded: unreadable in the request, or evicted or
        /// refused by the queue's overflow policy.
        dropped: usize,
        /// Queue length after the request.
        queue_len: usize,
    },
    /// Request understood but not addressed to this agent.
    Ignored { reason: String },
    /// Status response.
    Status(AgentStatus),
    /// Pong response.
    Pong,
    /// Shutdown acknowledged.
    ShuttingDown,
    /// Error response.
    Error { message: String },
}

impl Response {
    /// Creates an Error response.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Creates an Ignored response.
    pub fn ignored(reason: impl Into<String>) -> Self {
        Response::Ignored {
            reason: reason.into(),
        }
    }
}

/// Daemon status information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    /// Current daemon PID.
    pub pid: u32,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Records waiting for delivery.
    pub queue_len: usize,
    /// Whether the agent currently believes the network is reachable.
    pub online: bool,
    /// Number of passes that have finished.
    pub passes_completed: u64,
    /// Consecutive passes in which every attempt failed.
    pub consecutive_failures: u32,
    /// Time left before a backoff-respecting pass may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_remaining_ms: Option<u64>,
    /// Records dropped as malformed since startup.
    pub dropped_malformed: u64,
    /// Records dropped by the queue bound since startup.
    pub dropped_overflow: u64,
    /// Report of the most recent pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassReport>,
}

// ============================================================================
// Message framing
// ============================================================================

/// Maximum message size (1MB) to prevent malformed messages from causing hangs.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

fn check_len(len: usize) -> std::io::Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::other(format!(
            "message too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(())
}

fn encode<T: Serialize>(message: &T) -> std::io::Result<Vec<u8>> {
    let json = serde_json::to_vec(message)
        .map_err(|e| std::io::Error::other(format!("serialize error: {}", e)))?;
    check_len(json.len())?;
    let len = u32::try_from(json.len()).map_err(|_| std::io::Error::other("message too large"))?;

    let mut frame = Vec::with_capacity(4 + json.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

fn decode<T: serde::de::DeserializeOwned>(buf: &[u8]) -> std::io::Result<T> {
    serde_json::from_slice(buf)
        .map_err(|e| std::io::Error::other(format!("deserialize error: {}", e)))
}

/// IPC message framing over blocking streams.
///
/// Messages are framed as:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON-encoded message
pub mod framing {
    use std::io::{Read, Write};

    use serde::de::DeserializeOwned;
    use serde::Serialize;

    /// Write a serializable message to the given writer.
    pub fn write_message<W: Write, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        let frame = super::encode(message)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        super::check_len(len)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        super::decode(&buf)
    }
}

/// The same framing over tokio streams.
pub mod framing_async {
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Write a serializable message to the given writer.
    pub async fn write_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let frame = super::encode(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub async fn read_message<R, T>(reader: &mut R) -> std::io::Result<T>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        super::check_len(len)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        super::decode(&buf)
    }
}

/// Sends one request over the daemon socket and waits for its response.
pub async fn send_request(socket_path: &Path, request: &Request) -> std::io::Result<Response> {
    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    framing_async::write_message(&mut stream, request).await?;
    framing_async::read_message(&mut stream).await
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
