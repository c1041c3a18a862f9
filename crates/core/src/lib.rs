// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! possync-core: Shared library for the possync agent.
//!
//! This crate provides the position record model, the remote path and payload
//! construction, and the control messages exchanged between producers and the
//! `possyncd` daemon.

pub mod error;
pub mod protocol;
pub mod record;
pub mod report;

pub use error::{Error, Result};
pub use protocol::{
    decode_positions, ControlMessage, DecodedPositions, PlatformSignal, PERIODIC_SYNC_TAG,
    SYNC_TAG,
};
pub use record::{PositionPayload, PositionRecord, RecordPath, Upsert, DEFAULT_COLLECTION};
pub use report::PassReport;
