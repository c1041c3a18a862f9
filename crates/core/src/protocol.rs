// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Messages understood by the agent.
//!
//! There are two families:
//! - Control messages, sent by the producer that records positions
//! - Platform signals, raised by whatever schedules background work
//!   (connectivity recovery, periodic wakeups)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::record::PositionRecord;

/// Tag carried by the "connectivity resumed" signal.
pub const SYNC_TAG: &str = "sync-positions";

/// Tag carried by the periodic wakeup signal.
pub const PERIODIC_SYNC_TAG: &str = "periodic-sync-positions";

/// Messages sent from the producer to the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// New records to queue; a flush starts right away.
    ///
    /// Elements are kept as raw JSON so one unreadable element does not
    /// cost the rest of the batch. See [`decode_positions`].
    NewPositions {
        /// Records in production order.
        positions: Vec<Value>,
    },

    /// Flush whatever is queued without adding anything.
    SyncNow,

    /// Any other message type. Ignored.
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Creates a NewPositions message.
    pub fn new_positions(positions: Vec<PositionRecord>) -> Self {
        ControlMessage::NewPositions {
            positions: positions
                .iter()
                .filter_map(|record| serde_json::to_value(record).ok())
                .collect(),
        }
    }

    /// Creates a SyncNow message.
    pub fn sync_now() -> Self {
        ControlMessage::SyncNow
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Records read from a NewPositions batch.
#[derive(Debug, Default)]
pub struct DecodedPositions {
    /// Readable records in batch order.
    pub records: Vec<PositionRecord>,
    /// Batch index and cause for each element that is not a record.
    pub rejected: Vec<(usize, Error)>,
}

/// Reads each element of a NewPositions batch on its own.
///
/// Elements that are not objects, or whose coordinates are not numbers,
/// land in `rejected`; the others are returned in order.
pub fn decode_positions(positions: Vec<Value>) -> DecodedPositions {
    let mut decoded = DecodedPositions::default();
    for (index, value) in positions.into_iter().enumerate() {
        match PositionRecord::from_value(value) {
            Ok(record) => decoded.records.push(record),
            Err(e) => decoded.rejected.push((index, e)),
        }
    }
    decoded
}

/// Signals raised by the hosting platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlatformSignal {
    /// A background sync opportunity, typically connectivity coming back.
    Sync { tag: String },

    /// A periodic wakeup.
    PeriodicSync { tag: String },

    /// The network went away.
    Offline,
}

impl PlatformSignal {
    /// Creates the connectivity-resumed signal for position sync.
    pub fn sync() -> Self {
        PlatformSignal::Sync {
            tag: SYNC_TAG.to_string(),
        }
    }

    /// Creates the periodic signal for position sync.
    pub fn periodic_sync() -> Self {
        PlatformSignal::PeriodicSync {
            tag: PERIODIC_SYNC_TAG.to_string(),
        }
    }

    /// Returns true if the signal is addressed to position sync.
    ///
    /// Signals registered under other tags belong to someone else.
    pub fn is_for_positions(&self) -> bool {
        match self {
            PlatformSignal::Sync { tag } => tag == SYNC_TAG,
            PlatformSignal::PeriodicSync { tag } => tag == PERIODIC_SYNC_TAG,
            PlatformSignal::Offline => true,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
