// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Position records and their remote representation.
//!
//! A record is addressed on the remote store by the triple
//! `(deviceId, date, key)`:
//!
//! ```text
//! /<collection>/<deviceId>/<date>/<key>.json   ← {"lat":…,"lon":…,"ts":…}
//! ```
//!
//! Writes replace whatever is stored at that path, so delivering the same
//! record twice leaves a single value behind.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Collection (top-level node) records are written under.
pub const DEFAULT_COLLECTION: &str = "ubicaciones";

/// A single location sample as produced by the foreground client.
///
/// Path segments are optional at this level: producers may send incomplete
/// records, which are only rejected when a delivery is built for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    #[serde(
        default,
        deserialize_with = "deserialize_segment",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_segment",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_segment",
        skip_serializing_if = "Option::is_none"
    )]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Number>,
}

/// Accepts strings and numbers as path segments; anything else is absent.
fn deserialize_segment<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl PositionRecord {
    /// Creates a record with the given path segments and no coordinates.
    pub fn new(
        device_id: impl Into<String>,
        date: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        PositionRecord {
            device_id: Some(device_id.into()),
            date: Some(date.into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Reads a record from one element of a producer batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value is not an object or a coordinate
    /// is not a number. Missing path segments are not checked here.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the coordinates.
    pub fn with_coords(mut self, lat: impl Into<Number>, lon: impl Into<Number>) -> Self {
        self.lat = Some(lat.into());
        self.lon = Some(lon.into());
        self
    }

    /// Sets the timestamp.
    pub fn with_ts(mut self, ts: impl Into<Number>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    /// Returns the remote path for this record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if `deviceId`, `date` or `key` is
    /// missing or empty.
    pub fn path(&self) -> Result<RecordPath> {
        Ok(RecordPath {
            device_id: required_segment(&self.device_id, "deviceId")?,
            date: required_segment(&self.date, "date")?,
            key: required_segment(&self.key, "key")?,
        })
    }

    /// Returns the JSON body written at the record's path.
    pub fn payload(&self) -> PositionPayload {
        PositionPayload {
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            ts: self.ts.clone(),
        }
    }

    /// Builds the upsert that delivers this record.
    pub fn to_upsert(&self) -> Result<Upsert> {
        Ok(Upsert {
            path: self.path()?,
            payload: self.payload(),
        })
    }
}

fn required_segment(segment: &Option<String>, field: &'static str) -> Result<String> {
    match segment {
        Some(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(Error::MalformedRecord { field }),
    }
}

impl fmt::Display for PositionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seg = |s: &Option<String>| s.clone().unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "{}/{}/{}",
            seg(&self.device_id),
            seg(&self.date),
            seg(&self.key)
        )
    }
}

/// Validated path segments of a record, unencoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPath {
    pub device_id: String,
    pub date: String,
    pub key: String,
}

impl RecordPath {
    /// Renders the URL path under `collection`, percent-encoding each segment.
    ///
    /// The collection is used verbatim so it may name a nested node.
    pub fn url_path(&self, collection: &str) -> String {
        format!(
            "/{}/{}/{}/{}.json",
            collection.trim_matches('/'),
            urlencoding::encode(&self.device_id),
            urlencoding::encode(&self.date),
            urlencoding::encode(&self.key)
        )
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device_id, self.date, self.key)
    }
}

/// Value stored at a record's path.
///
/// Absent fields are omitted rather than written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Number>,
}

impl PositionPayload {
    /// Serializes the payload to its JSON body.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A single "replace value at path" request.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub path: RecordPath,
    pub payload: PositionPayload,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
