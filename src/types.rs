//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Types used across requests and results: row values, consistency,
//! consumed capacity, table states and limits, and the opaque continuation
//! token used by multi-page operations.
use crate::error::CoralErrorCode::BadProtocolMessage;
use crate::error::{ia_err, CoralError};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// A single field value of a row.
///
/// Row data in this SDK is represented as plain JSON values; the driver
/// performs no column-type marshalling of its own. Use
/// [`serde_json::json!`] to construct keys and row values.
pub type FieldValue = Value;

/// A full row, or a (possibly partial) primary key: a JSON object mapping
/// column names to values.
pub type MapValue = serde_json::Map<String, Value>;

/// Consistency is used to provide consistency guarantees for read operations.
///
/// There are two consistency values available: Eventual and Absolute.
///
/// 1. Eventual consistency means that the values read may be very slightly
/// out of date.
///
/// 2. Absolute consistency may be specified to guarantee that current values
/// are read.
///
/// Absolute consistency results in higher cost, consuming twice the number of
/// read units for the same data relative to Eventual consistency, and should
/// only be used when required.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Consistency {
    // Absolute consistency.
    Absolute = 1,
    // Eventual consistency.
    #[default]
    Eventual = 2,
}

impl Consistency {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Consistency::Absolute => "ABSOLUTE",
            Consistency::Eventual => "EVENTUAL",
        }
    }
}

// Capacity represents the read/write throughput consumed by an operation.
#[derive(Clone, Copy, Default, Debug)]
pub struct Capacity {
    // read_kb represents the number of kilobytes consumed for reads.
    pub read_kb: i32,

    // write_kb represents the number of kilobytes consumed for writes.
    pub write_kb: i32,

    // read_units represents the number of read units consumed for reads.
    //
    // A read unit represents 1 eventually consistent read per second for data
    // up to 1 KB in size. A read that is absolutely consistent is double that,
    // consuming 2 read units for a read of up to 1 KB in size.
    pub read_units: i32,

    // write_units represents the number of write units consumed for writes.
    pub write_units: i32,

    // read_rate_limited_ms is the time, in milliseconds, that the operation
    // was delayed by the read rate limiter before dispatch. Zero if rate
    // limiting is disabled or no delay was needed.
    pub read_rate_limited_ms: i64,

    // write_rate_limited_ms is the time, in milliseconds, that the operation
    // was delayed by the write rate limiter before dispatch.
    pub write_rate_limited_ms: i64,
}

impl Capacity {
    pub(crate) fn add(&mut self, c: &Capacity) {
        self.read_kb += c.read_kb;
        self.read_units += c.read_units;
        self.write_kb += c.write_kb;
        self.write_units += c.write_units;
        self.read_rate_limited_ms += c.read_rate_limited_ms;
        self.write_rate_limited_ms += c.write_rate_limited_ms;
    }

    pub(crate) fn from_json(v: &Value) -> Capacity {
        let mut c = Capacity::default();
        if let Some(m) = v.as_object() {
            c.read_kb = m.get("read_kb").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            c.write_kb = m.get("write_kb").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            c.read_units = m.get("read_units").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            c.write_units = m.get("write_units").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        }
        c
    }
}

#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum TableState {
    // The table is ready to be used. This is the steady state after
    // creation or modification.
    #[default]
    Active = 0,
    // The table is being created and cannot yet be used
    Creating = 1,
    // The table has been dropped or does not exist
    Dropped = 2,
    // The table is being dropped and cannot be used
    Dropping = 3,
    // The table is being updated. It is available for normal use, but
    // additional table modification operations are not permitted
    // while the table is in this state.
    Updating = 4,
}

impl TableState {
    pub fn from_int(icode: i32) -> Result<TableState, CoralError> {
        match icode {
            0 => Ok(TableState::Active),
            1 => Ok(TableState::Creating),
            2 => Ok(TableState::Dropped),
            3 => Ok(TableState::Dropping),
            4 => Ok(TableState::Updating),
            _ => Err(CoralError::new(
                BadProtocolMessage,
                format!("Invalid TableState {} in result response", icode).as_str(),
            )),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum OperationState {
    // The admin operation has finished.
    #[default]
    Complete = 0,
    // The admin operation is still executing in the system.
    Working = 1,
}

impl OperationState {
    pub fn from_int(icode: i32) -> Result<OperationState, CoralError> {
        match icode {
            0 => Ok(OperationState::Complete),
            1 => Ok(OperationState::Working),
            _ => Err(CoralError::new(
                BadProtocolMessage,
                "Invalid OperationState in result response",
            )),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
pub enum CapacityMode {
    // Provisioned
    #[default]
    Provisioned = 1,
    // On-demand
    OnDemand = 2,
}

/// Throughput and storage limits for a table.
///
/// Used when creating or altering a table, and reported back by
/// [`GetTableRequest`](crate::GetTableRequest). The read and write unit
/// values also seed the per-table rate limiter when rate limiting is
/// enabled on the handle.
#[derive(Default, Debug, Clone)]
pub struct TableLimits {
    pub read_units: i32,
    pub write_units: i32,
    pub storage_gb: i32,
    pub mode: CapacityMode,
}

impl TableLimits {
    // Create a new TableLimits with Provisioned values
    pub fn provisioned(read_units: i32, write_units: i32, storage_gb: i32) -> TableLimits {
        TableLimits {
            read_units,
            write_units,
            storage_gb,
            mode: CapacityMode::Provisioned,
        }
    }

    // create a new TableLimits with on-demand values
    pub fn on_demand(storage_gb: i32) -> TableLimits {
        TableLimits {
            read_units: 0,
            write_units: 0,
            storage_gb,
            mode: CapacityMode::OnDemand,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        let mut m = serde_json::Map::new();
        m.insert("read_units".to_string(), Value::from(self.read_units));
        m.insert("write_units".to_string(), Value::from(self.write_units));
        m.insert("storage_gb".to_string(), Value::from(self.storage_gb));
        let mode = {
            if self.mode == CapacityMode::OnDemand {
                "ON_DEMAND"
            } else {
                "PROVISIONED"
            }
        };
        m.insert("mode".to_string(), Value::from(mode));
        Value::Object(m)
    }

    pub(crate) fn from_json(v: &Value) -> Option<TableLimits> {
        let m = v.as_object()?;
        let mode = {
            if m.get("mode").and_then(|v| v.as_str()) == Some("ON_DEMAND") {
                CapacityMode::OnDemand
            } else {
                CapacityMode::Provisioned
            }
        };
        Some(TableLimits {
            read_units: m.get("read_units").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            write_units: m.get("write_units").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            storage_gb: m.get("storage_gb").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            mode,
        })
    }
}

/// An opaque marker allowing a multi-page operation (query or range delete)
/// to resume where the previous fetch left off.
///
/// Tokens are issued by the server and have value equality only; the driver
/// never interprets their contents. A token returned by one fetch must only
/// be supplied to a continuation of the *same* logical operation (same query
/// statement and bind values, or same range-delete key and field range) -
/// supplying it elsewhere is a user error with undefined results.
///
/// Note that a returned token does not guarantee that more rows remain: the
/// next fetch may legitimately return zero rows and no token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ContinuationToken {
    pub(crate) bytes: Bytes,
}

impl ContinuationToken {
    pub(crate) fn from_base64(s: &str) -> Result<ContinuationToken, CoralError> {
        match BASE64_STANDARD.decode(s) {
            Ok(b) => Ok(ContinuationToken {
                bytes: Bytes::from(b),
            }),
            Err(e) => Err(CoralError::new(
                BadProtocolMessage,
                &format!("invalid continuation token in response: {}", e),
            )),
        }
    }

    pub(crate) fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ContinuationToken({})", self.to_base64())
    }
}

pub(crate) fn string_to_rfc3339(s: &str) -> Result<DateTime<FixedOffset>, CoralError> {
    // try as-is
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    // if that didn't work, try adding a "Z" to the end
    let mut ds = std::string::String::from(s);
    ds.push('Z');
    match DateTime::parse_from_rfc3339(&ds) {
        Ok(dt) => Ok(dt),
        Err(_) => {
            ia_err!("error parsing string '{}' into RFC3339 timestamp", s)
        }
    }
}
