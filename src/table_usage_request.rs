//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::types::string_to_rfc3339;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used to get dynamic usage information about a table in CoralDB.
///
/// Usage is reported as a sequence of per-period records covering the
/// requested time window. Long windows paginate by index: set
/// [`limit()`](TableUsageRequest::limit()) and pass
/// [`TableUsageResult::last_index_returned()`] `+ 1` as the next request's
/// [`start_index()`](TableUsageRequest::start_index()).
#[derive(Default, Debug)]
pub struct TableUsageRequest {
    pub(crate) table_name: String,
    pub(crate) start_time: Option<DateTime<FixedOffset>>,
    pub(crate) end_time: Option<DateTime<FixedOffset>>,
    pub(crate) limit: i32,
    pub(crate) start_index: i32,
    pub(crate) timeout: Option<Duration>,
}

/// One per-period usage record of a table.
#[derive(Default, Debug)]
pub struct TableUsage {
    /// The start of the period this record covers.
    pub start_time: Option<DateTime<FixedOffset>>,
    /// The number of seconds in the period.
    pub seconds_in_period: i32,
    /// Read units consumed during the period.
    pub read_units: i32,
    /// Write units consumed during the period.
    pub write_units: i32,
    /// Storage in use, in gigabytes.
    pub storage_gb: i32,
    /// Number of read throttling errors during the period.
    pub read_throttle_count: i32,
    /// Number of write throttling errors during the period.
    pub write_throttle_count: i32,
    /// Peak usage of any single shard, as a percentage of its share of the
    /// table's throughput.
    pub max_shard_usage_percent: i32,
}

/// Struct representing the result of a [`TableUsageRequest`] operation.
#[derive(Default, Debug)]
pub struct TableUsageResult {
    pub(crate) table_name: String,
    pub(crate) usage_records: Vec<TableUsage>,
    pub(crate) last_index_returned: i32,
}

impl TableUsageResult {
    /// Get the table name.
    pub fn table_name(&self) -> String {
        self.table_name.clone()
    }
    /// Get the usage records, in time order.
    pub fn usage_records(&self) -> &Vec<TableUsage> {
        &self.usage_records
    }
    /// Take the usage records, giving ownership to the caller.
    pub fn take_usage_records(&mut self) -> Vec<TableUsage> {
        std::mem::take(&mut self.usage_records)
    }
    /// Get the index of the last usage record returned, relative to the
    /// full window. Used for pagination.
    pub fn last_index_returned(&self) -> i32 {
        self.last_index_returned
    }
}

impl TableUsageRequest {
    /// Create a new TableUsageRequest.
    ///
    /// `table_name` is required and must be non-empty.
    pub fn new(table_name: &str) -> TableUsageRequest {
        TableUsageRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the start of the time window to report usage for.
    pub fn start_time(mut self, t: DateTime<FixedOffset>) -> TableUsageRequest {
        self.start_time = Some(t);
        self
    }

    /// Specify the start of the time window as an RFC3339 string.
    pub fn start_time_str(mut self, t: &str) -> Result<TableUsageRequest, CoralError> {
        self.start_time = Some(string_to_rfc3339(t)?);
        Ok(self)
    }

    /// Specify the end of the time window to report usage for.
    pub fn end_time(mut self, t: DateTime<FixedOffset>) -> TableUsageRequest {
        self.end_time = Some(t);
        self
    }

    /// Specify the end of the time window as an RFC3339 string.
    pub fn end_time_str(mut self, t: &str) -> Result<TableUsageRequest, CoralError> {
        self.end_time = Some(string_to_rfc3339(t)?);
        Ok(self)
    }

    /// Specify the maximum number of usage records to return in one call.
    /// Zero means no application-defined limit.
    pub fn limit(mut self, limit: i32) -> TableUsageRequest {
        self.limit = limit;
        self
    }

    /// Specify the record index to start at within the window, typically
    /// one past a previous [`TableUsageResult::last_index_returned()`].
    pub fn start_index(mut self, start_index: i32) -> TableUsageRequest {
        self.start_index = start_index;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> TableUsageRequest {
        self.timeout = Some(*t);
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<TableUsageResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        if let (Some(s), Some(e)) = (&self.start_time, &self.end_time) {
            if e < s {
                return ia_err!("usage window end time must not precede start time");
            }
        }
        let mut payload: Map<String, Value> = Map::new();
        if let Some(s) = &self.start_time {
            payload.insert("start_time".to_string(), Value::from(s.to_rfc3339()));
        }
        if let Some(e) = &self.end_time {
            payload.insert("end_time".to_string(), Value::from(e.to_rfc3339()));
        }
        if self.limit > 0 {
            payload.insert("limit".to_string(), Value::from(self.limit));
        }
        if self.start_index > 0 {
            payload.insert("start_index".to_string(), Value::from(self.start_index));
        }
        let op = Operation::new(
            OpCode::GetTableUsage,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                ..Default::default()
            },
        );
        let mut resp = h.execute_op(op).await?;
        let mut res = TableUsageResult {
            table_name: resp
                .string_field("table_name")
                .unwrap_or(self.table_name.clone()),
            last_index_returned: resp.i32_field("last_index_returned").unwrap_or(0),
            ..Default::default()
        };
        if let Some(Value::Array(items)) = resp.take_field("usage_records") {
            res.usage_records.reserve(items.len());
            for item in &items {
                res.usage_records.push(TableUsageRequest::read_usage(item)?);
            }
        }
        Ok(res)
    }

    fn read_usage(v: &Value) -> Result<TableUsage, CoralError> {
        let mut usage = TableUsage::default();
        let m = match v.as_object() {
            Some(m) => m,
            None => return Ok(usage),
        };
        if let Some(s) = m.get("start_time").and_then(|v| v.as_str()) {
            usage.start_time = Some(string_to_rfc3339(s)?);
        }
        let geti = |name: &str| m.get(name).and_then(|v| v.as_i64()).unwrap_or(0) as i32;
        usage.seconds_in_period = geti("seconds_in_period");
        usage.read_units = geti("read_units");
        usage.write_units = geti("write_units");
        usage.storage_gb = geti("storage_gb");
        usage.read_throttle_count = geti("read_throttle_count");
        usage.write_throttle_count = geti("write_throttle_count");
        usage.max_shard_usage_percent = geti("max_shard_usage_percent");
        Ok(usage)
    }
}
