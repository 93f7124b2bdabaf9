//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::transport::ServiceResponse;
use crate::types::{Capacity, FieldValue, MapValue};
use crate::Version;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used for inserting a single row of data into a CoralDB table.
///
/// Row data is given as a JSON object mapping column names to values.
///
/// This request can perform unconditional and conditional puts:
/// - Overwrite existing row. This is the default.
/// - Succeed only if the row does not exist. Use [`if_absent()`](PutRequest::if_absent()) for this case.
/// - Succeed only if the row exists. Use [`if_present()`](PutRequest::if_present()) for this case.
/// - Succeed only if the row exists and its [`Version`] matches a specific
///   [`Version`]. Use [`if_version()`](PutRequest::if_version()) for this case.
///
/// An unsatisfied condition is not an error: the operation completes with
/// [`PutResult::success()`] returning `false`. Information about the
/// existing row can be returned in that case using
/// [`return_row(true)`](PutRequest::return_row()); requesting this
/// information incurs additional cost and may affect operation latency.
///
/// On successful operation, [`PutResult::version()`] is `Some`. This Version may
/// be used in subsequent PutRequests.
#[derive(Default, Debug)]
pub struct PutRequest {
    pub(crate) table_name: String,
    pub(crate) value: FieldValue,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,
    pub(crate) abort_on_fail: bool,
    pub(crate) return_row: bool,
    if_present: bool,
    if_absent: bool,
    pub(crate) ttl: Option<Duration>,
    pub(crate) use_table_ttl: bool,
    match_version: Option<Version>,
}

/// Struct representing the result of a [`PutRequest`] execution.
#[derive(Default, Debug)]
pub struct PutResult {
    pub(crate) success: bool,
    pub(crate) version: Option<Version>,
    pub(crate) consumed: Option<Capacity>,
    pub(crate) generated_value: Option<FieldValue>,
    pub(crate) existing_modification_time: i64,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl PutResult {
    /// Get the outcome of the operation: false means the put's condition
    /// (`if_absent`, `if_present`, or `if_version`) was not satisfied. An
    /// unconditional put always succeeds (or errors).
    pub fn success(&self) -> bool {
        self.success
    }
    /// Get the Version of the now-current record. This value is `Some` if the put operation succeeded. It
    /// may be used in subsequent [`PutRequest::if_version()`] calls.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
    /// Get the consumed capacity (read/write units) of the operation.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
    /// Get the value generated if the operation created a new value. This can happen if the table contains an
    /// identity column or string column declared as a generated UUID. If the table has no such column, this value is `None`.
    pub fn generated_value(&self) -> Option<&FieldValue> {
        self.generated_value.as_ref()
    }
    /// Get the modification time of the previous row if the put operation succeeded, or the modification time of the
    /// current row if the operation failed due to a condition mismatch.
    ///
    /// In either case, this is only valid if [`return_row(true)`](PutRequest::return_row()) was called on
    /// the [`PutRequest`] and a previous row existed.
    /// Its value is the number of milliseconds since the epoch (Jan 1 1970).
    pub fn existing_modification_time(&self) -> i64 {
        self.existing_modification_time
    }
    /// Get the value of the previous row if the put operation succeeded, or the value of the
    /// current row if the operation failed due to a condition mismatch.
    ///
    /// In either case, this is only valid if [`return_row(true)`](PutRequest::return_row()) was called on
    /// the [`PutRequest`] and a previous row existed.
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// Get the Version of the previous row if the put operation succeeded, or the Version of the
    /// current row if the operation failed due to a condition mismatch.
    ///
    /// In either case, this is only valid if [`return_row(true)`](PutRequest::return_row()) was called on
    /// the [`PutRequest`] and a previous row existed.
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }
}

impl PutRequest {
    /// Create a new PutRequest.
    ///
    /// `table_name` is required and must be non-empty, unless the request is
    /// added to a [`WriteBatchRequest`](crate::WriteBatchRequest) that
    /// supplies one.
    pub fn new(table_name: &str) -> PutRequest {
        PutRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the row value to put, as a JSON object with one field per
    /// column. This is required.
    pub fn value(mut self, value: FieldValue) -> PutRequest {
        self.value = value;
        self
    }

    /// Succeed only if the row does not already exist.
    pub fn if_absent(mut self) -> PutRequest {
        self.if_absent = true;
        self
    }

    /// Succeed only if the row already exists.
    pub fn if_present(mut self) -> PutRequest {
        self.if_present = true;
        self
    }

    /// Succeed only if the row exists and its current version matches the
    /// given one.
    pub fn if_version(mut self, version: &Version) -> PutRequest {
        self.match_version = Some(version.clone());
        self
    }

    /// Return information about the existing row on condition failure.
    /// See [`PutResult::existing_value()`].
    pub fn return_row(mut self, return_row: bool) -> PutRequest {
        self.return_row = return_row;
        self
    }

    /// Specify a time-to-live for the row.
    ///
    /// Note: internally the duration is converted to a whole number of
    /// hours, with a minimum of one hour.
    pub fn ttl(mut self, ttl: &Duration) -> PutRequest {
        self.ttl = Some(*ttl);
        self
    }

    /// Update the row's expiration from the table's default TTL, if the
    /// table has one.
    pub fn use_table_ttl(mut self) -> PutRequest {
        self.use_table_ttl = true;
        self
    }

    /// When used in a [`WriteBatchRequest`](crate::WriteBatchRequest): abort
    /// the whole batch if this sub-operation's condition fails.
    /// Has no effect on a standalone put.
    pub fn abort_on_fail(mut self, abort: bool) -> PutRequest {
        self.abort_on_fail = abort;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> PutRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> PutRequest {
        self.namespace = namespace.to_string();
        self
    }

    // Exactly one op code describes the put's condition.
    pub(crate) fn op_code(&self) -> Result<OpCode, CoralError> {
        let mut conditions = 0;
        if self.if_absent {
            conditions += 1;
        }
        if self.if_present {
            conditions += 1;
        }
        if self.match_version.is_some() {
            conditions += 1;
        }
        if conditions > 1 {
            return ia_err!(
                "put request may specify at most one of if_absent, if_present, if_version"
            );
        }
        if self.if_absent {
            return Ok(OpCode::PutIfAbsent);
        }
        if self.if_present {
            return Ok(OpCode::PutIfPresent);
        }
        if self.match_version.is_some() {
            return Ok(OpCode::PutIfVersion);
        }
        Ok(OpCode::Put)
    }

    pub(crate) fn payload(&self) -> Result<Map<String, Value>, CoralError> {
        let value = match self.value.as_object() {
            Some(v) if !v.is_empty() => v,
            _ => {
                return ia_err!("put request requires a non-empty value object");
            }
        };
        let mut payload: Map<String, Value> = Map::new();
        payload.insert("value".to_string(), Value::Object(value.clone()));
        if self.return_row {
            payload.insert("return_row".to_string(), Value::from(true));
        }
        if let Some(ttl) = &self.ttl {
            let hours = (ttl.as_secs() / 3600).max(1);
            payload.insert("ttl_hours".to_string(), Value::from(hours));
        }
        if self.use_table_ttl {
            payload.insert("use_table_ttl".to_string(), Value::from(true));
        }
        if let Some(v) = &self.match_version {
            payload.insert(
                "match_version".to_string(),
                Value::from(BASE64_STANDARD.encode(v)),
            );
        }
        Ok(payload)
    }

    // serialized form used inside a WriteBatchRequest
    pub(crate) fn to_sub_operation(&self, abort_default: bool) -> Result<Value, CoralError> {
        let mut m = self.payload()?;
        m.insert("op".to_string(), Value::from(self.op_code()?.as_str()));
        if !self.table_name.is_empty() {
            m.insert("table".to_string(), Value::from(self.table_name.clone()));
        }
        if self.abort_on_fail || abort_default {
            m.insert("abort_on_fail".to_string(), Value::from(true));
        }
        Ok(Value::Object(m))
    }

    pub async fn execute(&self, h: &Handle) -> Result<PutResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let op = Operation::new(
            self.op_code()?,
            &self.table_name,
            self.payload()?,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        let mut res = PutResult {
            consumed: resp.consumed.take(),
            ..Default::default()
        };
        res.success = resp.bool_field("success").unwrap_or(false);
        res.version = resp.binary_field("version")?;
        res.generated_value = resp.take_field("generated_value");
        read_existing_row(
            &mut resp,
            &mut res.existing_modification_time,
            &mut res.existing_value,
            &mut res.existing_version,
        )?;
        Ok(res)
    }
}

// Decode the optional existing-row info shared by conditional put and
// delete results.
pub(crate) fn read_existing_row(
    resp: &mut ServiceResponse,
    modification_time: &mut i64,
    value: &mut Option<MapValue>,
    version: &mut Option<Version>,
) -> Result<(), CoralError> {
    *modification_time = resp.i64_field("existing_modification_time").unwrap_or(0);
    if let Some(Value::Object(m)) = resp.take_field("existing_value") {
        *value = Some(m);
    }
    *version = resp.binary_field("existing_version")?;
    Ok(())
}
