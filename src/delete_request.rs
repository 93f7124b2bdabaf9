//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::put_request::read_existing_row;
use crate::types::{Capacity, FieldValue, MapValue};
use crate::Version;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used for deleting a single row of data from a CoralDB table.
///
/// The delete can be made conditional with
/// [`if_version()`](DeleteRequest::if_version()): the row is removed only if
/// its current version matches. An unsatisfied condition, or a key that does
/// not exist, is not an error: the operation completes with
/// [`DeleteResult::success()`] returning `false`.
#[derive(Default, Debug)]
pub struct DeleteRequest {
    pub(crate) table_name: String,
    pub(crate) key: FieldValue,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,
    pub(crate) abort_on_fail: bool,
    pub(crate) return_row: bool,
    match_version: Option<Version>,
}

/// Struct representing the result of a [`DeleteRequest`] execution.
#[derive(Default, Debug)]
pub struct DeleteResult {
    pub(crate) success: bool,
    pub(crate) consumed: Option<Capacity>,
    pub(crate) existing_modification_time: i64,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl DeleteResult {
    /// Get the outcome of the operation: false means the row did not exist,
    /// or an `if_version` condition was not satisfied.
    pub fn success(&self) -> bool {
        self.success
    }
    /// Get the consumed capacity (read/write units) of the operation.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
    /// Get the modification time of the deleted row, or of the current row
    /// if an `if_version` condition failed.
    ///
    /// Only valid if [`return_row(true)`](DeleteRequest::return_row()) was
    /// set and the row existed.
    pub fn existing_modification_time(&self) -> i64 {
        self.existing_modification_time
    }
    /// Get the value of the deleted row, or of the current row if an
    /// `if_version` condition failed.
    ///
    /// Only valid if [`return_row(true)`](DeleteRequest::return_row()) was
    /// set and the row existed.
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// Get the version of the current row if an `if_version` condition
    /// failed.
    ///
    /// Only valid if [`return_row(true)`](DeleteRequest::return_row()) was
    /// set and the row existed.
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }
}

impl DeleteRequest {
    /// Create a new DeleteRequest.
    ///
    /// `table_name` is required and must be non-empty, unless the request is
    /// added to a [`WriteBatchRequest`](crate::WriteBatchRequest) that
    /// supplies one. `key` is the full primary key of the row to delete, as
    /// a JSON object.
    pub fn new(table_name: &str, key: FieldValue) -> DeleteRequest {
        DeleteRequest {
            table_name: table_name.to_string(),
            key,
            ..Default::default()
        }
    }

    /// Succeed only if the row exists and its current version matches the
    /// given one.
    pub fn if_version(mut self, version: &Version) -> DeleteRequest {
        self.match_version = Some(version.clone());
        self
    }

    /// Return information about the existing row on condition failure.
    /// See [`DeleteResult::existing_value()`].
    pub fn return_row(mut self, return_row: bool) -> DeleteRequest {
        self.return_row = return_row;
        self
    }

    /// When used in a [`WriteBatchRequest`](crate::WriteBatchRequest): abort
    /// the whole batch if this sub-operation's condition fails.
    /// Has no effect on a standalone delete.
    pub fn abort_on_fail(mut self, abort: bool) -> DeleteRequest {
        self.abort_on_fail = abort;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> DeleteRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> DeleteRequest {
        self.namespace = namespace.to_string();
        self
    }

    pub(crate) fn op_code(&self) -> OpCode {
        if self.match_version.is_some() {
            return OpCode::DeleteIfVersion;
        }
        OpCode::Delete
    }

    pub(crate) fn payload(&self) -> Result<Map<String, Value>, CoralError> {
        let key = match self.key.as_object() {
            Some(k) if !k.is_empty() => k,
            _ => {
                return ia_err!("delete request requires a non-empty key object");
            }
        };
        let mut payload: Map<String, Value> = Map::new();
        payload.insert("key".to_string(), Value::Object(key.clone()));
        if self.return_row {
            payload.insert("return_row".to_string(), Value::from(true));
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
        m.insert("op".to_string(), Value::from(self.op_code().as_str()));
        if !self.table_name.is_empty() {
            m.insert("table".to_string(), Value::from(self.table_name.clone()));
        }
        if self.abort_on_fail || abort_default {
            m.insert("abort_on_fail".to_string(), Value::from(true));
        }
        Ok(Value::Object(m))
    }

    pub async fn execute(&self, h: &Handle) -> Result<DeleteResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let op = Operation::new(
            self.op_code(),
            &self.table_name,
            self.payload()?,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        let mut res = DeleteResult {
            consumed: resp.consumed.take(),
            ..Default::default()
        };
        res.success = resp.bool_field("success").unwrap_or(false);
        read_existing_row(
            &mut resp,
            &mut res.existing_modification_time,
            &mut res.existing_value,
            &mut res.existing_version,
        )?;
        Ok(res)
    }
}
