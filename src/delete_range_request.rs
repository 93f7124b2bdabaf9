//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::types::{Capacity, ContinuationToken, FieldValue};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// A range of values to be used in a [`DeleteRangeRequest`] operation.
///
/// `FieldRange` is used as the least significant component in a partially
/// specified key value in order to create a value range for an operation that
/// returns multiple rows or keys. The data types supported by `FieldRange` are
/// limited to the atomic types which are valid for primary keys.
///
/// The least significant component of a key is the first component of the key
/// that is not fully specified. For example, if the primary key for a table is
/// defined as the tuple:
///
///   <a, b, c>
///
/// A `FieldRange` can be specified for:
///
///   "a" if the primary key supplied is empty.
///   "b" if the primary key supplied to the operation has a concrete value for "a" but not for "b" or "c".
///
/// The `field_path` specified must name a field in a table's primary key.
/// The `start` and `end` values used must be of the same type and that type must
/// match the type of the field specified. Validation of the range is
/// performed server-side when the operation executes.
#[derive(Default, Debug)]
pub struct FieldRange {
    // field_path specifies the path to the field used in the range.
    pub field_path: String,

    // start specifies the start value of the range.
    pub start: Option<FieldValue>,

    // start_inclusive specifies whether the start value is included in the
    // range. Only meaningful if the start value is specified.
    pub start_inclusive: bool,

    // end specifies the end value of the range.
    pub end: Option<FieldValue>,

    // end_inclusive specifies whether the end value is included in the
    // range. Only meaningful if the end value is specified.
    pub end_inclusive: bool,
}

/// Struct used for deleting a range of rows from a CoralDB table.
///
/// The rows to delete share the partial primary key given to
/// [`new()`](DeleteRangeRequest::new()), optionally narrowed by a
/// [`FieldRange`] on the first unspecified key component.
///
/// One execution performs at most one server round-trip: when the server
/// reaches its write limit for a single call (see
/// [`max_write_kb()`](DeleteRangeRequest::max_write_kb())), the result
/// carries a continuation token. Loop until the token is absent:
///
/// ```no_run
/// # use coraldb::{Handle, DeleteRangeRequest};
/// # use serde_json::json;
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let handle = Handle::builder().build().await?;
/// let mut total = 0;
/// let mut req = DeleteRangeRequest::new("users", json!({"shard": 1}));
/// loop {
///     let res = req.execute(&handle).await?;
///     total += res.num_deleted();
///     match res.continuation_key() {
///         Some(key) => req = req.continuation_key(key),
///         None => break,
///     }
/// }
/// println!("deleted {} rows", total);
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct DeleteRangeRequest {
    pub(crate) table_name: String,
    pub(crate) key: FieldValue,
    pub(crate) continuation_key: Option<ContinuationToken>,
    pub(crate) field_range: Option<FieldRange>,
    pub(crate) max_write_kb: i32,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,
}

/// Struct representing the result of a [`DeleteRangeRequest`] operation.
#[derive(Default, Debug)]
pub struct DeleteRangeResult {
    pub(crate) num_deleted: i32,
    pub(crate) continuation_key: Option<ContinuationToken>,
    pub(crate) consumed: Option<Capacity>,
}

impl DeleteRangeResult {
    /// Get the number of records deleted by this call.
    pub fn num_deleted(&self) -> i32 {
        self.num_deleted
    }
    /// Get a continuation key to use in a subsequent execution of the same
    /// logical delete. `None` means the range is exhausted. Note a returned
    /// key does not guarantee more rows remain to be deleted.
    pub fn continuation_key(&self) -> Option<ContinuationToken> {
        self.continuation_key.clone()
    }
    /// Get the consumed capacity (read/write units) of the operation.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
}

impl DeleteRangeRequest {
    /// Create a new `DeleteRangeRequest`.
    ///
    /// `table_name` is required and must be non-empty.
    ///
    /// `partial_key` specifies the shard-key portion (or more) of the rows'
    /// primary keys, as a JSON object. It is required.
    pub fn new(table_name: &str, partial_key: FieldValue) -> DeleteRangeRequest {
        DeleteRangeRequest {
            table_name: table_name.to_string(),
            key: partial_key,
            ..Default::default()
        }
    }

    /// Specify the [`FieldRange`] to be used for the operation.
    ///
    /// It is optional, but required to delete a specific range of rows.
    pub fn field_range(mut self, field_range: FieldRange) -> DeleteRangeRequest {
        self.field_range = Some(field_range);
        self
    }

    /// Specify the continuation key to use to continue the operation.
    ///
    /// This is typically populated from a previous
    /// [`DeleteRangeResult::continuation_key()`]. A key must only be used to
    /// continue the same logical operation (same partial key and field
    /// range) it was returned from.
    pub fn continuation_key(mut self, key: ContinuationToken) -> DeleteRangeRequest {
        self.continuation_key = Some(key);
        self
    }

    /// Specify the limit on the total KB written during this operation.
    ///
    /// This is optional. If this value is not set, or set to 0, the system
    /// defined limit applies. This value can only reduce the system defined
    /// limit; an attempt to increase it will cause an IllegalArgument error.
    pub fn max_write_kb(mut self, max_write_kb: i32) -> DeleteRangeRequest {
        self.max_write_kb = max_write_kb;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> DeleteRangeRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> DeleteRangeRequest {
        self.namespace = namespace.to_string();
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<DeleteRangeResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let key = match self.key.as_object() {
            Some(k) if !k.is_empty() => k,
            _ => {
                return ia_err!("delete range request requires a non-empty partial key object");
            }
        };
        if self.max_write_kb < 0 {
            return ia_err!("max_write_kb must not be negative");
        }

        let mut payload: Map<String, Value> = Map::new();
        payload.insert("key".to_string(), Value::Object(key.clone()));
        if self.max_write_kb > 0 {
            payload.insert("max_write_kb".to_string(), Value::from(self.max_write_kb));
        }
        if let Some(ck) = &self.continuation_key {
            payload.insert(
                "continuation_key".to_string(),
                Value::from(ck.to_base64()),
            );
        }
        if let Some(range) = &self.field_range {
            let mut rm: Map<String, Value> = Map::new();
            rm.insert("path".to_string(), Value::from(range.field_path.clone()));
            if let Some(start) = &range.start {
                rm.insert("start".to_string(), start.clone());
                rm.insert(
                    "start_inclusive".to_string(),
                    Value::from(range.start_inclusive),
                );
            }
            if let Some(end) = &range.end {
                rm.insert("end".to_string(), end.clone());
                rm.insert("end_inclusive".to_string(), Value::from(range.end_inclusive));
            }
            payload.insert("range".to_string(), Value::Object(rm));
        }

        let op = Operation::new(
            OpCode::DeleteRange,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        let res = DeleteRangeResult {
            num_deleted: resp.i32_field("num_deleted").unwrap_or(0),
            continuation_key: resp.token_field("continuation_key")?,
            consumed: resp.consumed.take(),
        };
        Ok(res)
    }
}
