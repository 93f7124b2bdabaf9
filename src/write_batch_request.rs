//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::delete_request::DeleteRequest;
use crate::error::CoralErrorCode::BadProtocolMessage;
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::put_request::PutRequest;
use crate::types::{Capacity, FieldValue, MapValue};
use crate::Version;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

// System-defined limits on one batch.
pub(crate) const MAX_BATCH_OPERATIONS: usize = 50;
pub(crate) const MAX_BATCH_SIZE_BYTES: usize = 25 * 1024 * 1024;

/// Struct used to perform multiple [`PutRequest`]s and/or [`DeleteRequest`]s
/// in a single atomic operation.
///
/// All sub-operations execute as one server-side transaction: either every
/// sub-operation takes effect, or (if a sub-operation whose
/// `abort_on_fail` flag is set fails its condition) none do. The
/// sub-operations may target different tables as long as all tables share
/// one ancestor table's shard key, so all rows are co-located.
///
/// A batch is limited to 50 sub-operations and 25 MB of estimated request
/// size; these limits are checked locally before dispatch.
///
/// A sub-operation failing its `if_absent`/`if_present`/`if_version`
/// condition is not a call-level error - only infrastructure failures
/// (network, authorization, resource limits) are. When no abort is
/// triggered, [`WriteBatchResult::results()`] holds the outcome of every
/// sub-operation in submitted order; when an abort is triggered, the result
/// reports only the index and outcome of the sub-operation that caused it.
#[derive(Default, Debug)]
pub struct WriteBatchRequest {
    pub(crate) table_name: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,
    pub(crate) abort_on_fail: bool,
    pub(crate) sub_requests: Vec<SubOperation>,
}

// Exactly one of put/delete per sub-operation, enforced by construction.
#[derive(Debug)]
pub(crate) enum SubOperation {
    Put(PutRequest),
    Delete(DeleteRequest),
}

impl SubOperation {
    fn table_name(&self) -> &str {
        match self {
            SubOperation::Put(p) => &p.table_name,
            SubOperation::Delete(d) => &d.table_name,
        }
    }

    fn to_json(&self, abort_default: bool) -> Result<Value, CoralError> {
        match self {
            SubOperation::Put(p) => p.to_sub_operation(abort_default),
            SubOperation::Delete(d) => d.to_sub_operation(abort_default),
        }
    }
}

/// Struct representing the result of a single sub-operation of a
/// [`WriteBatchRequest`].
#[derive(Default, Debug)]
pub struct SubOperationResult {
    pub(crate) success: bool,
    pub(crate) version: Option<Version>,
    pub(crate) generated_value: Option<FieldValue>,
    pub(crate) existing_modification_time: i64,
    pub(crate) existing_value: Option<MapValue>,
    pub(crate) existing_version: Option<Version>,
}

impl SubOperationResult {
    /// Get the outcome of the sub-operation: false means its condition was
    /// not satisfied.
    pub fn success(&self) -> bool {
        self.success
    }
    /// For `Put` sub-operations: the Version of the now-current record, if
    /// the put succeeded.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
    /// For `Put` sub-operations: see [`PutResult::generated_value()`](crate::PutResult::generated_value()).
    pub fn generated_value(&self) -> Option<&FieldValue> {
        self.generated_value.as_ref()
    }
    /// See [`PutResult::existing_modification_time()`](crate::PutResult::existing_modification_time()).
    pub fn existing_modification_time(&self) -> i64 {
        self.existing_modification_time
    }
    /// See [`PutResult::existing_value()`](crate::PutResult::existing_value()).
    pub fn existing_value(&self) -> Option<&MapValue> {
        self.existing_value.as_ref()
    }
    /// See [`PutResult::existing_version()`](crate::PutResult::existing_version()).
    pub fn existing_version(&self) -> Option<&Version> {
        self.existing_version.as_ref()
    }
}

/// Struct representing the combined results of a [`WriteBatchRequest`]
/// operation.
#[derive(Default, Debug)]
pub struct WriteBatchResult {
    pub(crate) results: Vec<SubOperationResult>,
    pub(crate) failed_operation_index: i32,
    pub(crate) consumed: Option<Capacity>,
}

impl WriteBatchResult {
    /// Get the sub-operation results.
    ///
    /// If the batch completed without an abort, this holds one result per
    /// sub-operation, in submitted order. If the batch aborted, it holds
    /// exactly the result of the sub-operation that triggered the abort;
    /// see [`failed_operation_index()`](WriteBatchResult::failed_operation_index()).
    pub fn results(&self) -> &Vec<SubOperationResult> {
        &self.results
    }
    /// Get the index of the sub-operation that aborted the batch.
    /// If the batch did not abort, -1 is returned.
    pub fn failed_operation_index(&self) -> i32 {
        self.failed_operation_index
    }
    /// Get the consumed capacity (read/write units) of the overall operation.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
}

impl WriteBatchRequest {
    /// Create a new WriteBatchRequest.
    ///
    /// `table_name` is the default table for sub-operations that do not name
    /// one of their own.
    pub fn new(table_name: &str) -> WriteBatchRequest {
        WriteBatchRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Add a put sub-operation to the batch.
    pub fn add_put(mut self, r: PutRequest) -> WriteBatchRequest {
        self.sub_requests.push(SubOperation::Put(r));
        self
    }

    /// Add a delete sub-operation to the batch.
    pub fn add_delete(mut self, r: DeleteRequest) -> WriteBatchRequest {
        self.sub_requests.push(SubOperation::Delete(r));
        self
    }

    /// Set the batch-level default for `abort_on_fail`: when true, any
    /// sub-operation failing its condition aborts the whole batch.
    /// Individual sub-operations may also set their own flag.
    pub fn abort_on_fail(mut self, abort: bool) -> WriteBatchRequest {
        self.abort_on_fail = abort;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> WriteBatchRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> WriteBatchRequest {
        self.namespace = namespace.to_string();
        self
    }

    // The shard key prefix is determined by the topmost ancestor table, so
    // co-location requires every referenced table to share one root name.
    fn table_root(name: &str) -> &str {
        match name.split_once('.') {
            Some((root, _)) => root,
            None => name,
        }
    }

    fn validate(&self) -> Result<Vec<Value>, CoralError> {
        if self.sub_requests.is_empty() {
            return ia_err!("write batch requires at least one sub-operation");
        }
        if self.sub_requests.len() > MAX_BATCH_OPERATIONS {
            return ia_err!(
                "write batch exceeds the limit of {} sub-operations ({} given)",
                MAX_BATCH_OPERATIONS,
                self.sub_requests.len()
            );
        }
        let mut root = Self::table_root(&self.table_name).to_lowercase();
        let mut ops: Vec<Value> = Vec::with_capacity(self.sub_requests.len());
        let mut size = 0usize;
        for (i, sub) in self.sub_requests.iter().enumerate() {
            let mut sub_root = Self::table_root(sub.table_name()).to_lowercase();
            if sub_root.is_empty() {
                sub_root = root.clone();
            }
            if sub_root.is_empty() {
                return ia_err!("sub-operation {} has no table name and the batch has no default", i);
            }
            if root.is_empty() {
                // no batch-level default: the first sub-operation anchors
                // the shard key for the rest
                root = sub_root.clone();
            }
            if sub_root != root {
                return ia_err!(
                    "sub-operation {} table '{}' does not share the shard key ancestor '{}'",
                    i,
                    sub.table_name(),
                    root
                );
            }
            let v = sub.to_json(self.abort_on_fail)?;
            size += serde_json::to_vec(&v).map(|b| b.len()).unwrap_or(0);
            ops.push(v);
        }
        if size > MAX_BATCH_SIZE_BYTES {
            return ia_err!(
                "write batch estimated size {} exceeds the limit of {} bytes",
                size,
                MAX_BATCH_SIZE_BYTES
            );
        }
        Ok(ops)
    }

    pub async fn execute(&self, h: &Handle) -> Result<WriteBatchResult, CoralError> {
        let ops = self.validate()?;
        let mut payload: Map<String, Value> = Map::new();
        payload.insert("num_operations".to_string(), Value::from(ops.len()));
        payload.insert("operations".to_string(), Value::Array(ops));
        let op = Operation::new(
            OpCode::WriteBatch,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;

        let mut res = WriteBatchResult {
            failed_operation_index: -1,
            consumed: resp.consumed.take(),
            ..Default::default()
        };
        // a successful batch carries one result per sub-operation; an
        // aborted batch carries the aborting index and that result only
        if let Some(Value::Array(items)) = resp.take_field("success_results") {
            res.results = Vec::with_capacity(items.len());
            for item in &items {
                res.results.push(Self::read_result(item)?);
            }
            return Ok(res);
        }
        if let Some(idx) = resp.i32_field("failed_index") {
            res.failed_operation_index = idx;
            if let Some(item) = resp.take_field("failed_result") {
                res.results.push(Self::read_result(&item)?);
            }
        }
        Ok(res)
    }

    fn read_result(v: &Value) -> Result<SubOperationResult, CoralError> {
        let m = match v.as_object() {
            Some(m) => m,
            None => {
                return Err(CoralError::new(
                    BadProtocolMessage,
                    "sub-operation result is not a JSON object",
                ));
            }
        };
        let mut res = SubOperationResult {
            success: m.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
            ..Default::default()
        };
        if let Some(s) = m.get("version").and_then(|v| v.as_str()) {
            match BASE64_STANDARD.decode(s) {
                Ok(b) => res.version = Some(b),
                Err(e) => {
                    return Err(CoralError::new(
                        BadProtocolMessage,
                        &format!("invalid version in sub-operation result: {}", e),
                    ));
                }
            }
        }
        res.generated_value = m.get("generated_value").cloned();
        res.existing_modification_time = m
            .get("existing_modification_time")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if let Some(Value::Object(ev)) = m.get("existing_value") {
            res.existing_value = Some(ev.clone());
        }
        if let Some(s) = m.get("existing_version").and_then(|v| v.as_str()) {
            match BASE64_STANDARD.decode(s) {
                Ok(b) => res.existing_version = Some(b),
                Err(e) => {
                    return Err(CoralError::new(
                        BadProtocolMessage,
                        &format!("invalid existing version in sub-operation result: {}", e),
                    ));
                }
            }
        }
        Ok(res)
    }
}
