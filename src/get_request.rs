//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::types::{Capacity, Consistency, FieldValue, MapValue};
use crate::Version;
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used for retrieving a single row of data from a CoralDB table.
///
/// The row key is given as a JSON object containing all of the table's
/// primary key columns:
/// ```no_run
/// # use coraldb::{Handle, GetRequest};
/// # use serde_json::json;
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let handle = Handle::builder().build().await?;
/// let getres = GetRequest::new("users")
///     .key(json!({"id": 10}))
///     .execute(&handle)
///     .await?;
/// println!("GetResult={:?}", getres);
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct GetRequest {
    pub(crate) table_name: String,
    pub(crate) key: FieldValue,
    pub(crate) consistency: Consistency,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,
}

/// Struct representing the result of a [`GetRequest`] execution.
#[derive(Default, Debug)]
pub struct GetResult {
    pub(crate) row: Option<MapValue>,
    pub(crate) version: Option<Version>,
    pub(crate) modification_time: i64,
    pub(crate) expiration_time: i64,
    pub(crate) consumed: Option<Capacity>,
}

impl GetResult {
    /// Get the returned row, if the requested row exists in the table.
    pub fn row(&self) -> Option<&MapValue> {
        self.row.as_ref()
    }
    /// Get the Version of the current record. This value is `Some` if the
    /// requested row exists. It may be used in subsequent
    /// [`PutRequest::if_version()`](crate::PutRequest::if_version()) calls.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
    /// Get the last modification time of the row, in milliseconds since the
    /// epoch. Zero if the row does not exist.
    pub fn modification_time(&self) -> i64 {
        self.modification_time
    }
    /// Get the expiration time of the row, in milliseconds since the epoch.
    /// Zero if the row does not exist or has no expiration.
    pub fn expiration_time(&self) -> i64 {
        self.expiration_time
    }
    /// Get the consumed capacity (read/write units) of the operation.
    pub fn consumed(&self) -> Option<&Capacity> {
        self.consumed.as_ref()
    }
}

impl GetRequest {
    /// Create a new GetRequest.
    ///
    /// `table_name` is required and must be non-empty.
    pub fn new(table_name: &str) -> GetRequest {
        GetRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the primary key of the row to get, as a JSON object with one
    /// field per primary key column. This is required.
    pub fn key(mut self, key: FieldValue) -> GetRequest {
        self.key = key;
        self
    }

    /// Specify the desired consistency policy for the request.
    ///
    /// If not set, the default consistency of [`Consistency::Eventual`] is used.
    pub fn consistency(mut self, c: Consistency) -> GetRequest {
        self.consistency = c;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> GetRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> GetRequest {
        self.namespace = namespace.to_string();
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<GetResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let key = match self.key.as_object() {
            Some(k) if !k.is_empty() => k,
            _ => {
                return ia_err!("get request requires a non-empty key object");
            }
        };

        let mut payload: Map<String, Value> = Map::new();
        payload.insert("key".to_string(), Value::Object(key.clone()));
        payload.insert(
            "consistency".to_string(),
            Value::from(self.consistency.as_str()),
        );
        let op = Operation::new(
            OpCode::Get,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );

        let mut resp = h.execute_op(op).await?;
        let mut res = GetResult {
            consumed: resp.consumed.take(),
            ..Default::default()
        };
        if let Some(Value::Object(m)) = resp.take_field("row") {
            res.row = Some(m);
        }
        res.version = resp.binary_field("version")?;
        res.modification_time = resp.i64_field("modification_time").unwrap_or(0);
        res.expiration_time = resp.i64_field("expiration_time").unwrap_or(0);
        Ok(res)
    }
}
