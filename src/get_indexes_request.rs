//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used to get information about indexes of a table in CoralDB.
#[derive(Default, Debug)]
pub struct GetIndexesRequest {
    pub(crate) table_name: String,
    pub(crate) index_name: String,
    pub(crate) namespace: String,
    pub(crate) timeout: Option<Duration>,
}

/// Information about a single index of a table.
#[derive(Default, Debug)]
pub struct IndexInfo {
    /// The name of the index.
    pub index_name: String,
    /// The indexed field paths, in index order.
    pub field_names: Vec<String>,
}

/// Struct representing the result of a [`GetIndexesRequest`] operation.
#[derive(Default, Debug)]
pub struct GetIndexesResult {
    pub(crate) indexes: Vec<IndexInfo>,
}

impl GetIndexesResult {
    /// Get the index information records.
    pub fn indexes(&self) -> &Vec<IndexInfo> {
        &self.indexes
    }
}

impl GetIndexesRequest {
    /// Create a new GetIndexesRequest.
    ///
    /// `table_name` is required and must be non-empty.
    pub fn new(table_name: &str) -> GetIndexesRequest {
        GetIndexesRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Get information about a single named index. If not set, all of the
    /// table's indexes are returned.
    pub fn index_name(mut self, index_name: &str) -> GetIndexesRequest {
        self.index_name = index_name.to_string();
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> GetIndexesRequest {
        self.namespace = namespace.to_string();
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> GetIndexesRequest {
        self.timeout = Some(*t);
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<GetIndexesResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let mut payload: Map<String, Value> = Map::new();
        if !self.index_name.is_empty() {
            payload.insert("index".to_string(), Value::from(self.index_name.clone()));
        }
        let op = Operation::new(
            OpCode::GetIndexes,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        let mut res = GetIndexesResult::default();
        if let Some(Value::Array(items)) = resp.take_field("indexes") {
            res.indexes.reserve(items.len());
            for item in &items {
                let m = match item.as_object() {
                    Some(m) => m,
                    None => continue,
                };
                let mut info = IndexInfo {
                    index_name: m
                        .get("index_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    ..Default::default()
                };
                if let Some(Value::Array(fields)) = m.get("fields") {
                    for f in fields {
                        if let Some(s) = f.as_str() {
                            info.field_names.push(s.to_string());
                        }
                    }
                }
                res.indexes.push(info);
            }
        }
        Ok(res)
    }
}
