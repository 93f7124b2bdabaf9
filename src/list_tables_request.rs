//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralError;
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;

/// Struct used to list all tables in CoralDB.
///
/// Large listings paginate by index: set
/// [`limit()`](ListTablesRequest::limit()) and pass
/// [`ListTablesResult::last_index_returned()`] as the next request's
/// [`start_index()`](ListTablesRequest::start_index()).
#[derive(Default, Debug)]
pub struct ListTablesRequest {
    pub(crate) namespace: String,
    pub(crate) limit: i32,
    pub(crate) start_index: i32,
    pub(crate) timeout: Option<Duration>,
}

/// Struct representing the result of a [`ListTablesRequest`] operation.
#[derive(Default, Debug)]
pub struct ListTablesResult {
    pub(crate) tables: Vec<String>,
    pub(crate) last_index_returned: i32,
}

impl ListTablesResult {
    /// Get the table names, in alphabetical order.
    pub fn tables(&self) -> &Vec<String> {
        &self.tables
    }
    /// Get the index of the last table name returned. This can be used as
    /// the `start_index` of a subsequent request to continue the listing.
    pub fn last_index_returned(&self) -> i32 {
        self.last_index_returned
    }
}

impl ListTablesRequest {
    pub fn new() -> ListTablesRequest {
        ListTablesRequest {
            ..Default::default()
        }
    }

    /// On-premises only: list tables in this namespace only.
    pub fn namespace(mut self, namespace: &str) -> ListTablesRequest {
        self.namespace = namespace.to_string();
        self
    }

    /// Specify the maximum number of table names to return in one call.
    /// Zero means no application-defined limit.
    pub fn limit(mut self, limit: i32) -> ListTablesRequest {
        self.limit = limit;
        self
    }

    /// Specify the index to start the listing at, typically taken from a
    /// previous [`ListTablesResult::last_index_returned()`].
    pub fn start_index(mut self, start_index: i32) -> ListTablesRequest {
        self.start_index = start_index;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> ListTablesRequest {
        self.timeout = Some(*t);
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<ListTablesResult, CoralError> {
        let mut payload: Map<String, Value> = Map::new();
        if self.limit > 0 {
            payload.insert("limit".to_string(), Value::from(self.limit));
        }
        if self.start_index > 0 {
            payload.insert("start_index".to_string(), Value::from(self.start_index));
        }
        let op = Operation::new(
            OpCode::ListTables,
            "",
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        let mut res = ListTablesResult {
            last_index_returned: resp.i32_field("last_index_returned").unwrap_or(0),
            ..Default::default()
        };
        if let Some(Value::Array(items)) = resp.take_field("tables") {
            res.tables.reserve(items.len());
            for item in items {
                if let Value::String(s) = item {
                    res.tables.push(s);
                }
            }
        }
        Ok(res)
    }
}
