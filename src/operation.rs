//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use serde_json::{Map, Value};
use std::time::Duration;

// OpCode identifies the driver method behind an [`Operation`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    // Get is used for the operation that retrieves a row from a table.
    Get = 0,

    // Put is used for the operation that unconditionally puts a row to a table.
    Put, // 1

    // PutIfAbsent is used for the operation that puts a row to a table if the row
    // is absent.
    PutIfAbsent, // 2

    // PutIfPresent is used for the operation that puts a row to a table if the row
    // is present.
    PutIfPresent, // 3

    // PutIfVersion is used for the operation that puts a row to a table if the row
    // matches the specified version.
    PutIfVersion, // 4

    // Delete is used for the operation that deletes a row from a table.
    Delete, // 5

    // DeleteIfVersion is used for the operation that deletes a row from a table
    // if the row matches the specified version.
    DeleteIfVersion, // 6

    // DeleteRange is used for the operation that deletes a range of rows from a
    // table in a single transaction, continued across server round-trips.
    DeleteRange, // 7

    // Query is used for the query operation.
    // A query operation can perform select, insert, update and delete operations
    // over an SQL statement.
    Query, // 8

    // Prepare is used for the operation that compiles/prepares an SQL statement
    // before execution. The compiled form is opaque to the driver.
    Prepare, // 9

    // WriteBatch is used to perform multiple write operations associated
    // with one shard in a single atomic transaction.
    WriteBatch, // 10

    // GetTable is used for the operation that retrieves static information
    // about a table, including the status of an in-progress table DDL.
    GetTable, // 11

    // GetIndexes is used for the operation that retrieves information about an index.
    GetIndexes, // 12

    // GetTableUsage is used for the operation that retrieves usage information
    // on a table.
    GetTableUsage, // 13

    // ListTables is used for the operation that lists all available table names.
    ListTables, // 14

    // TableDdl is used for the operation that manages table schema or
    // changes table limits.
    TableDdl, // 15

    // AdminDdl is used to perform administrative operations that do not
    // affect a specific table, such as namespace and user management.
    AdminDdl, // 16

    // AdminStatus is used to retrieve the operation status of an AdminDdl.
    AdminStatus, // 17
}

impl OpCode {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            OpCode::Get => "Get",
            OpCode::Put => "Put",
            OpCode::PutIfAbsent => "PutIfAbsent",
            OpCode::PutIfPresent => "PutIfPresent",
            OpCode::PutIfVersion => "PutIfVersion",
            OpCode::Delete => "Delete",
            OpCode::DeleteIfVersion => "DeleteIfVersion",
            OpCode::DeleteRange => "DeleteRange",
            OpCode::Query => "Query",
            OpCode::Prepare => "Prepare",
            OpCode::WriteBatch => "WriteBatch",
            OpCode::GetTable => "GetTable",
            OpCode::GetIndexes => "GetIndexes",
            OpCode::GetTableUsage => "GetTableUsage",
            OpCode::ListTables => "ListTables",
            OpCode::TableDdl => "TableDdl",
            OpCode::AdminDdl => "AdminDdl",
            OpCode::AdminStatus => "AdminStatus",
        }
    }

    /// Determine if this is a metadata/DDL-class call, as opposed to a data
    /// read or write. Metadata calls are not retried by the default retry
    /// policy, and are never rate limited.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            OpCode::GetTable
                | OpCode::GetIndexes
                | OpCode::GetTableUsage
                | OpCode::ListTables
                | OpCode::TableDdl
                | OpCode::AdminDdl
                | OpCode::AdminStatus
        )
    }

    // Operations that consume read capacity. Queries always consume at
    // least some read units, even when updating.
    pub(crate) fn does_reads(&self) -> bool {
        matches!(self, OpCode::Get | OpCode::Query | OpCode::Prepare)
    }

    // Operations that may consume write capacity.
    pub(crate) fn does_writes(&self) -> bool {
        matches!(
            self,
            OpCode::Put
                | OpCode::PutIfAbsent
                | OpCode::PutIfPresent
                | OpCode::PutIfVersion
                | OpCode::Delete
                | OpCode::DeleteIfVersion
                | OpCode::DeleteRange
                | OpCode::WriteBatch
                | OpCode::Query
        )
    }
}

/// Options in effect for one operation, resolved from the request and the
/// [`Handle`](crate::Handle) defaults at dispatch time.
#[derive(Clone, Debug, Default)]
pub struct OperationOptions {
    /// Total time budget for the operation, including all retries and any
    /// rate-limiter delay.
    pub timeout: Duration,
    /// On-premises only: the namespace for the operation. Empty means the
    /// server default.
    pub namespace: String,
}

/// An immutable record of one requested driver call.
///
/// An `Operation` is created once per API call and never mutated afterwards.
/// It is read by the transport, the retry policy, and any registered
/// [`EventObserver`](crate::EventObserver)s.
#[derive(Clone, Debug)]
pub struct Operation {
    op: OpCode,
    table_name: String,
    payload: Map<String, Value>,
    options: OperationOptions,
}

impl Operation {
    pub(crate) fn new(
        op: OpCode,
        table_name: &str,
        payload: Map<String, Value>,
        options: OperationOptions,
    ) -> Operation {
        Operation {
            op,
            table_name: table_name.to_string(),
            payload,
            options,
        }
    }

    /// Get the method identity of the call.
    pub fn op_code(&self) -> OpCode {
        self.op
    }

    /// Get the table the call targets. Empty for calls that do not target a
    /// single table (admin DDL, table listing, some queries).
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Get the call parameters, as sent to the transport.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Get the options in effect for the call.
    pub fn options(&self) -> &OperationOptions {
        &self.options
    }
}
