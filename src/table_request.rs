//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralErrorCode::{RequestTimeout, TableNotFound};
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::transport::ServiceResponse;
use crate::types::{TableLimits, TableState};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Struct used for creating or modifying a table in CoralDB.
///
/// This is the main method for creating, altering, and dropping tables.
/// It can also be used to alter table limits.
///
/// Table DDL executes asynchronously in the system: `execute()` returns as
/// soon as the operation is accepted, and the returned [`TableResult`]
/// should be used to wait for completion by calling
/// [`TableResult::wait_for_completion()`].
///
/// Example:
/// ```no_run
/// use coraldb::TableRequest;
/// use coraldb::types::TableLimits;
/// # use coraldb::Handle;
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let handle = Handle::builder().build().await?;
///     // Create an example table
///     TableRequest::new("testusers")
///         .statement(
///             "create table if not exists testusers (id integer, name string,
///             created timestamp(3), primary key(id))",
///         )
///         .limits(&TableLimits::provisioned(1000, 1000, 10))
///         .execute(&handle)
///         .await?
///         // wait up to 15 seconds for table to be created
///         .wait_for_completion_ms(&handle, 15000, 500)
///         .await?;
/// # Ok(())
/// # }
///```
#[derive(Default, Debug)]
pub struct TableRequest {
    pub(crate) table_name: String,
    pub(crate) namespace: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) statement: String,
    pub(crate) limits: Option<TableLimits>,
    pub(crate) match_etag: Option<String>,
}

/// Struct used to get information about a table in CoralDB.
#[derive(Default, Debug)]
pub struct GetTableRequest {
    pub(crate) table_name: String,
    pub(crate) namespace: String,
    pub(crate) operation_id: String,
    pub(crate) timeout: Option<Duration>,
}

/// Struct representing the result of a [`TableRequest`] or a [`GetTableRequest`].
#[derive(Default, Debug)]
pub struct TableResult {
    pub(crate) table_name: String,
    pub(crate) namespace: String,
    pub(crate) ddl: String,
    pub(crate) operation_id: String,
    pub(crate) schema: String,
    pub(crate) state: TableState,
    pub(crate) limits: Option<TableLimits>,
    pub(crate) match_etag: Option<String>,
    pub(crate) replica_initialized: bool,
}

impl TableRequest {
    /// Create a new TableRequest.
    ///
    /// `table_name` is required and must be non-empty.
    pub fn new(table_name: &str) -> TableRequest {
        TableRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    ///
    /// Note this is just the timeout for the initial request. The actual operation may take significantly longer,
    /// and its completion should be waited for by calling [`TableResult::wait_for_completion()`].
    pub fn timeout(mut self, t: &Duration) -> TableRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> TableRequest {
        self.namespace = namespace.to_string();
        self
    }

    /// Set the DDL statement for the table operation.
    ///
    /// This is required, unless the operation is used solely to change the table
    /// limits with [`TableRequest::limits()`].
    pub fn statement(mut self, stmt: &str) -> TableRequest {
        self.statement = stmt.to_string();
        self
    }

    /// Specify table limits for the table.
    ///
    /// This method can be used when creating a table, or later to change the
    /// limits on an existing table.
    pub fn limits(mut self, limits: &TableLimits) -> TableRequest {
        self.limits = Some(limits.clone());
        self
    }

    /// Set a matching tag for the operation to succeed.
    ///
    /// This method sets an ETag in the request that must be matched for the operation
    /// to proceed. The ETag must be non-empty and have been returned in a
    /// previous [`TableResult`]. This is a form of optimistic concurrency
    /// control, allowing an application to ensure that no unexpected modifications
    /// have been made to the table.
    pub fn match_etag(mut self, match_etag: &str) -> TableRequest {
        self.match_etag = Some(match_etag.to_string());
        self
    }

    /// Execute the table request.
    ///
    /// This starts the asynchronous execution of the request in the system. The returned result should be
    /// used to wait for completion by calling [`TableResult::wait_for_completion()`].
    pub async fn execute(&self, h: &Handle) -> Result<TableResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        if self.statement.is_empty() && self.limits.is_none() {
            return ia_err!("table request requires a statement or limits");
        }
        let mut payload: Map<String, Value> = Map::new();
        if !self.statement.is_empty() {
            payload.insert("statement".to_string(), Value::from(self.statement.clone()));
        }
        if let Some(limits) = &self.limits {
            payload.insert("limits".to_string(), limits.to_json());
        }
        if let Some(etag) = &self.match_etag {
            payload.insert("match_etag".to_string(), Value::from(etag.clone()));
        }
        let op = Operation::new(
            OpCode::TableDdl,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        // limits may be changing; stale rate limiter buckets would throttle
        // against the old values
        h.invalidate_limiters(&self.table_name);
        TableResult::from_response(&mut resp)
    }
}

impl GetTableRequest {
    pub fn new(table_name: &str) -> GetTableRequest {
        GetTableRequest {
            table_name: table_name.to_string(),
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> GetTableRequest {
        self.timeout = Some(*t);
        self
    }

    /// Set the operation id of an in-progress table DDL whose status should
    /// be reflected in the result. This is typically not needed by
    /// applications; internally, [`TableResult::wait_for_completion()`] uses
    /// this value when polling the system.
    pub fn operation_id(mut self, op_id: &str) -> GetTableRequest {
        self.operation_id = op_id.to_string();
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> GetTableRequest {
        self.namespace = namespace.to_string();
        self
    }

    pub async fn execute(&self, h: &Handle) -> Result<TableResult, CoralError> {
        if self.table_name.is_empty() {
            return ia_err!("table name must be non-empty");
        }
        let mut payload: Map<String, Value> = Map::new();
        if !self.operation_id.is_empty() {
            payload.insert(
                "operation_id".to_string(),
                Value::from(self.operation_id.clone()),
            );
        }
        let op = Operation::new(
            OpCode::GetTable,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        );
        let mut resp = h.execute_op(op).await?;
        TableResult::from_response(&mut resp)
    }
}

impl TableResult {
    fn from_response(resp: &mut ServiceResponse) -> Result<TableResult, CoralError> {
        let mut res = TableResult::default();
        res.table_name = resp.string_field("table_name").unwrap_or_default();
        res.namespace = resp.string_field("namespace").unwrap_or_default();
        res.ddl = resp.string_field("ddl").unwrap_or_default();
        res.schema = resp.string_field("schema").unwrap_or_default();
        res.operation_id = resp.string_field("operation_id").unwrap_or_default();
        if let Some(s) = resp.i32_field("state") {
            res.state = TableState::from_int(s)?;
        }
        if let Some(l) = resp.take_field("limits") {
            res.limits = TableLimits::from_json(&l);
        }
        res.match_etag = resp.string_field("match_etag");
        res.replica_initialized = resp.bool_field("replica_initialized").unwrap_or(false);
        Ok(res)
    }

    /// Wait for a TableRequest to complete.
    ///
    /// This method will loop, polling the system for the status of the
    /// table operation until it either succeeds, gets an error, or times out.
    /// The result is updated in place on each poll, so the caller's binding
    /// reflects the terminal state. A result that is already terminal
    /// returns immediately without any status lookup.
    ///
    /// `wait` bounds the cumulative polling time; exceeding it raises a
    /// [`RequestTimeout`](crate::CoralErrorCode::RequestTimeout) error,
    /// which does not mean the table operation itself failed. `delay` is
    /// the pause between polls.
    pub async fn wait_for_completion(
        &mut self,
        h: &Handle,
        wait: Duration,
        delay: Duration,
    ) -> Result<(), CoralError> {
        if self.is_terminal() {
            return Ok(());
        }
        if wait < delay {
            return ia_err!("wait duration must be greater than delay duration");
        }

        let start_time = Instant::now();
        let mut first_loop = true;

        while self.is_terminal() == false {
            if start_time.elapsed() > wait {
                return Err(CoralError::new(
                    RequestTimeout,
                    "operation not completed in expected time",
                ));
            }

            let get_request = GetTableRequest::new(self.table_name.as_str())
                .operation_id(self.operation_id.as_str())
                .namespace(self.namespace.as_str());

            if !first_loop {
                sleep(delay).await;
            }

            let res = get_request.execute(h).await?;

            self.state = res.state;
            self.limits = res.limits;
            self.schema = res.schema;
            self.ddl = res.ddl;
            self.match_etag = res.match_etag;
            self.replica_initialized = res.replica_initialized;

            first_loop = false;
        }

        Ok(())
    }

    /// Wait for a TableRequest to complete.
    ///
    /// This is a convenience method to allow direct millisecond values instead of creating
    /// `Duration` structs. See [`wait_for_completion()`](TableResult::wait_for_completion()).
    pub async fn wait_for_completion_ms(
        &mut self,
        h: &Handle,
        wait_ms: u64,
        delay_ms: u64,
    ) -> Result<(), CoralError> {
        self.wait_for_completion(
            h,
            Duration::from_millis(wait_ms),
            Duration::from_millis(delay_ms),
        )
        .await
    }

    /// Wait for a table to reach a specific state, polling by table name
    /// alone.
    ///
    /// This is useful when the caller does not hold the [`TableResult`] of
    /// the originating DDL - for example, when the DDL was issued by a
    /// different process. Since the goal state of a drop is "the table does
    /// not exist", waiting for [`TableState::Dropped`] treats a missing
    /// table as success; waiting for any other state propagates the
    /// [`TableNotFound`](crate::CoralErrorCode::TableNotFound) failure.
    pub async fn wait_for_state(
        h: &Handle,
        table_name: &str,
        state: TableState,
        wait: Duration,
        delay: Duration,
    ) -> Result<TableResult, CoralError> {
        Self::poll_table(h, table_name, wait, delay, |res| res.state == state, state).await
    }

    /// Wait for a table replica's local initialization to finish.
    ///
    /// After a replica is added to a table, its contents are initialized
    /// from the sender asynchronously. This polls the table until the
    /// service reports the local replica initialized.
    pub async fn wait_for_replica_init(
        h: &Handle,
        table_name: &str,
        wait: Duration,
        delay: Duration,
    ) -> Result<TableResult, CoralError> {
        Self::poll_table(
            h,
            table_name,
            wait,
            delay,
            |res| res.replica_initialized,
            TableState::Active,
        )
        .await
    }

    // Shared poll/sleep/timeout skeleton for the by-name variants.
    async fn poll_table(
        h: &Handle,
        table_name: &str,
        wait: Duration,
        delay: Duration,
        done: impl Fn(&TableResult) -> bool,
        target: TableState,
    ) -> Result<TableResult, CoralError> {
        if wait < delay {
            return ia_err!("wait duration must be greater than delay duration");
        }
        let start_time = Instant::now();
        let mut first_loop = true;

        loop {
            if start_time.elapsed() > wait {
                return Err(CoralError::new(
                    RequestTimeout,
                    "table did not reach the expected state in expected time",
                ));
            }

            if !first_loop {
                sleep(delay).await;
            }
            first_loop = false;

            match GetTableRequest::new(table_name).execute(h).await {
                Ok(res) => {
                    if done(&res) {
                        return Ok(res);
                    }
                }
                Err(e) => {
                    if e.code == TableNotFound && target == TableState::Dropped {
                        // the goal state of a drop is "does not exist"
                        return Ok(TableResult {
                            table_name: table_name.to_string(),
                            state: TableState::Dropped,
                            ..Default::default()
                        });
                    }
                    return Err(e);
                }
            }
        }
    }

    fn is_terminal(&self) -> bool {
        self.state == TableState::Active || self.state == TableState::Dropped
    }

    /// Get the table name.
    pub fn table_name(&self) -> String {
        self.table_name.clone()
    }
    /// On-premises only: get the namespace of the table.
    pub fn namespace(&self) -> String {
        self.namespace.clone()
    }
    /// Get the DDL statement that was used to create the table.
    ///
    /// Note this will reflect any `ALTER TABLE` operations as well.
    pub fn ddl(&self) -> String {
        self.ddl.clone()
    }
    /// Get the internal operation ID for an in-progress table request.
    ///
    /// This is typically not needed by applications; it is available for testing purposes only.
    /// Internally, [`TableResult::wait_for_completion()`] uses this value when polling the system.
    pub fn operation_id(&self) -> String {
        self.operation_id.clone()
    }
    /// Get the schema of the table.
    ///
    /// Note this will reflect any `ALTER TABLE` operations as well.
    pub fn schema(&self) -> String {
        self.schema.clone()
    }
    /// Get the current state of the table.
    pub fn state(&self) -> TableState {
        self.state
    }
    /// Get the table limits.
    pub fn limits(&self) -> Option<TableLimits> {
        self.limits.clone()
    }
    /// Get the match ETag for the table.
    ///
    /// see [`TableRequest::match_etag()`] for more details.
    pub fn match_etag(&self) -> Option<String> {
        self.match_etag.clone()
    }
    /// Determine if the local replica of the table has finished
    /// initializing. Only meaningful for replicated tables.
    pub fn replica_initialized(&self) -> bool {
        self.replica_initialized
    }
}
