//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralErrorCode::{IllegalState, MemoryLimitExceeded};
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::prepared_statement::PreparedStatement;
use crate::types::{Capacity, Consistency, ContinuationToken, FieldValue, MapValue};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;
use tracing::trace;

/// Encapsulates a SQL query of a CoralDB table.
///
/// A query may be either a string query statement or a prepared query, which
/// may include bind variables. A query request cannot have both a string
/// statement and prepared query, but it must have one or the other.
///
/// Query compilation and evaluation happen in the service; the driver only
/// forwards per-fetch limits, loops on the continuation protocol, and
/// surfaces the server's actual consumption.
///
/// ## Simple Example
/// Here is a simple example of running a query that will return every row in
/// a table named `users`:
///
/// ```no_run
/// # use coraldb::{Handle, QueryRequest};
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = Handle::builder().build().await?;
/// let results = QueryRequest::new("select * from users")
///     .execute(&handle).await?;
/// for row in results.rows() {
///     println!("Row = {:?}", row);
/// }
/// # Ok(())
/// # }
/// ```
///
/// For performance reasons, prepared queries are preferred for queries that
/// may be reused. Prepared queries bypass compilation of the query. They
/// also allow for parameterized queries using bind variables; see
/// [`PreparedStatement`].
///
/// ## Consumption modes
///
/// There are three ways to consume a query's results:
/// - [`execute()`](QueryRequest::execute()): loop internally until the query
///   is exhausted and return all rows in one result. Memory-bounded by
///   [`HandleBuilder::max_memory_consumption()`](crate::HandleBuilder::max_memory_consumption()).
/// - [`execute_batch()`](QueryRequest::execute_batch()) in a loop until
///   [`is_done()`](QueryRequest::is_done()): one server round-trip per call,
///   with the continuation state carried inside the request. Note that any
///   one batch may legitimately return zero rows with more batches still to
///   come, and the final batch may be empty.
/// - [`into_iterable()`](QueryRequest::into_iterable()): a lazy, forward-only
///   page sequence. See [`QueryIterable`].
#[derive(Default, Debug)]
pub struct QueryRequest {
    // statement specifies a query statement string, compiled by the service
    // on first execution.
    statement: Option<String>,

    // prepared_statement specifies the prepared query statement.
    pub(crate) prepared_statement: PreparedStatement,

    pub(crate) table_name: String,
    pub(crate) prepare_only: bool,
    pub(crate) limit: u32,
    pub(crate) max_read_kb: u32,
    pub(crate) max_write_kb: u32,
    pub(crate) consistency: Consistency,
    pub(crate) timeout: Option<Duration>,
    pub(crate) namespace: String,

    pub(crate) continuation_key: Option<ContinuationToken>,
    pub(crate) is_done: bool,
    pub(crate) consumed_capacity: Capacity,

    // total number of batches executed
    pub(crate) batch_counter: i32,
}

/// Struct representing the result of a query operation, or of one batch of
/// a query operation.
#[derive(Default, Debug)]
pub struct QueryResult {
    pub(crate) rows: Vec<MapValue>,
    pub(crate) prepared_statement: PreparedStatement,
    pub(crate) consumed: Capacity,
}

impl QueryResult {
    /// Get the query result rows, if any.
    ///
    /// If the query returned no rows, this will return a reference to an empty vector.
    /// Otherwise, it will return a reference to the rows in the order specified by the query.
    pub fn rows(&self) -> &Vec<MapValue> {
        &self.rows
    }
    /// Take the query result rows, setting the result back to an empty vector.
    ///
    /// If the query returned no rows, this will return an empty vector.
    /// Otherwise, it will return the rows in the vector, giving the ownership
    /// of the rows to the caller.
    pub fn take_rows(&mut self) -> Vec<MapValue> {
        std::mem::take(&mut self.rows)
    }
    /// Get the prepared statement after execution of a query.
    ///
    /// The prepared statement can then be used in subsequent query requests, saving the
    /// extra step of preparing each query again. Empty unless the execution
    /// prepared the query (see [`QueryRequest::prepare_only()`]) or the
    /// service returned the compiled form alongside the first batch.
    pub fn prepared_statement(&self) -> PreparedStatement {
        self.prepared_statement.clone()
    }
    /// Return the total capacity that was consumed during the execution of the query.
    ///
    /// For [`QueryRequest::execute()`] this covers every batch the execution
    /// performed; for a single batch it covers that batch alone.
    pub fn consumed(&self) -> &Capacity {
        &self.consumed
    }
}

impl QueryRequest {
    /// Create a new QueryRequest from a SQL query string.
    ///
    /// While this struct is named `QueryRequest`, the SQL supplied to it does not
    /// necessarily have to be a `SELECT` query. It could also be one of `INSERT`, `UPDATE`,
    /// or `DELETE`.
    ///
    /// Note: this request should not be used for DDL statements (those that
    /// create or modify tables or indexes, such as `CREATE TABLE`). For DDL
    /// statements, use [`TableRequest`](crate::TableRequest) instead.
    pub fn new(statement: &str) -> QueryRequest {
        QueryRequest {
            statement: Some(statement.to_string()),
            ..Default::default()
        }
    }

    /// Create a new QueryRequest from a previously prepared query statement.
    ///
    /// Use of this method is recommended when executing the same type of query multiple
    /// times with different values for parameters. Doing so will save resources by not
    /// re-preparing the query on every execution.
    ///
    /// To set bind variables for query execution, first create the request with this method,
    /// then call [`QueryRequest::set_variable()`] for all desired bind variables. Then execute the
    /// query with [`QueryRequest::execute()`].
    pub fn new_prepared(prepared_statement: &PreparedStatement) -> QueryRequest {
        QueryRequest {
            table_name: prepared_statement
                .table_name
                .clone()
                .unwrap_or_default(),
            prepared_statement: prepared_statement.clone(),
            ..Default::default()
        }
    }

    /// Specify that this query execution should only prepare the query.
    ///
    /// Setting this value and then calling [`QueryRequest::execute()`]
    /// will result in only the query being prepared, and no result rows being returned.
    /// The prepared statement can then be retrieved using [`QueryResult::prepared_statement()`]
    /// and can be used in subsequent query calls using [`QueryRequest::new_prepared()`].
    pub fn prepare_only(mut self) -> QueryRequest {
        self.prepare_only = true;
        self
    }

    /// Specify the table the query operates on.
    ///
    /// This is optional and advisory: it routes the request's authorization
    /// and rate limiting. The query statement itself names the tables it
    /// reads and writes.
    pub fn table_name(mut self, table_name: &str) -> QueryRequest {
        self.table_name = table_name.to_string();
        self
    }

    /// Specify the desired consistency policy for the request.
    ///
    /// If not set, the default consistency of [`Consistency::Eventual`] is used.
    pub fn consistency(mut self, c: Consistency) -> QueryRequest {
        self.consistency = c;
        self
    }

    /// Specify a limit on the number of rows returned by a single batch
    /// operation. Zero means no application-defined limit.
    ///
    /// Like the KB limits, this is forwarded to the service and enforced
    /// there; a batch may still return fewer rows for other reasons.
    pub fn limit(mut self, limit: u32) -> QueryRequest {
        self.limit = limit;
        self
    }

    /// Specify the limit on the total data read during a single batch operation, in KB.
    ///
    /// This value can only reduce the system defined limit. An attempt to
    /// increase the limit beyond the system defined limit will cause an
    /// IllegalArgument error. This limit is independent of read units
    /// consumed by the operation, and is enforced by the service.
    ///
    /// It is recommended that for tables with relatively low provisioned read
    /// throughput that this limit be set to less than or equal to one half
    /// of the provisioned throughput in order to reduce the possibility of throttling
    /// errors.
    pub fn max_read_kb(mut self, max: u32) -> QueryRequest {
        self.max_read_kb = max;
        self
    }

    /// Specify the limit on the total data written during a single batch
    /// operation, in KB. Only meaningful for updating queries.
    ///
    /// This value can only reduce the system defined limit. This limit is
    /// independent of write units consumed by the operation, and is enforced
    /// by the service.
    pub fn max_write_kb(mut self, max: u32) -> QueryRequest {
        self.max_write_kb = max;
        self
    }

    /// Specify the timeout value for the request.
    ///
    /// The timeout applies to each batch individually, not to a whole
    /// [`execute()`](QueryRequest::execute()) loop.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    pub fn timeout(mut self, t: &Duration) -> QueryRequest {
        self.timeout = Some(*t);
        self
    }

    /// On-premises only: set the namespace for the operation.
    pub fn namespace(mut self, namespace: &str) -> QueryRequest {
        self.namespace = namespace.to_string();
        self
    }

    /// Set a named bind variable for execution of a prepared query.
    ///
    /// See [`PreparedStatement`] for an example of using this method.
    pub fn set_variable(&mut self, name: &str, value: FieldValue) -> Result<(), CoralError> {
        if self.prepared_statement.is_empty() {
            return ia_err!("cannot set bind variables: no prepared statement in QueryRequest");
        }
        self.prepared_statement.set_variable(name, value);
        Ok(())
    }

    /// Determine if the query is complete.
    ///
    /// If using [`QueryRequest::execute_batch()`] in a loop, this method determines when
    /// to terminate the loop, specifying that no more results exist for this query execution.
    pub fn is_done(&self) -> bool {
        self.is_done
    }

    fn reset(&mut self) {
        self.is_done = false;
        self.continuation_key = None;
        self.consumed_capacity = Capacity::default();
        self.batch_counter = 0;
    }

    /// Execute the query to full completion.
    ///
    /// This is the preferred method for execution of a query. Internally, this method will loop
    /// calling [`execute_batch()`](QueryRequest::execute_batch()) until all
    /// results are returned.
    ///
    /// Each call starts the query over from the beginning. The rows of every
    /// batch are buffered at the client; if the buffered size exceeds the
    /// handle's configured memory ceiling the call fails fast with
    /// [`MemoryLimitExceeded`](crate::CoralErrorCode::MemoryLimitExceeded).
    ///
    /// If the query has no rows to return, [`QueryResult::rows()`] will return an empty vector.
    pub async fn execute(&mut self, h: &Handle) -> Result<QueryResult, CoralError> {
        self.reset();
        let mut rows: Vec<MapValue> = Vec::new();
        let mut buffered: u64 = 0;
        let limit = h.inner.max_memory_consumption;
        loop {
            let mut page = self.execute_batch(h).await?;
            for row in page.take_rows() {
                buffered += estimated_size(&row);
                rows.push(row);
            }
            if buffered > limit {
                return Err(CoralError::new(
                    MemoryLimitExceeded,
                    &format!(
                        "query buffered {} bytes at the client, over the limit of {}",
                        buffered, limit
                    ),
                ));
            }
            if self.is_done {
                break;
            }
        }
        Ok(QueryResult {
            rows,
            prepared_statement: self.prepared_statement.clone(),
            consumed: self.consumed_capacity,
        })
    }

    /// Execute one batch of a query.
    ///
    /// This will execute at most one round-trip to the server. It should be called in a loop
    /// until [`is_done()`](QueryRequest::is_done()) returns `true`; the
    /// continuation state between batches is carried inside the request.
    /// Note that any one batch execution may return no rows while the query
    /// is still not done, and that the final batch may be empty.
    pub async fn execute_batch(&mut self, h: &Handle) -> Result<QueryResult, CoralError> {
        if self.is_done {
            return ia_err!("query is complete; a new request must be created to run it again");
        }
        // runaway guard: a server continually returning tokens would
        // otherwise loop forever in execute()
        self.batch_counter += 1;
        if self.batch_counter > 10000 {
            return Err(CoralError::new(
                IllegalState,
                "query exceeded 10000 batches without completing",
            ));
        }

        let op = self.build_operation(h)?;
        trace!(
            "query batch {} (continuation={})",
            self.batch_counter,
            self.continuation_key.is_some()
        );
        let mut resp = h.execute_op(op).await?;

        // a compiled statement may come back with the first batch; keep it
        // for continuations and for reuse by the application
        if let Some(b) = resp.binary_field("prepared_statement")? {
            self.prepared_statement.statement = b;
            if self.prepared_statement.table_name.is_none() {
                self.prepared_statement.table_name = resp.string_field("table_name");
            }
        }

        let mut rows: Vec<MapValue> = Vec::new();
        if let Some(Value::Array(items)) = resp.take_field("rows") {
            rows.reserve(items.len());
            for item in items {
                match item {
                    Value::Object(m) => rows.push(m),
                    _ => {
                        return Err(CoralError::new(
                            crate::error::CoralErrorCode::BadProtocolMessage,
                            "query row is not a JSON object",
                        ));
                    }
                }
            }
        }

        if self.prepare_only {
            self.is_done = true;
        } else {
            self.continuation_key = resp.token_field("continuation_key")?;
            self.is_done = self.continuation_key.is_none();
        }

        let consumed = resp.consumed.take().unwrap_or_default();
        self.consumed_capacity.add(&consumed);

        Ok(QueryResult {
            rows,
            prepared_statement: self.prepared_statement.clone(),
            consumed,
        })
    }

    /// Turn this request into a lazy page sequence. See [`QueryIterable`].
    pub fn into_iterable(mut self, h: &Handle) -> QueryIterable {
        self.reset();
        QueryIterable {
            request: self,
            handle: h.clone(),
            started: false,
        }
    }

    fn build_operation(&self, h: &Handle) -> Result<Operation, CoralError> {
        let mut payload: Map<String, Value> = Map::new();
        let op_code;
        if self.prepare_only {
            let stmt = match &self.statement {
                Some(s) if !s.is_empty() => s,
                _ => {
                    return ia_err!("prepare requires a non-empty statement string");
                }
            };
            op_code = OpCode::Prepare;
            payload.insert("statement".to_string(), Value::from(stmt.clone()));
        } else if !self.prepared_statement.is_empty() {
            op_code = OpCode::Query;
            payload.insert(
                "prepared_statement".to_string(),
                Value::from(BASE64_STANDARD.encode(&self.prepared_statement.statement)),
            );
            if !self.prepared_statement.bind_variables.is_empty() {
                let mut binds: Map<String, Value> = Map::new();
                for (k, v) in &self.prepared_statement.bind_variables {
                    binds.insert(k.clone(), v.clone());
                }
                payload.insert("bind_variables".to_string(), Value::Object(binds));
            }
        } else {
            let stmt = match &self.statement {
                Some(s) if !s.is_empty() => s,
                _ => {
                    return ia_err!(
                        "query requires either a statement string or a prepared statement"
                    );
                }
            };
            op_code = OpCode::Query;
            payload.insert("statement".to_string(), Value::from(stmt.clone()));
        }
        if self.limit > 0 {
            payload.insert("limit".to_string(), Value::from(self.limit));
        }
        if self.max_read_kb > 0 {
            payload.insert("max_read_kb".to_string(), Value::from(self.max_read_kb));
        }
        if self.max_write_kb > 0 {
            payload.insert("max_write_kb".to_string(), Value::from(self.max_write_kb));
        }
        payload.insert(
            "consistency".to_string(),
            Value::from(self.consistency.as_str()),
        );
        if let Some(ck) = &self.continuation_key {
            payload.insert(
                "continuation_key".to_string(),
                Value::from(ck.to_base64()),
            );
        }
        Ok(Operation::new(
            op_code,
            &self.table_name,
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                namespace: self.namespace.clone(),
            },
        ))
    }
}

/// A lazy, asynchronous, forward-only sequence of query result pages.
///
/// Constructing the iterable performs no work; the first fetch happens when
/// [`next_page()`](QueryIterable::next_page()) is first called. The sequence
/// ends - `next_page()` returns `None` - exactly when the server stops
/// returning a continuation token. Callers must not assume any page,
/// including the last, is non-empty.
///
/// The iterable is **not restartable**: construct a fresh one (from a new
/// [`QueryRequest`]) for each logical execution of the query. Abandoning an
/// iterable mid-stream is allowed at any point and needs no cleanup; an
/// unconsumed continuation token pins no server-side resources.
///
/// ```no_run
/// # use coraldb::{Handle, QueryRequest};
/// # #[tokio::main]
/// # pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let handle = Handle::builder().build().await?;
/// let mut pages = QueryRequest::new("select * from users").into_iterable(&handle);
/// while let Some(page) = pages.next_page().await {
///     for row in page?.rows() {
///         println!("Row = {:?}", row);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueryIterable {
    request: QueryRequest,
    handle: Handle,
    started: bool,
}

impl QueryIterable {
    /// Fetch the next page of results. Returns `None` once the query is
    /// exhausted. A failed fetch ends the sequence; the error is returned
    /// once and subsequent calls return `None`.
    pub async fn next_page(&mut self) -> Option<Result<QueryResult, CoralError>> {
        if self.started && self.request.is_done {
            return None;
        }
        self.started = true;
        match self.request.execute_batch(&self.handle).await {
            Ok(page) => Some(Ok(page)),
            Err(e) => {
                self.request.is_done = true;
                Some(Err(e))
            }
        }
    }

    /// Total capacity consumed by the pages fetched so far.
    pub fn consumed(&self) -> &Capacity {
        &self.request.consumed_capacity
    }
}

// rough per-row footprint used for the client memory ceiling
fn estimated_size(row: &MapValue) -> u64 {
    serde_json::to_vec(row).map(|b| b.len() as u64).unwrap_or(0)
}
