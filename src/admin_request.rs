//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralErrorCode::RequestTimeout;
use crate::error::{ia_err, CoralError};
use crate::handle::Handle;
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::transport::ServiceResponse;
use crate::types::OperationState;
use serde_json::{Map, Value};
use std::result::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Struct used for on-premise-only administrative requests.
///
/// This is used to perform any table-independent administrative operation
/// such as create/drop of namespaces and security-relevant operations
/// (create/drop users and roles).
///
/// Examples of statements used in this object include:
///  - CREATE NAMESPACE mynamespace
///  - CREATE USER some_user IDENTIFIED BY password
///  - CREATE ROLE some_role
///  - GRANT ROLE some_role TO USER some_user
///
/// Execution of operations specified by this request is implicitly
/// asynchronous. These are potentially long-running operations.
/// [`AdminRequest::execute()`] returns an [`AdminResult`] instance that
/// can be used to poll until the operation succeeds or fails; see
/// [`AdminResult::wait_for_completion()`].
#[derive(Default, Debug)]
pub struct AdminRequest {
    pub(crate) statement: String,
    pub(crate) timeout: Option<Duration>,
}

/// Struct used to query the status of an in-progress [`AdminRequest`].
#[derive(Default, Debug)]
pub(crate) struct AdminStatusRequest {
    pub operation_id: String,
    pub timeout: Option<Duration>,
}

/// Struct representing the result of an [`AdminRequest`].
#[derive(Default, Debug)]
pub struct AdminResult {
    pub(crate) operation_id: String,
    pub(crate) state: OperationState,
    pub(crate) statement: String,
    pub(crate) result_string: String,
}

impl AdminRequest {
    /// Create a new AdminRequest. `statement` must be non-empty.
    pub fn new(statement: &str) -> AdminRequest {
        AdminRequest {
            statement: statement.to_string(),
            ..Default::default()
        }
    }

    /// Specify the timeout value for the request.
    ///
    /// This is optional.
    /// If not set, the default timeout value configured for the [`Handle`](crate::HandleBuilder::timeout()) is used.
    ///
    /// Note this is just the timeout for the initial request. The actual
    /// operation may take significantly longer, and its completion should be
    /// waited for by calling [`AdminResult::wait_for_completion()`].
    pub fn timeout(mut self, t: &Duration) -> AdminRequest {
        self.timeout = Some(*t);
        self
    }

    /// Execute the admin request.
    ///
    /// This starts the asynchronous execution of the request in the system. The returned result should be
    /// used to wait for completion by calling [`AdminResult::wait_for_completion()`].
    pub async fn execute(&self, h: &Handle) -> Result<AdminResult, CoralError> {
        if self.statement.is_empty() {
            return ia_err!("admin request requires a non-empty statement");
        }
        let mut payload: Map<String, Value> = Map::new();
        payload.insert("statement".to_string(), Value::from(self.statement.clone()));
        let op = Operation::new(
            OpCode::AdminDdl,
            "",
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                ..Default::default()
            },
        );
        let mut resp = h.execute_op(op).await?;
        AdminResult::from_response(&mut resp)
    }
}

impl AdminStatusRequest {
    pub fn new(operation_id: &str) -> AdminStatusRequest {
        AdminStatusRequest {
            operation_id: operation_id.to_string(),
            ..Default::default()
        }
    }

    pub async fn execute(&self, h: &Handle) -> Result<AdminResult, CoralError> {
        if self.operation_id.is_empty() {
            return ia_err!("admin status request requires an operation id");
        }
        let mut payload: Map<String, Value> = Map::new();
        payload.insert(
            "operation_id".to_string(),
            Value::from(self.operation_id.clone()),
        );
        let op = Operation::new(
            OpCode::AdminStatus,
            "",
            payload,
            OperationOptions {
                timeout: h.get_timeout(&self.timeout),
                ..Default::default()
            },
        );
        let mut resp = h.execute_op(op).await?;
        AdminResult::from_response(&mut resp)
    }
}

impl AdminResult {
    fn from_response(resp: &mut ServiceResponse) -> Result<AdminResult, CoralError> {
        let mut res = AdminResult::default();
        res.operation_id = resp.string_field("operation_id").unwrap_or_default();
        res.statement = resp.string_field("statement").unwrap_or_default();
        res.result_string = resp.string_field("result_string").unwrap_or_default();
        if let Some(s) = resp.i32_field("state") {
            res.state = OperationState::from_int(s)?;
        }
        Ok(res)
    }

    /// Wait for an AdminRequest to complete.
    ///
    /// This method will loop, polling the system for the status of the
    /// operation until it either succeeds, gets an error, or times out.
    /// The result is updated in place on each poll. A result that is
    /// already [`Complete`](OperationState::Complete) returns immediately
    /// without any status lookup.
    ///
    /// If the status lookup reports that the operation itself failed, that
    /// failure is returned as-is; a [`RequestTimeout`](crate::CoralErrorCode::RequestTimeout)
    /// is raised only when cumulative polling time exceeds `wait`.
    pub async fn wait_for_completion(
        &mut self,
        h: &Handle,
        wait: Duration,
        delay: Duration,
    ) -> Result<(), CoralError> {
        if self.state == OperationState::Complete {
            return Ok(());
        }
        if wait < delay {
            return ia_err!("wait duration must be greater than delay duration");
        }

        let start_time = Instant::now();
        let mut first_loop = true;

        while self.state != OperationState::Complete {
            if start_time.elapsed() > wait {
                return Err(CoralError::new(
                    RequestTimeout,
                    "Operation not completed in expected time",
                ));
            }

            if !first_loop {
                sleep(delay).await;
            }

            let res = AdminStatusRequest::new(self.operation_id.as_str())
                .execute(h)
                .await?;

            // operation_id and statement do not change
            self.state = res.state;
            self.result_string = res.result_string;

            first_loop = false;
        }

        Ok(())
    }

    /// Wait for an AdminRequest to complete.
    ///
    /// This is a convenience method to allow direct millisecond values instead of creating
    /// `Duration` structs. See [`wait_for_completion()`](AdminResult::wait_for_completion()).
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

    /// Get the operation id of the admin operation, used internally when
    /// polling for completion.
    pub fn operation_id(&self) -> String {
        self.operation_id.clone()
    }
    /// Get the current state of the operation.
    pub fn state(&self) -> OperationState {
        self.state
    }
    /// Get the statement that started the operation.
    pub fn statement(&self) -> String {
        self.statement.clone()
    }
    /// Get the operation's result text, if any. For example, a `SHOW`
    /// statement returns its output here.
    pub fn result_string(&self) -> String {
        self.result_string.clone()
    }
}
