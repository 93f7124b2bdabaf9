//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::delete_request::DeleteRequest;
use crate::error::CoralErrorCode::{
    IllegalArgument, InvalidAuthorization, MemoryLimitExceeded, RequestTimeout, ServerError,
    TableNotFound,
};
use crate::error::{CoralError, CoralErrorCode};
use crate::events::EventObserver;
use crate::handle::Handle;
use crate::operation::{OpCode, Operation};
use crate::put_request::PutRequest;
use crate::query_request::QueryRequest;
use crate::retry::DefaultRetryHandler;
use crate::table_request::{TableRequest, TableResult};
use crate::transport::{
    response_from_json, AuthorizationProvider, ServiceResponse, Transport,
};
use crate::types::{Capacity, TableState};
use crate::write_batch_request::WriteBatchRequest;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// A transport that replays a scripted sequence of responses. Once the
// script is exhausted it returns the fallback, or errors.
#[derive(Debug, Default)]
struct MockTransport {
    responses: Mutex<VecDeque<Result<ServiceResponse, CoralError>>>,
    fallback: Mutex<Option<Result<ServiceResponse, CoralError>>>,
    calls: AtomicUsize,
    ops: Mutex<Vec<OpCode>>,
}

impl MockTransport {
    fn new() -> Arc<MockTransport> {
        Arc::new(MockTransport::default())
    }

    fn push_json(&self, v: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(response_from_json(v));
    }

    fn push_error(&self, code: CoralErrorCode) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(CoralError::new(code, "scripted error")));
    }

    fn set_fallback_error(&self, code: CoralErrorCode) {
        *self.fallback.lock().unwrap() = Some(Err(CoralError::new(code, "scripted error")));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn ops(&self) -> Vec<OpCode> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        operation: &Operation,
        _timeout: Duration,
    ) -> Result<ServiceResponse, CoralError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().unwrap().push(operation.op_code());
        if let Some(r) = self.responses.lock().unwrap().pop_front() {
            return r;
        }
        if let Some(f) = self.fallback.lock().unwrap().clone() {
            return f;
        }
        Err(CoralError::new(
            CoralErrorCode::IllegalState,
            "mock transport script exhausted",
        ))
    }
}

async fn mock_handle(mt: &Arc<MockTransport>) -> Handle {
    Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .build()
        .await
        .unwrap()
}

fn put_ok_json() -> Value {
    json!({
        "success": true,
        "version": "dG9rZW4=",
        "consumed": {"read_units": 0, "read_kb": 0, "write_units": 1, "write_kb": 1}
    })
}

// ---- retry loop ----

#[tokio::test(start_paused = true)]
async fn retry_ceiling_makes_exactly_max_attempts() {
    let mt = MockTransport::new();
    mt.set_fallback_error(ServerError);
    let h = Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .retry_handler(Arc::new(DefaultRetryHandler::new(
            3,
            Duration::from_millis(1),
        )))
        .unwrap()
        .build()
        .await
        .unwrap();

    let err = PutRequest::new("users")
        .value(json!({"id": 1}))
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, ServerError);
    assert_eq!(mt.calls(), 3);
    // the error keeps the operation that caused it
    let op = err.operation().expect("error should carry its operation");
    assert_eq!(op.op_code(), OpCode::Put);
    assert_eq!(op.table_name(), "users");
}

#[tokio::test(start_paused = true)]
async fn timeout_takes_precedence_over_remaining_retries() {
    let mt = MockTransport::new();
    mt.set_fallback_error(ServerError);
    let h = mock_handle(&mt).await;

    // default policy allows 5 attempts with a 200ms backoff base, but a
    // 500ms budget runs out after the second attempt
    let err = PutRequest::new("users")
        .value(json!({"id": 1}))
        .timeout(&Duration::from_millis(500))
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, RequestTimeout);
    assert_eq!(mt.calls(), 2);
    // the last classified failure is retained as the cause
    assert_eq!(err.cause().expect("timeout should carry a cause").code, ServerError);
}

#[tokio::test]
async fn local_validation_fails_fast_without_dispatch() {
    let mt = MockTransport::new();
    let h = mock_handle(&mt).await;

    let err = crate::get_request::GetRequest::new("users")
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, IllegalArgument);
    assert_eq!(mt.calls(), 0);
}

#[derive(Debug, Default)]
struct CountingAuth {
    refreshes: AtomicUsize,
}

#[async_trait]
impl AuthorizationProvider for CountingAuth {
    fn authorization(&self) -> Result<String, CoralError> {
        Ok("Bearer test".to_string())
    }
    async fn refresh(&self) -> Result<bool, CoralError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn authorization_failure_refreshes_and_retries_once() {
    let mt = MockTransport::new();
    mt.push_error(InvalidAuthorization);
    mt.push_json(put_ok_json());
    let auth = Arc::new(CountingAuth::default());
    let h = Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .authorization_provider(auth.clone())
        .unwrap()
        .build()
        .await
        .unwrap();

    let res = PutRequest::new("users")
        .value(json!({"id": 1}))
        .execute(&h)
        .await
        .unwrap();
    assert!(res.success());
    assert_eq!(mt.calls(), 2);
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn authorization_failure_is_terminal_after_one_retry() {
    let mt = MockTransport::new();
    mt.set_fallback_error(InvalidAuthorization);
    let h = mock_handle(&mt).await;

    let err = PutRequest::new("users")
        .value(json!({"id": 1}))
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, InvalidAuthorization);
    assert_eq!(mt.calls(), 2);
}

#[derive(Debug, Default)]
struct CountingObserver {
    consumed: AtomicUsize,
    retryable: AtomicUsize,
}

impl EventObserver for CountingObserver {
    fn on_consumed_capacity(&self, _op: &Operation, _consumed: &Capacity) {
        self.consumed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_retryable_error(&self, _op: &Operation, _attempt: u32, _error: &CoralError) {
        self.retryable.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn observers_see_retries_and_consumption() {
    let mt = MockTransport::new();
    mt.push_error(ServerError);
    mt.push_json(put_ok_json());
    let obs = Arc::new(CountingObserver::default());
    let h = Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .observer(obs.clone())
        .unwrap()
        .build()
        .await
        .unwrap();

    PutRequest::new("users")
        .value(json!({"id": 1}))
        .execute(&h)
        .await
        .unwrap();
    assert_eq!(obs.retryable.load(Ordering::SeqCst), 1);
    assert_eq!(obs.consumed.load(Ordering::SeqCst), 1);
}

// ---- completion poller ----

#[tokio::test(start_paused = true)]
async fn poller_is_idempotent_on_terminal_results() {
    let mt = MockTransport::new();
    let h = mock_handle(&mt).await;

    let mut res = TableResult {
        table_name: "users".to_string(),
        state: TableState::Active,
        ..Default::default()
    };
    res.wait_for_completion_ms(&h, 5000, 100).await.unwrap();
    // already terminal: no status lookup may be issued
    assert_eq!(mt.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn poller_drives_create_to_active() {
    let mt = MockTransport::new();
    mt.push_json(json!({"table_name": "users", "state": 1, "operation_id": "op-7"}));
    mt.push_json(json!({"table_name": "users", "state": 1}));
    mt.push_json(json!({"table_name": "users", "state": 0, "schema": "{}"}));
    let h = mock_handle(&mt).await;

    let mut res = TableRequest::new("users")
        .statement("create table users (id integer, primary key(id))")
        .execute(&h)
        .await
        .unwrap();
    assert_eq!(res.state(), TableState::Creating);
    res.wait_for_completion_ms(&h, 10000, 100).await.unwrap();
    assert_eq!(res.state(), TableState::Active);
    assert_eq!(mt.calls(), 3);
    assert_eq!(
        mt.ops(),
        vec![OpCode::TableDdl, OpCode::GetTable, OpCode::GetTable]
    );
}

#[tokio::test(start_paused = true)]
async fn poller_times_out_without_reporting_operation_failure() {
    let mt = MockTransport::new();
    // the table stays in Creating forever
    for _ in 0..100 {
        mt.push_json(json!({"table_name": "users", "state": 1}));
    }
    let h = mock_handle(&mt).await;

    let mut res = TableResult {
        table_name: "users".to_string(),
        state: TableState::Creating,
        ..Default::default()
    };
    let err = res
        .wait_for_completion(&h, Duration::from_secs(1), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.code, RequestTimeout);
}

#[tokio::test(start_paused = true)]
async fn poller_propagates_status_lookup_failure() {
    let mt = MockTransport::new();
    mt.push_error(ServerError);
    let h = mock_handle(&mt).await;

    let mut res = TableResult {
        table_name: "users".to_string(),
        state: TableState::Creating,
        ..Default::default()
    };
    let err = res
        .wait_for_completion_ms(&h, 5000, 100)
        .await
        .unwrap_err();
    // the underlying operation failure, not a generic timeout
    assert_eq!(err.code, ServerError);
}

#[tokio::test(start_paused = true)]
async fn dropped_state_treats_missing_table_as_success() {
    let mt = MockTransport::new();
    mt.push_error(TableNotFound);
    let h = mock_handle(&mt).await;

    let res = TableResult::wait_for_state(
        &h,
        "gone_table",
        TableState::Dropped,
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
    .await
    .unwrap();
    assert_eq!(res.state(), TableState::Dropped);
    assert_eq!(mt.calls(), 1);

    // but a missing table can never become Active
    mt.push_error(TableNotFound);
    let err = TableResult::wait_for_state(
        &h,
        "gone_table",
        TableState::Active,
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, TableNotFound);
}

#[tokio::test(start_paused = true)]
async fn replica_init_polls_until_flag_set() {
    let mt = MockTransport::new();
    mt.push_json(json!({"table_name": "users", "state": 0, "replica_initialized": false}));
    mt.push_json(json!({"table_name": "users", "state": 0, "replica_initialized": true}));
    let h = mock_handle(&mt).await;

    let res = TableResult::wait_for_replica_init(
        &h,
        "users",
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
    .await
    .unwrap();
    assert!(res.replica_initialized());
    assert_eq!(mt.calls(), 2);
}

// ---- continuation engine ----

fn page_json(rows: Value, token: Option<&str>) -> Value {
    let mut v = json!({
        "rows": rows,
        "consumed": {"read_units": 1, "read_kb": 1, "write_units": 0, "write_kb": 0}
    });
    if let Some(t) = token {
        v["continuation_key"] = Value::from(t);
    }
    v
}

#[tokio::test]
async fn continuation_loop_stops_exactly_on_token_exhaustion() {
    let mt = MockTransport::new();
    // a non-empty token does not promise more rows: the tail pages are empty
    mt.push_json(page_json(
        json!([{"id": 1}, {"id": 2}, {"id": 3}]),
        Some("dG9rMQ=="),
    ));
    mt.push_json(page_json(json!([]), Some("dG9rMg==")));
    mt.push_json(page_json(json!([]), None));
    let h = mock_handle(&mt).await;

    let res = QueryRequest::new("select * from users")
        .execute(&h)
        .await
        .unwrap();
    assert_eq!(res.rows().len(), 3);
    assert_eq!(mt.calls(), 3);
    // consumed capacity accumulates across every batch
    assert_eq!(res.consumed().read_units, 3);
}

#[tokio::test]
async fn manual_batches_carry_continuation_state() {
    let mt = MockTransport::new();
    mt.push_json(page_json(json!([{"id": 1}]), Some("dG9rMQ==")));
    mt.push_json(page_json(json!([{"id": 2}]), None));
    let h = mock_handle(&mt).await;

    let mut req = QueryRequest::new("select * from users");
    let mut total = 0;
    while !req.is_done() {
        let page = req.execute_batch(&h).await.unwrap();
        total += page.rows().len();
    }
    assert_eq!(total, 2);
    assert_eq!(mt.calls(), 2);
    // a finished request cannot be re-run
    let err = req.execute_batch(&h).await.unwrap_err();
    assert_eq!(err.code, IllegalArgument);
}

#[tokio::test]
async fn iterable_is_lazy_and_not_restartable() {
    let mt = MockTransport::new();
    mt.push_json(page_json(json!([{"id": 1}, {"id": 2}]), Some("dG9rMQ==")));
    mt.push_json(page_json(json!([]), Some("dG9rMg==")));
    mt.push_json(page_json(json!([{"id": 3}]), None));
    let h = mock_handle(&mt).await;

    let mut pages = QueryRequest::new("select * from users").into_iterable(&h);
    // construction has no side effect; the first fetch happens on demand
    assert_eq!(mt.calls(), 0);

    let mut rows = 0;
    let mut page_count = 0;
    while let Some(page) = pages.next_page().await {
        rows += page.unwrap().rows().len();
        page_count += 1;
    }
    assert_eq!(rows, 3);
    assert_eq!(page_count, 3);
    assert_eq!(mt.calls(), 3);
    // exhausted for good: no further fetches
    assert!(pages.next_page().await.is_none());
    assert_eq!(mt.calls(), 3);
}

#[tokio::test]
async fn query_memory_ceiling_fails_fast() {
    let mt = MockTransport::new();
    mt.push_json(page_json(
        json!([{"name": "a string that certainly exceeds ten bytes"}]),
        Some("dG9rMQ=="),
    ));
    let h = Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .max_memory_consumption(10)
        .unwrap()
        .build()
        .await
        .unwrap();

    let err = QueryRequest::new("select * from users")
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, MemoryLimitExceeded);
}

#[tokio::test]
async fn prepare_only_returns_compiled_statement() {
    let mt = MockTransport::new();
    mt.push_json(json!({
        "prepared_statement": "Y29tcGlsZWQ=",
        "table_name": "users",
        "consumed": {"read_units": 1, "read_kb": 1, "write_units": 0, "write_kb": 0}
    }));
    // execution of the prepared statement
    mt.push_json(page_json(json!([{"id": 7}]), None));
    let h = mock_handle(&mt).await;

    let res = QueryRequest::new("select * from users where id = $id")
        .prepare_only()
        .execute(&h)
        .await
        .unwrap();
    let prepared = res.prepared_statement();
    assert!(!prepared.is_empty());
    assert_eq!(prepared.table_name(), Some("users"));

    let mut req = QueryRequest::new_prepared(&prepared);
    req.set_variable("$id", json!(7)).unwrap();
    let res = req.execute(&h).await.unwrap();
    assert_eq!(res.rows().len(), 1);
    assert_eq!(mt.ops(), vec![OpCode::Prepare, OpCode::Query]);
}

// ---- batch write coordinator ----

#[tokio::test]
async fn batch_validation_rejects_bad_batches_locally() {
    let mt = MockTransport::new();
    let h = mock_handle(&mt).await;

    // empty batch
    let err = WriteBatchRequest::new("users")
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, IllegalArgument);

    // too many sub-operations
    let mut big = WriteBatchRequest::new("users");
    for i in 0..51 {
        big = big.add_put(PutRequest::new("").value(json!({"id": i})));
    }
    let err = big.execute(&h).await.unwrap_err();
    assert_eq!(err.code, IllegalArgument);

    // tables that do not share a shard-key ancestor
    let err = WriteBatchRequest::new("users")
        .add_put(PutRequest::new("users").value(json!({"id": 1})))
        .add_delete(DeleteRequest::new("orders", json!({"id": 2})))
        .execute(&h)
        .await
        .unwrap_err();
    assert_eq!(err.code, IllegalArgument);

    // nothing may have reached the transport
    assert_eq!(mt.calls(), 0);
}

#[tokio::test]
async fn batch_allows_child_tables_of_one_ancestor() {
    let mt = MockTransport::new();
    mt.push_json(json!({
        "success_results": [{"success": true}, {"success": true}],
        "consumed": {"read_units": 0, "read_kb": 0, "write_units": 2, "write_kb": 2}
    }));
    let h = mock_handle(&mt).await;

    let res = WriteBatchRequest::new("users")
        .add_put(PutRequest::new("users").value(json!({"id": 1})))
        .add_put(PutRequest::new("users.addresses").value(json!({"id": 1, "seq": 2})))
        .execute(&h)
        .await
        .unwrap();
    assert_eq!(res.results().len(), 2);
    assert_eq!(res.failed_operation_index(), -1);
}

#[tokio::test]
async fn batch_abort_reports_only_the_failing_suboperation() {
    let mt = MockTransport::new();
    mt.push_json(json!({
        "failed_index": 1,
        "failed_result": {"success": false, "existing_version": "dg=="},
        "consumed": {"read_units": 1, "read_kb": 1, "write_units": 0, "write_kb": 0}
    }));
    let h = mock_handle(&mt).await;

    // three puts; the second one's if_absent fails against an existing key
    let res = WriteBatchRequest::new("users")
        .add_put(PutRequest::new("").value(json!({"id": 1})))
        .add_put(
            PutRequest::new("")
                .value(json!({"id": 2}))
                .if_absent()
                .abort_on_fail(true),
        )
        .add_put(PutRequest::new("").value(json!({"id": 3})))
        .execute(&h)
        .await
        .unwrap();

    // a conditional failure is not a call-level error, and the result holds
    // the single aborting outcome rather than an array of three
    assert_eq!(res.failed_operation_index(), 1);
    assert_eq!(res.results().len(), 1);
    assert!(!res.results()[0].success());
}

// ---- rate limiter integration ----

#[tokio::test(start_paused = true)]
async fn rate_limiter_delay_is_surfaced_in_capacity_report() {
    let mt = MockTransport::new();
    // limiter bootstrap fetches the table limits
    mt.push_json(json!({
        "table_name": "users", "state": 0,
        "limits": {"read_units": 100, "write_units": 100, "storage_gb": 1, "mode": "PROVISIONED"}
    }));
    // first put consumes double the one-second burst
    mt.push_json(json!({
        "success": true,
        "consumed": {"read_units": 0, "read_kb": 0, "write_units": 200, "write_kb": 200}
    }));
    mt.push_json(json!({
        "success": true,
        "consumed": {"read_units": 0, "read_kb": 0, "write_units": 1, "write_kb": 1}
    }));
    let h = Handle::builder()
        .transport(mt.clone())
        .unwrap()
        .rate_limiting(true)
        .unwrap()
        .build()
        .await
        .unwrap();

    let first = PutRequest::new("users")
        .value(json!({"id": 1}))
        .execute(&h)
        .await
        .unwrap();
    assert_eq!(first.consumed().unwrap().write_rate_limited_ms, 0);

    // the second put pays the first one's debt before dispatching
    let second = PutRequest::new("users")
        .value(json!({"id": 2}))
        .execute(&h)
        .await
        .unwrap();
    assert!(
        second.consumed().unwrap().write_rate_limited_ms >= 900,
        "expected about 1s of injected delay, got {}ms",
        second.consumed().unwrap().write_rate_limited_ms
    );
    assert_eq!(
        mt.ops(),
        vec![OpCode::GetTable, OpCode::Put, OpCode::Put]
    );
}
