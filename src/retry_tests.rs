//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::{CoralError, CoralErrorCode};
use crate::operation::{OpCode, Operation, OperationOptions};
use crate::retry::{DefaultRetryHandler, RetryHandler, RetryState};
use serde_json::Map;
use std::time::Duration;

fn op(code: OpCode) -> Operation {
    Operation::new(code, "testtable", Map::new(), OperationOptions::default())
}

fn state(attempt: u32) -> RetryState {
    let mut s = RetryState::new();
    s.attempt = attempt;
    s
}

fn err(code: CoralErrorCode) -> CoralError {
    CoralError::new(code, "test error")
}

#[tokio::test]
async fn backoff_shape_and_monotonicity() {
    let base = Duration::from_millis(100);
    let h = DefaultRetryHandler::new(100, base);
    let put = op(OpCode::Put);
    let e = err(CoralErrorCode::ServerError);
    for attempt in 1..8u32 {
        let d = h.delay(&put, &state(attempt), &e);
        let exp = base * (1u32 << (attempt - 1));
        assert!(d >= exp, "attempt {}: delay {:?} below {:?}", attempt, d, exp);
        assert!(
            d <= exp + base,
            "attempt {}: delay {:?} above {:?}",
            attempt,
            d,
            exp + base
        );
        // the exponential floor of attempt k+1 equals the jitter ceiling of
        // attempt k, so delays are monotone even with jitter
        let next = h.delay(&put, &state(attempt + 1), &e);
        assert!(next >= d, "delay not monotonic: {:?} then {:?}", d, next);
    }
}

#[tokio::test]
async fn attempt_ceiling() {
    let h = DefaultRetryHandler::new(3, Duration::from_millis(1));
    let put = op(OpCode::Put);
    let e = err(CoralErrorCode::ServerError);
    assert!(h.should_retry(&put, &state(1), &e));
    assert!(h.should_retry(&put, &state(2), &e));
    assert!(!h.should_retry(&put, &state(3), &e));
    assert!(!h.should_retry(&put, &state(100), &e));
}

#[tokio::test]
async fn non_retryable_codes() {
    let h = DefaultRetryHandler::default();
    let put = op(OpCode::Put);
    for code in [
        CoralErrorCode::IllegalArgument,
        CoralErrorCode::TableNotFound,
        CoralErrorCode::ResourceNotFound,
        CoralErrorCode::ResourceExists,
        CoralErrorCode::SizeLimitExceeded,
        CoralErrorCode::InsufficientPermission,
    ] {
        assert!(
            !h.should_retry(&put, &state(1), &err(code)),
            "{:?} must not retry",
            code
        );
    }
}

#[tokio::test]
async fn network_and_secinfo_have_no_attempt_ceiling() {
    let h = DefaultRetryHandler::new(3, Duration::from_millis(1));
    let put = op(OpCode::Put);
    assert!(h.should_retry(&put, &state(1000), &err(CoralErrorCode::NetworkError)));
    assert!(h.should_retry(
        &put,
        &state(1000),
        &err(CoralErrorCode::SecurityInfoUnavailable)
    ));
}

#[tokio::test]
async fn metadata_operations_are_not_retried() {
    let h = DefaultRetryHandler::default();
    let get_table = op(OpCode::GetTable);
    assert!(!h.should_retry(&get_table, &state(1), &err(CoralErrorCode::ServerError)));
    assert!(!h.should_retry(&get_table, &state(1), &err(CoralErrorCode::TableBusy)));
}

#[tokio::test]
async fn control_op_throttling_uses_dedicated_backoff() {
    let h = DefaultRetryHandler::default().control_op_base_delay(Duration::from_secs(10));
    let ddl = op(OpCode::TableDdl);
    let e = err(CoralErrorCode::OperationLimitExceeded);
    assert!(h.should_retry(&ddl, &state(1), &e));
    let d = h.delay(&ddl, &state(1), &e);
    assert!(d >= Duration::from_secs(10), "delay {:?} below control base", d);
    // the same path can be disabled entirely
    let h = h.disable_control_op_retries();
    assert!(!h.should_retry(&ddl, &state(1), &e));
}

#[tokio::test]
async fn secinfo_constant_delay_prelude() {
    let h = DefaultRetryHandler::default();
    let put = op(OpCode::Put);
    let e = err(CoralErrorCode::SecurityInfoUnavailable);
    for attempt in 1..=h.sec_info_num_backoff {
        assert_eq!(h.delay(&put, &state(attempt), &e), h.sec_info_base_delay);
    }
    // once the prelude is used up, exponential backoff takes over
    let d = h.delay(&put, &state(h.sec_info_num_backoff + 3), &e);
    assert!(d >= h.base_delay * 4, "delay {:?} did not grow", d);
}

#[tokio::test]
async fn authorization_failures_retry_exactly_once() {
    let h = DefaultRetryHandler::default();
    let put = op(OpCode::Put);
    let e = err(CoralErrorCode::InvalidAuthorization);
    let mut s = state(1);
    assert!(h.should_retry(&put, &s, &e));
    s.auth_retries = 1;
    assert!(!h.should_retry(&put, &s, &e));
}

// A handler overriding only delay() keeps the default retry decision.
#[derive(Debug)]
struct FixedDelayHandler;

impl RetryHandler for FixedDelayHandler {
    fn delay(&self, _op: &Operation, _state: &RetryState, _error: &CoralError) -> Duration {
        Duration::from_millis(5)
    }
}

#[tokio::test]
async fn custom_handler_falls_back_to_default_decision() {
    let h = FixedDelayHandler;
    let put = op(OpCode::Put);
    assert!(h.should_retry(&put, &state(1), &err(CoralErrorCode::ServerError)));
    assert!(!h.should_retry(&put, &state(1), &err(CoralErrorCode::IllegalArgument)));
    assert_eq!(
        h.delay(&put, &state(3), &err(CoralErrorCode::ServerError)),
        Duration::from_millis(5)
    );
}
