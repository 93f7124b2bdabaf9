//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Retry policy: given an operation, its attempt history, and a classified
//! failure, decide whether to try again and how long to wait first.
use crate::error::{CoralError, CoralErrorCode};
use crate::operation::Operation;
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_CONTROL_OP_BASE_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_SEC_INFO_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_SEC_INFO_NUM_BACKOFF: u32 = 10;

/// Per-call retry bookkeeping.
///
/// A `RetryState` is owned exclusively by the call that is retrying and is
/// discarded when the call succeeds, exhausts its retries, or runs out its
/// operation timeout. The attempt count includes the first (non-retry)
/// invocation.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// The attempt about to be (or just) dispatched, starting at 1.
    pub attempt: u32,
    /// When the first attempt was dispatched.
    pub first_attempt_time: Instant,
    /// Total backoff delay slept so far.
    pub cumulative_delay: Duration,
    /// Number of automatic retries already made for authorization failures.
    pub auth_retries: u32,
}

impl RetryState {
    pub fn new() -> RetryState {
        RetryState {
            attempt: 1,
            first_attempt_time: Instant::now(),
            cumulative_delay: Duration::ZERO,
            auth_retries: 0,
        }
    }
}

/// Pluggable retry policy.
///
/// The driver consults the handle's retry handler after every failed
/// dispatch: [`should_retry()`](RetryHandler::should_retry()) decides whether
/// the operation is tried again, and [`delay()`](RetryHandler::delay())
/// supplies the backoff before the next attempt. An application may supply
/// its own implementation via
/// [`HandleBuilder::retry_handler()`](crate::HandleBuilder::retry_handler());
/// any method the implementation does not override falls back to the default
/// policy, so a custom handler can change just the delay, or just the
/// decision.
///
/// Note the global stopping condition - cumulative elapsed time since the
/// first attempt must not exceed the operation timeout - is enforced by the
/// execution loop, not by the handler. Network and security-info failures
/// are exempt from any attempt ceiling but are still bounded by that
/// timeout.
pub trait RetryHandler: Send + Sync + Debug {
    /// Decide whether the failed operation should be dispatched again.
    fn should_retry(&self, operation: &Operation, state: &RetryState, error: &CoralError) -> bool {
        DefaultRetryHandler::default().should_retry(operation, state, error)
    }

    /// Compute the delay to sleep before the next attempt.
    fn delay(&self, operation: &Operation, state: &RetryState, error: &CoralError) -> Duration {
        DefaultRetryHandler::default().delay(operation, state, error)
    }
}

/// The default retry policy.
///
/// Retryable data-operation failures back off exponentially with jitter:
/// `base_delay * 2^(attempt-1) + random(0, base_delay)`. Two failure classes
/// get dedicated treatment:
///
/// - `SecurityInfoUnavailable`: security metadata propagation is usually
///   quick, so the first `sec_info_num_backoff` attempts use a constant
///   `sec_info_base_delay` before exponential backoff takes over.
/// - `OperationLimitExceeded` on a metadata (control plane) operation: these
///   are otherwise never retried, but control-op throttling follows a
///   dedicated exponential backoff from the much larger
///   `control_op_base_delay`, so a loaded control plane is not hammered.
///   Set the base delay to `None` to disable this path entirely.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetryHandler {
    /// Maximum number of dispatches for a steadily-failing retryable
    /// operation, including the first. Network and security-info failures
    /// are not bounded by this value.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Base delay for throttled control (metadata) operations, or `None` to
    /// never retry them.
    pub control_op_base_delay: Option<Duration>,
    /// Constant delay used for the first `sec_info_num_backoff` attempts
    /// after a `SecurityInfoUnavailable` failure.
    pub sec_info_base_delay: Duration,
    /// Number of constant-delay attempts before `SecurityInfoUnavailable`
    /// failures fall back to exponential backoff.
    pub sec_info_num_backoff: u32,
}

impl Default for DefaultRetryHandler {
    fn default() -> DefaultRetryHandler {
        DefaultRetryHandler {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            control_op_base_delay: Some(DEFAULT_CONTROL_OP_BASE_DELAY),
            sec_info_base_delay: DEFAULT_SEC_INFO_BASE_DELAY,
            sec_info_num_backoff: DEFAULT_SEC_INFO_NUM_BACKOFF,
        }
    }
}

impl DefaultRetryHandler {
    /// Create a handler with the given attempt ceiling and backoff base,
    /// keeping defaults for the specialized paths.
    pub fn new(max_attempts: u32, base_delay: Duration) -> DefaultRetryHandler {
        DefaultRetryHandler {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Change the base delay used for throttled control operations.
    pub fn control_op_base_delay(mut self, delay: Duration) -> DefaultRetryHandler {
        self.control_op_base_delay = Some(delay);
        self
    }

    /// Never retry throttled control operations.
    pub fn disable_control_op_retries(mut self) -> DefaultRetryHandler {
        self.control_op_base_delay = None;
        self
    }
}

impl RetryHandler for DefaultRetryHandler {
    fn should_retry(&self, operation: &Operation, state: &RetryState, error: &CoralError) -> bool {
        // Authorization failures get one automatic retry, allowing a
        // credential refresh to complete; after that they are terminal.
        if error.code == CoralErrorCode::InvalidAuthorization {
            return state.auth_retries < 1;
        }
        if !error.code.is_retryable() {
            return false;
        }
        // Network and security-info failures have no attempt ceiling; the
        // operation timeout in the execute loop bounds them instead.
        if error.code == CoralErrorCode::NetworkError
            || error.code == CoralErrorCode::SecurityInfoUnavailable
        {
            return true;
        }
        if operation.op_code().is_metadata() {
            // Control operations are not retried, with one exception: a
            // throttled control plane, when the dedicated backoff is enabled.
            return error.code == CoralErrorCode::OperationLimitExceeded
                && self.control_op_base_delay.is_some();
        }
        state.attempt < self.max_attempts
    }

    fn delay(&self, operation: &Operation, state: &RetryState, error: &CoralError) -> Duration {
        if error.code == CoralErrorCode::SecurityInfoUnavailable {
            if state.attempt <= self.sec_info_num_backoff {
                return self.sec_info_base_delay;
            }
            return backoff_delay(self.base_delay, state.attempt - self.sec_info_num_backoff);
        }
        if error.code == CoralErrorCode::OperationLimitExceeded
            && operation.op_code().is_metadata()
        {
            let base = self
                .control_op_base_delay
                .unwrap_or(DEFAULT_CONTROL_OP_BASE_DELAY);
            return backoff_delay(base, state.attempt);
        }
        backoff_delay(self.base_delay, state.attempt)
    }
}

// delay = base * 2^(attempt-1) + random(0, base)
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    // cap the shift so pathological attempt counts don't overflow
    let shift = (attempt.saturating_sub(1)).min(16);
    let exp = base.saturating_mul(1u32 << shift);
    let jitter_ms = {
        let max = base.as_millis() as u64;
        if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max)
        }
    };
    exp.saturating_add(Duration::from_millis(jitter_ms))
}
