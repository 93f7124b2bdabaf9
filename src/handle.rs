//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralErrorCode::{
    InvalidAuthorization, ReadLimitExceeded, RequestTimeout, RetryAuthentication,
    WriteLimitExceeded,
};
use crate::error::{ia_err, CoralError};
use crate::events::EventObserver;
use crate::handle_builder::HandleBuilder;
use crate::operation::Operation;
use crate::rate_limiter::{SimpleRateLimiter, TableLimiters};
use crate::retry::{DefaultRetryHandler, RetryHandler, RetryState};
use crate::table_request::GetTableRequest;
use crate::transport::{AuthorizationProvider, HttpTransport, ServiceResponse, Transport};
use async_recursion::async_recursion;

use std::collections::HashMap;
use std::result::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// **The main database handle**.
///
/// This should be created once and used throughout the application
/// lifetime, across all threads. Any number of operations may be in flight
/// concurrently on one handle; each operation suspends independently at its
/// own transport round-trips, backoff sleeps, poll sleeps, and rate-limiter
/// waits.
///
/// Note: there is no need to enclose this struct in an `Rc` or [`Arc`], as it uses an
/// [`Arc`] internally, so calling `.clone()` on this struct will always return the
/// same underlying handle.
#[derive(Clone, Debug)]
pub struct Handle {
    // Use an inner Arc so cloning keeps the same contents
    pub(crate) inner: Arc<HandleRef>,
}

#[derive(Debug)]
pub(crate) struct HandleRef {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) retry_handler: Arc<dyn RetryHandler>,
    pub(crate) auth: Option<Arc<dyn AuthorizationProvider>>,
    pub(crate) observers: Vec<Arc<dyn EventObserver>>,
    // per-table rate limiter buckets; the lock is never held across awaits
    limiters: Mutex<HashMap<String, Arc<TableLimiters>>>,
    rate_limiting: bool,
    rate_limiter_percent: f64,
    pub(crate) max_memory_consumption: u64,
    timeout: Duration,
}

impl Handle {
    /// Create a new [`HandleBuilder`].
    pub fn builder() -> HandleBuilder {
        HandleBuilder::new()
    }

    // Create the new Handle based on builder configuration
    pub(crate) async fn new(b: &HandleBuilder) -> Result<Handle, CoralError> {
        let timeout = {
            if let Some(t) = b.timeout {
                t
            } else {
                Duration::from_secs(30)
            }
        };
        let transport: Arc<dyn Transport> = {
            if let Some(t) = &b.transport {
                t.clone()
            } else {
                if b.endpoint.is_empty() {
                    if b.from_environment {
                        return ia_err!(
                            "can't determine CoralDB endpoint: set CORALDB_ENDPOINT"
                        );
                    }
                    return ia_err!(
                        "can't determine CoralDB endpoint: call HandleBuilder::endpoint()"
                    );
                }
                Arc::new(HttpTransport::new(b, timeout)?)
            }
        };
        let retry_handler: Arc<dyn RetryHandler> = {
            if let Some(h) = &b.retry_handler {
                h.clone()
            } else {
                Arc::new(DefaultRetryHandler::default())
            }
        };
        debug!(
            "Creating new Handle: endpoint={}, rate_limiting={}, timeout={:?}",
            b.endpoint, b.rate_limiting, timeout
        );
        Ok(Handle {
            inner: Arc::new(HandleRef {
                transport,
                retry_handler,
                auth: b.auth.clone(),
                observers: b.observers.clone(),
                limiters: Mutex::new(HashMap::new()),
                rate_limiting: b.rate_limiting,
                rate_limiter_percent: b.rate_limiter_percent,
                max_memory_consumption: b.max_memory_consumption,
                timeout,
            }),
        })
    }

    pub(crate) fn get_timeout(&self, t: &Option<Duration>) -> Duration {
        // if t is given, use that. If not, use handle's timeout
        if let Some(d) = t {
            return *d;
        }
        self.inner.timeout
    }

    // Execute one operation to completion: throttle, dispatch, classify,
    // retry. This is the governing loop for the retry policy; it enforces
    // the one stopping condition the policy itself does not - cumulative
    // elapsed time since the first attempt must not exceed the operation
    // timeout - and it owns the per-call RetryState.
    //
    // async_recursion: creating a table's rate limiters issues a GetTable
    // through this same method.
    #[async_recursion]
    pub(crate) async fn execute_op(&self, op: Operation) -> Result<ServiceResponse, CoralError> {
        let timeout = op.options().timeout;
        let start = Instant::now();
        let mut state = RetryState::new();
        let limiters = self.limiters_for(&op).await;
        let mut read_delayed = Duration::ZERO;
        let mut write_delayed = Duration::ZERO;

        loop {
            // rate limiter throttle: pay down any debt before dispatching
            if let Some(l) = &limiters {
                if op.op_code().does_reads() {
                    read_delayed += l.read.consume_wait().await;
                }
                if op.op_code().does_writes() {
                    write_delayed += l.write.consume_wait().await;
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(CoralError::new(
                    RequestTimeout,
                    &format!("operation timed out after {} attempts", state.attempt - 1),
                )
                .with_operation(&op));
            }

            match self.inner.transport.execute(&op, timeout - elapsed).await {
                Ok(mut resp) => {
                    if let Some(c) = resp.consumed.as_mut() {
                        // feed the buckets with what the server says we used
                        if let Some(l) = &limiters {
                            l.read.consume(c.read_units as f64);
                            l.write.consume(c.write_units as f64);
                        }
                        c.read_rate_limited_ms = read_delayed.as_millis() as i64;
                        c.write_rate_limited_ms = write_delayed.as_millis() as i64;
                        for obs in &self.inner.observers {
                            obs.on_consumed_capacity(&op, c);
                        }
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    if e.retryable() {
                        for obs in &self.inner.observers {
                            obs.on_retryable_error(&op, state.attempt, &e);
                        }
                    }
                    // a throttling error means our buckets were too
                    // optimistic about remaining capacity
                    if let Some(l) = &limiters {
                        if e.code == ReadLimitExceeded {
                            l.read.drain();
                        }
                        if e.code == WriteLimitExceeded {
                            l.write.drain();
                        }
                    }
                    if !self.inner.retry_handler.should_retry(&op, &state, &e) {
                        return Err(e.with_operation(&op));
                    }
                    if e.code == InvalidAuthorization || e.code == RetryAuthentication {
                        state.auth_retries += 1;
                        if let Some(a) = &self.inner.auth {
                            match a.refresh().await {
                                Ok(true) => trace!("refreshed authorization provider"),
                                Ok(false) => {
                                    trace!("authorization provider did not refresh")
                                }
                                Err(re) => {
                                    return Err(re.with_cause(e).with_operation(&op));
                                }
                            }
                        }
                    }
                    let delay = self.inner.retry_handler.delay(&op, &state, &e);
                    if start.elapsed() + delay >= timeout {
                        return Err(CoralError::new(
                            RequestTimeout,
                            &format!(
                                "operation timed out after {} attempts",
                                state.attempt
                            ),
                        )
                        .with_cause(e)
                        .with_operation(&op));
                    }
                    trace!(
                        "retrying op={} attempt={} delay={:?} err={}",
                        op.op_code().as_str(),
                        state.attempt,
                        delay,
                        e
                    );
                    sleep(delay).await;
                    state.attempt += 1;
                    state.cumulative_delay += delay;
                }
            }
        }
    }

    // Get (or lazily create) the rate limiter buckets for the operation's
    // table. Only data operations against a named table are limited, and
    // only when the table reports fixed provisioned throughput.
    async fn limiters_for(&self, op: &Operation) -> Option<Arc<TableLimiters>> {
        if !self.inner.rate_limiting {
            return None;
        }
        let oc = op.op_code();
        if op.table_name().is_empty()
            || oc.is_metadata()
            || !(oc.does_reads() || oc.does_writes())
        {
            return None;
        }
        let key = op.table_name().to_lowercase();
        {
            let map = self.inner.limiters.lock().unwrap();
            if let Some(l) = map.get(&key) {
                return Some(l.clone());
            }
        }
        // learn the table's provisioned throughput
        let res = GetTableRequest::new(op.table_name()).execute(self).await.ok()?;
        let limits = res.limits()?;
        if limits.read_units <= 0 && limits.write_units <= 0 {
            // on-demand and on-premise tables report no fixed provisioning
            return None;
        }
        let pct = self.inner.rate_limiter_percent / 100.0;
        trace!(
            "creating rate limiters for table {}: read={} write={} pct={}",
            key,
            limits.read_units,
            limits.write_units,
            self.inner.rate_limiter_percent
        );
        let l = Arc::new(TableLimiters {
            read: SimpleRateLimiter::new(limits.read_units as f64 * pct, 1.0),
            write: SimpleRateLimiter::new(limits.write_units as f64 * pct, 1.0),
        });
        let mut map = self.inner.limiters.lock().unwrap();
        Some(map.entry(key).or_insert(l).clone())
    }

    // Forget the cached limiter buckets for a table. Called after table DDL,
    // which may have changed the table's limits.
    pub(crate) fn invalidate_limiters(&self, table_name: &str) {
        let mut map = self.inner.limiters.lock().unwrap();
        map.remove(&table_name.to_lowercase());
    }
}
