//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Adaptive, feedback-driven rate limiting.
//!
//! When enabled on the handle, every data operation passes through a
//! per-table, per-direction (read/write) token bucket. The bucket is charged
//! with the consumed capacity the server reports *after* each operation
//! completes, so no prediction of operation cost is needed; if the balance
//! is negative when the next operation wants to dispatch, the operation
//! sleeps until the balance refills to zero. The limiter only shapes request
//! timing - it never changes whether an operation is retried - and it is
//! purely cooperative: a second client instance working against the same
//! table is not coordinated with.
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// A token bucket limiting one direction (read or write) of traffic
/// against one table.
///
/// Tokens refill continuously at the configured rate up to one burst's
/// worth of headroom. Consumption is reported after the fact and may drive
/// the balance negative; dispatch waits until the balance is nonnegative.
#[derive(Debug)]
pub struct SimpleRateLimiter {
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    capacity: f64,
    // units per second
    rate: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + dt * self.rate).min(self.capacity);
    }
}

impl SimpleRateLimiter {
    /// Create a limiter refilling at `units_per_second`, with
    /// `burst_seconds` worth of headroom.
    pub fn new(units_per_second: f64, burst_seconds: f64) -> SimpleRateLimiter {
        let rate = units_per_second.max(1.0);
        let capacity = (rate * burst_seconds).max(1.0);
        SimpleRateLimiter {
            state: Mutex::new(BucketState {
                tokens: capacity,
                capacity,
                rate,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Charge units consumed by a completed operation. The balance may go
    /// negative; subsequent operations pay the debt by waiting.
    pub fn consume(&self, units: f64) {
        let mut s = self.state.lock().unwrap();
        s.refill();
        s.tokens -= units;
    }

    /// Time until the balance refills to zero. [`Duration::ZERO`] if the
    /// balance is already nonnegative.
    pub fn wait_time(&self) -> Duration {
        let mut s = self.state.lock().unwrap();
        s.refill();
        if s.tokens >= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(-s.tokens / s.rate)
    }

    /// Wait until the balance is nonnegative, returning the total time
    /// slept. This is the suspension point a dispatching operation awaits
    /// before going to the transport.
    pub async fn consume_wait(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let w = self.wait_time();
            if w.is_zero() {
                return waited;
            }
            trace!("rate limiter sleeping {:?}", w);
            sleep(w).await;
            waited += w;
        }
    }

    /// Drop any positive balance. Used when the server reports a throttling
    /// error: our view of remaining capacity was too optimistic.
    pub fn drain(&self) {
        let mut s = self.state.lock().unwrap();
        s.refill();
        if s.tokens > 0.0 {
            s.tokens = 0.0;
        }
    }

    /// Change the refill rate, keeping the current debt if any.
    pub fn set_rate(&self, units_per_second: f64) {
        let mut s = self.state.lock().unwrap();
        s.refill();
        s.rate = units_per_second.max(1.0);
        s.capacity = s.rate.max(1.0);
        s.tokens = s.tokens.min(s.capacity);
    }

    /// The current refill rate in units per second.
    pub fn rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }
}

// Read and write buckets for one table. Shared (behind an Arc) by all
// concurrent operations against that table.
#[derive(Debug)]
pub(crate) struct TableLimiters {
    pub(crate) read: SimpleRateLimiter,
    pub(crate) write: SimpleRateLimiter,
}
