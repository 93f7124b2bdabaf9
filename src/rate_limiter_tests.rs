//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::rate_limiter::SimpleRateLimiter;
use std::time::Duration;
use tokio::time::Instant;

// All tests run on a paused clock; sleeps auto-advance time, so the timing
// below is deterministic.

#[tokio::test(start_paused = true)]
async fn wait_time_tracks_debt() {
    let rl = SimpleRateLimiter::new(100.0, 1.0);
    // one burst of headroom to start with
    assert_eq!(rl.wait_time(), Duration::ZERO);
    rl.consume(300.0);
    // 100 tokens of headroom minus 300 consumed: 2 seconds of debt
    let w = rl.wait_time();
    assert!(w > Duration::from_millis(1900) && w <= Duration::from_secs(2));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(rl.wait_time(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn consume_wait_reports_injected_delay() {
    let rl = SimpleRateLimiter::new(100.0, 1.0);
    assert_eq!(rl.consume_wait().await, Duration::ZERO);
    rl.consume(200.0);
    let waited = rl.consume_wait().await;
    assert!(
        waited >= Duration::from_millis(900),
        "waited {:?}, expected about 1s",
        waited
    );
    // debt is paid; no further delay
    assert_eq!(rl.consume_wait().await, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn throughput_converges_to_configured_rate() {
    let rate = 100.0;
    let rl = SimpleRateLimiter::new(rate, 1.0);
    let units_per_op = 100.0;
    let ops = 40;

    let start = Instant::now();
    let mut injected = Duration::ZERO;
    for _ in 0..ops {
        injected += rl.consume_wait().await;
        rl.consume(units_per_op);
    }
    let elapsed = start.elapsed().as_secs_f64();
    let total_units = units_per_op * ops as f64;

    // demand is far above the rate, so delay must have been injected
    assert!(injected > Duration::ZERO);
    // average throughput stays within a burst of the configured rate
    let throughput = total_units / elapsed;
    assert!(
        throughput <= rate * 1.1,
        "throughput {} exceeds rate {}",
        throughput,
        rate
    );
}

#[tokio::test(start_paused = true)]
async fn drain_discards_headroom() {
    let rl = SimpleRateLimiter::new(100.0, 1.0);
    rl.drain();
    assert_eq!(rl.wait_time(), Duration::ZERO);
    // with no headroom left, the very next consumption creates debt
    rl.consume(50.0);
    let w = rl.wait_time();
    assert!(w > Duration::from_millis(400) && w <= Duration::from_millis(500));
    // drain never makes an existing debt worse
    rl.drain();
    let w2 = rl.wait_time();
    assert!(w2 <= w);
}

#[tokio::test(start_paused = true)]
async fn set_rate_keeps_debt() {
    let rl = SimpleRateLimiter::new(100.0, 1.0);
    rl.consume(300.0);
    assert!(rl.wait_time() > Duration::ZERO);
    rl.set_rate(200.0);
    assert_eq!(rl.rate(), 200.0);
    // same debt, double the refill rate: the wait shrinks but remains
    let w = rl.wait_time();
    assert!(w > Duration::ZERO && w <= Duration::from_secs(1));
}
