//
// Copyright (c) 2024, 2025 CoralDB and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::error::CoralError;
use crate::operation::Operation;
use crate::types::Capacity;
use std::fmt::Debug;

/// Per-handle observability hooks.
///
/// Observers are registered with
/// [`HandleBuilder::observer()`](crate::HandleBuilder::observer()) and held
/// by that handle only; there is no process-wide event state. All methods
/// have empty default implementations, so an observer implements only what
/// it cares about. Callbacks run inline on the operation's task and should
/// return quickly.
pub trait EventObserver: Send + Sync + Debug {
    /// Called after a data operation completes with a consumed-capacity
    /// report, including any rate-limiter delay that was injected.
    fn on_consumed_capacity(&self, _operation: &Operation, _consumed: &Capacity) {}

    /// Called each time a retryable failure is observed, before the retry
    /// decision is made and before any backoff sleep.
    fn on_retryable_error(&self, _operation: &Operation, _attempt: u32, _error: &CoralError) {}
}
