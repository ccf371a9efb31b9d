#![allow(dead_code)]

use kasane::{BoxError, Context, Middleware, Next, StepResult};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;

// ============================================================================
// Test Error Types
// ============================================================================

#[derive(Debug, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Error)]
#[error("not found: {0}")]
pub struct NotFound(pub String);

// ============================================================================
// Test Middleware
// ============================================================================

/// Pushes its id on the way in and continues.
pub struct OrderRecordingStep {
    pub id: usize,
    pub order: Arc<Mutex<Vec<usize>>>,
}

impl Middleware for OrderRecordingStep {
    async fn call(&self, _ctx: Context, next: Next) -> StepResult {
        self.order.lock().unwrap().push(self.id);
        next.run().await
    }
}

/// Counts invocations and continues.
pub struct CountingStep {
    pub calls: Arc<AtomicUsize>,
}

impl CountingStep {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Middleware for CountingStep {
    async fn call(&self, _ctx: Context, next: Next) -> StepResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        next.run().await
    }
}

/// Fails with `error` without continuing.
pub struct FailingStep<F> {
    pub error: F,
}

impl<F> Middleware for FailingStep<F>
where
    F: Fn() -> BoxError + Send + Sync + 'static,
{
    async fn call(&self, _ctx: Context, _next: Next) -> StepResult {
        Err((self.error)())
    }
}

/// Snapshot of the keys currently in `ctx`, sorted.
pub fn sorted_keys(ctx: &Context) -> Vec<String> {
    let mut keys = ctx.keys();
    keys.sort();
    keys
}
