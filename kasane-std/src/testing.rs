//! Testing utilities for Kasane.
//!
//! # Features
//!
//! - [`Recorder`]: a shared log that hands out middleware recording labels
//! - [`CallCounter`]: a middleware counting its invocations
//! - [`set`] / [`fail`] / [`halt`]: small middleware for building test chains

use kasane_core::{BoxError, Context, Middleware, Next, StepResult};
use serde_json::Value;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Recorder
// ============================================================================

/// A shared, ordered log of labels.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = Recorder::new();
/// let chain = compose(vec![
///     boxed(recorder.step("a")),
///     boxed(recorder.step("b")),
/// ]);
///
/// chain.call(Context::new(), Next::noop()).await?;
/// assert_eq!(recorder.entries(), vec!["a:in", "b:in", "b:out", "a:out"]);
/// ```
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label.
    pub fn record(&self, label: impl Into<String>) {
        self.lock().push(label.into());
    }

    /// A middleware recording `"{label}:in"` before continuing and
    /// `"{label}:out"` after the rest of the chain settled successfully.
    pub fn step(&self, label: &'static str) -> RecordingStep {
        RecordingStep {
            recorder: self.clone(),
            label,
        }
    }

    /// Snapshot of the recorded labels.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of recorded labels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every label.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Middleware returned by [`Recorder::step`].
pub struct RecordingStep {
    recorder: Recorder,
    label: &'static str,
}

impl Middleware for RecordingStep {
    async fn call(&self, _ctx: Context, next: Next) -> StepResult {
        self.recorder.record(format!("{}:in", self.label));
        next.run().await?;
        self.recorder.record(format!("{}:out", self.label));
        Ok(())
    }

    fn name(&self) -> Option<&str> {
        Some(self.label)
    }
}

// ============================================================================
// Call Counter
// ============================================================================

/// A middleware that counts invocations and continues.
///
/// Clones share the same count.
#[derive(Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the count to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Middleware for CallCounter {
    async fn call(&self, _ctx: Context, next: Next) -> StepResult {
        self.count.fetch_add(1, Ordering::SeqCst);
        next.run().await
    }
}

// ============================================================================
// Small steps
// ============================================================================

/// A middleware that sets `key` to `value` and continues.
pub fn set(key: &'static str, value: impl Into<Value>) -> impl Middleware {
    let value = value.into();
    move |ctx: Context, next: Next| {
        ctx.insert(key, value.clone());
        next.run()
    }
}

/// A middleware that fails with `message` without continuing.
pub fn fail(message: &'static str) -> impl Middleware {
    move |_ctx: Context, _next: Next| async move { Err::<(), BoxError>(message.into()) }
}

/// A middleware that stops the chain without failing.
pub fn halt() -> impl Middleware {
    |_ctx: Context, _next: Next| async { Ok::<(), BoxError>(()) }
}
