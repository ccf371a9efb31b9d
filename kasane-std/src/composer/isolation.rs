//! Snapshot isolation.
//!
//! Runs a nested chain against the live context so reads fall through to
//! existing keys, then rolls the context back: keys the nested chain added are
//! removed (fixed keys excepted) and pre-existing keys get their old values.

use kasane_core::{BoxMiddleware, Context, Fields, Middleware, Next, StepResult, call_caught};

/// A middleware that runs `inner` in isolation and then continues.
///
/// The outer continuation is always run after a successful nested run, whether
/// or not the nested chain itself continued. A failing nested chain is rolled
/// back and its error propagated.
pub struct Isolated {
    inner: BoxMiddleware,
    name: Option<String>,
}

impl Isolated {
    /// Isolate `inner`.
    pub fn new(inner: BoxMiddleware) -> Self {
        Self { inner, name: None }
    }

    /// Set the display name reported by `inspect()`.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

impl Middleware for Isolated {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let snapshot = ctx.fields();
        let outcome = call_caught(&*self.inner, ctx.clone(), Next::noop()).await;
        restore(&ctx, snapshot);
        outcome?;
        next.run().await
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Roll `ctx` back to `snapshot`.
///
/// Keys added since the snapshot are removed unless fixed; snapshot values are
/// written back over every pre-existing key.
pub fn restore(ctx: &Context, snapshot: Fields) {
    for key in ctx.keys() {
        if !snapshot.contains_key(&key) {
            ctx.remove(&key);
        }
    }
    ctx.merge(snapshot);
}
