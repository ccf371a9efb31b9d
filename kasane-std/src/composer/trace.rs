//! Per-entry tracing.

use super::EntryInfo;
use kasane_core::{BoxMiddleware, Context, Middleware, Next, StepResult, call_caught};
use std::{error::Error, sync::Arc};

/// Called when a traced entry settles, with its error if it failed.
pub type TraceExit = Box<dyn FnOnce(Option<&(dyn Error + Send + Sync + 'static)>) + Send>;

/// Observes entries of a compiled chain.
///
/// Closures `Fn(&EntryInfo, &Context) -> Option<TraceExit>` implement this
/// trait.
pub trait Tracer: Send + Sync + 'static {
    /// Called when an entry starts. The returned callback runs when it settles.
    fn enter(&self, entry: &EntryInfo, ctx: &Context) -> Option<TraceExit>;
}

impl<F> Tracer for F
where
    F: Fn(&EntryInfo, &Context) -> Option<TraceExit> + Send + Sync + 'static,
{
    fn enter(&self, entry: &EntryInfo, ctx: &Context) -> Option<TraceExit> {
        self(entry, ctx)
    }
}

/// Box an exit callback.
pub fn on_exit<F>(f: F) -> Option<TraceExit>
where
    F: FnOnce(Option<&(dyn Error + Send + Sync + 'static)>) + Send + 'static,
{
    Some(Box::new(f))
}

pub(crate) struct Traced {
    info: EntryInfo,
    inner: BoxMiddleware,
    tracer: Arc<dyn Tracer>,
}

impl Traced {
    pub(crate) fn new(info: EntryInfo, inner: BoxMiddleware, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            info,
            inner,
            tracer,
        }
    }
}

impl Middleware for Traced {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let exit = self.tracer.enter(&self.info, &ctx);
        let outcome = call_caught(&*self.inner, ctx, next).await;
        if let Some(exit) = exit {
            exit(outcome.as_ref().err().map(|error| &**error));
        }
        outcome
    }

    fn name(&self) -> Option<&str> {
        self.info.name.as_deref()
    }
}
