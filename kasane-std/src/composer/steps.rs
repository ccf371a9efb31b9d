//! Built-in steps created by the registration operations.

use super::Composer;
use kasane_core::{BoxError, BoxMiddleware, Context, Middleware, Next, StepResult, boxed, compose};
use serde_json::Value;
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

/// A synchronous predicate over the context.
pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Picks a case key from the context.
pub type Router = Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>;

/// Condition for `branch`: fixed at registration time or evaluated per run.
#[derive(Clone)]
pub enum Condition {
    /// Resolved when the branch is registered; only the chosen side is kept.
    Static(bool),
    /// Evaluated against the context on every run.
    Dynamic(Predicate),
}

impl Condition {
    /// A condition evaluated on every run.
    pub fn dynamic<P>(predicate: P) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(predicate))
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Static(value)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A case of a `route` step.
pub enum RouteCase {
    /// A single middleware.
    Step(BoxMiddleware),
    /// Several middleware composed into one chain.
    Steps(Vec<BoxMiddleware>),
    /// Another composer, run as its raw chain.
    ///
    /// The nested composer's error handlers are not consulted; its failures
    /// surface at the outer error boundary.
    Nested(Composer),
}

impl RouteCase {
    /// A case made of one middleware.
    pub fn step<M: Middleware>(middleware: M) -> Self {
        Self::Step(boxed(middleware))
    }

    pub(crate) fn into_middleware(self) -> BoxMiddleware {
        match self {
            Self::Step(step) => step,
            Self::Steps(steps) => boxed(compose(steps)),
            Self::Nested(composer) => boxed(composer.chain()),
        }
    }
}

pub(crate) struct DeriveStep<F> {
    derive: F,
}

impl<F> DeriveStep<F> {
    pub(crate) fn new(derive: F) -> Self {
        Self { derive }
    }
}

impl<F, Fut> Middleware for DeriveStep<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send,
{
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let enrichment = (self.derive)(ctx.clone()).await?;
        ctx.enrich(enrichment)?;
        next.run().await
    }
}

pub(crate) struct DecorateStep {
    values: Value,
}

impl DecorateStep {
    pub(crate) fn new(values: Value) -> Self {
        Self { values }
    }
}

impl Middleware for DecorateStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        ctx.enrich(self.values.clone())?;
        next.run().await
    }
}

pub(crate) struct GuardStep {
    predicate: Predicate,
    side_effect: Option<BoxMiddleware>,
}

impl GuardStep {
    /// Stops the chain when the predicate fails.
    pub(crate) fn gate(predicate: Predicate) -> Self {
        Self {
            predicate,
            side_effect: None,
        }
    }

    /// Runs `steps` when the predicate holds, then always continues.
    pub(crate) fn side_effect(predicate: Predicate, steps: BoxMiddleware) -> Self {
        Self {
            predicate,
            side_effect: Some(steps),
        }
    }
}

impl Middleware for GuardStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let passed = (self.predicate)(&ctx);
        match &self.side_effect {
            Some(steps) => {
                if passed {
                    steps.call_dyn(ctx, Next::noop()).await?;
                }
                next.run().await
            }
            None if passed => next.run().await,
            None => Ok(()),
        }
    }
}

pub(crate) struct BranchStep {
    predicate: Predicate,
    on_true: BoxMiddleware,
    on_false: Option<BoxMiddleware>,
}

impl BranchStep {
    pub(crate) fn new(
        predicate: Predicate,
        on_true: BoxMiddleware,
        on_false: Option<BoxMiddleware>,
    ) -> Self {
        Self {
            predicate,
            on_true,
            on_false,
        }
    }
}

impl Middleware for BranchStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        if (self.predicate)(&ctx) {
            self.on_true.call_dyn(ctx, next).await
        } else if let Some(on_false) = &self.on_false {
            on_false.call_dyn(ctx, next).await
        } else {
            next.run().await
        }
    }
}

pub(crate) struct RouteStep {
    router: Router,
    cases: HashMap<String, BoxMiddleware>,
    fallback: Option<BoxMiddleware>,
}

impl RouteStep {
    pub(crate) fn new(
        router: Router,
        cases: HashMap<String, BoxMiddleware>,
        fallback: Option<BoxMiddleware>,
    ) -> Self {
        Self {
            router,
            cases,
            fallback,
        }
    }
}

impl Middleware for RouteStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let case = (self.router)(&ctx).and_then(|key| self.cases.get(&key));
        match case.or(self.fallback.as_ref()) {
            Some(step) => step.call_dyn(ctx, next).await,
            None => next.run().await,
        }
    }
}

pub(crate) struct ForkStep {
    inner: BoxMiddleware,
}

impl ForkStep {
    pub(crate) fn new(inner: BoxMiddleware) -> Self {
        Self { inner }
    }
}

impl Middleware for ForkStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let inner = Arc::clone(&self.inner);
        let forked = ctx.clone();
        // Detached: the handle is dropped and the outer chain never joins it.
        tokio::spawn(async move {
            if let Err(error) = inner.call_dyn(forked, Next::noop()).await {
                tracing::debug!(%error, "forked chain failed");
            }
        });
        next.run().await
    }
}

pub(crate) struct TapStep {
    inner: BoxMiddleware,
}

impl TapStep {
    pub(crate) fn new(inner: BoxMiddleware) -> Self {
        Self { inner }
    }
}

impl Middleware for TapStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        self.inner.call_dyn(ctx, Next::noop()).await?;
        next.run().await
    }
}

pub(crate) struct LazyStep<F> {
    factory: F,
}

impl<F> LazyStep<F> {
    pub(crate) fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, Fut> Middleware for LazyStep<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BoxMiddleware, BoxError>> + Send,
{
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        let step = (self.factory)(ctx.clone()).await?;
        step.call_dyn(ctx, next).await
    }
}
