//! # Middleware and Continuations
//!
//! A middleware is the unit of work in a chain. It receives the shared
//! [`Context`] and a [`Next`] continuation. Awaiting `next.run()` runs every
//! downstream step; code before the call runs on the way in, code after it on
//! the way out (the "onion"). Returning without calling `next` stops the chain.
//!
//! # Static vs Dynamic Dispatch
//!
//! [`Middleware`] uses native `async fn` for zero-cost static dispatch. The
//! registry stores steps as [`BoxMiddleware`], built on the object-safe
//! [`DynMiddleware`], which every `Middleware` implements automatically.

use crate::{
    context::Context,
    error::{BoxError, ChainError, panic_message},
};
use futures::{FutureExt, future::BoxFuture};
use std::{
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
};

/// Result of running a middleware (and, transitively, everything after it).
pub type StepResult = Result<(), BoxError>;

/// A type-erased, shareable middleware.
pub type BoxMiddleware = Arc<dyn DynMiddleware>;

/// A step in an onion chain.
///
/// Closures of the form `Fn(Context, Next) -> impl Future<Output = StepResult>`
/// implement this trait. Use [`from_fn`] when the closure's argument types
/// need to be inferred.
///
/// # Example
///
/// ```rust
/// use kasane_core::{Context, Middleware, Next, StepResult};
///
/// struct Audit;
///
/// impl Middleware for Audit {
///     async fn call(&self, ctx: Context, next: Next) -> StepResult {
///         ctx.insert("audited", true);
///         next.run().await
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Middleware`",
    label = "missing `Middleware` implementation",
    note = "Middleware must implement `call(ctx, next)`; closures need the signature `Fn(Context, Next) -> Future<Output = StepResult>`."
)]
pub trait Middleware: Send + Sync + 'static {
    /// Run this step.
    fn call(&self, ctx: Context, next: Next) -> impl Future<Output = StepResult> + Send;

    /// Display name reported by `inspect()` and tracers.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// Dynamic object-safe version of [`Middleware`].
pub trait DynMiddleware: Send + Sync + 'static {
    /// Run this step (dynamic dispatch version).
    fn call_dyn<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, StepResult>;

    /// Display name reported by `inspect()` and tracers.
    fn name_dyn(&self) -> Option<&str>;
}

// Blanket implementation: Any type implementing Middleware implements DynMiddleware automatically.
impl<T: Middleware> DynMiddleware for T {
    fn call_dyn<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, StepResult> {
        Box::pin(self.call(ctx, next))
    }

    fn name_dyn(&self) -> Option<&str> {
        self.name()
    }
}

// Blanket impl for closures
impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send,
{
    fn call(&self, ctx: Context, next: Next) -> impl Future<Output = StepResult> + Send {
        (self)(ctx, next)
    }
}

/// Pin down the argument types of a middleware closure.
///
/// ```rust
/// use kasane_core::from_fn;
///
/// let step = from_fn(|ctx, next| async move {
///     ctx.insert("seen", true);
///     next.run().await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send,
{
    f
}

/// Box a middleware for storage in a registry.
pub fn boxed<M: Middleware>(middleware: M) -> BoxMiddleware {
    Arc::new(middleware)
}

/// Run `step`, turning a panic into [`ChainError::Panic`].
///
/// The panic surfaces as an ordinary `Err` to every step awaiting this one,
/// so wrappers get to clean up on the way out.
pub async fn call_caught(step: &dyn DynMiddleware, ctx: Context, next: Next) -> StepResult {
    let call = AssertUnwindSafe(async move { step.call_dyn(ctx, next).await });
    match call.catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ChainError::Panic(panic_message(&*payload)).into()),
    }
}

/// A middleware with a display name.
pub struct Named<M> {
    name: String,
    inner: M,
}

/// Attach a display name to a middleware.
pub fn named<M: Middleware>(name: impl Into<String>, middleware: M) -> Named<M> {
    Named {
        name: name.into(),
        inner: middleware,
    }
}

impl<M: Middleware> Middleware for Named<M> {
    fn call(&self, ctx: Context, next: Next) -> impl Future<Output = StepResult> + Send {
        self.inner.call(ctx, next)
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

type Continuation = Box<dyn FnOnce() -> BoxFuture<'static, StepResult> + Send>;

/// The continuation handed to every middleware.
///
/// A `Next` may be cloned and moved freely, but it can only be *run* once:
/// a second [`Next::run`] on any clone fails with
/// [`ChainError::DoubleContinuation`].
#[derive(Clone)]
pub struct Next {
    continuation: Arc<Mutex<Option<Continuation>>>,
}

impl Next {
    /// Create a continuation from a one-shot async function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        Self::from_boxed(Box::new(move || -> BoxFuture<'static, StepResult> {
            Box::pin(f())
        }))
    }

    pub(crate) fn from_boxed(continuation: Continuation) -> Self {
        Self {
            continuation: Arc::new(Mutex::new(Some(continuation))),
        }
    }

    /// A terminal continuation that does nothing.
    pub fn noop() -> Self {
        Self::from_fn(|| async { Ok::<(), BoxError>(()) })
    }

    /// Proceed to the rest of the chain.
    pub fn run(&self) -> BoxFuture<'static, StepResult> {
        let continuation = self
            .continuation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match continuation {
            Some(continuation) => continuation(),
            None => Box::pin(async { Err::<(), BoxError>(ChainError::DoubleContinuation.into()) }),
        }
    }

    /// Whether this continuation has already been run.
    pub fn is_spent(&self) -> bool {
        self.continuation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("spent", &self.is_spent())
            .finish()
    }
}
