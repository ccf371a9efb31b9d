//! Onion executor.
//!
//! [`compose`] turns an ordered list of middleware into a single
//! [`Composed`] middleware. Calling it with a terminal [`Next`] runs the steps
//! in order; each step decides whether to continue by running its own `Next`.

use crate::{
    context::Context,
    middleware::{BoxMiddleware, Middleware, Next, StepResult, call_caught},
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// An ordered list of middleware compiled into one onion chain.
///
/// `Composed` is itself a [`Middleware`]: the `next` it is called with is the
/// terminal continuation, run after the last step continues.
#[derive(Clone)]
pub struct Composed {
    steps: Steps,
}

#[derive(Clone)]
enum Steps {
    Empty,
    Single(BoxMiddleware),
    Many(Arc<[BoxMiddleware]>),
}

/// Compile `steps` into one onion chain.
///
/// An empty list passes straight through to the terminal; a single step is
/// used as-is.
///
/// # Example
///
/// ```rust
/// use kasane_core::{Context, Middleware, Next, boxed, compose, from_fn};
///
/// # async fn demo() {
/// let chain = compose(vec![
///     boxed(from_fn(|ctx, next| async move {
///         ctx.insert("first", true);
///         next.run().await
///     })),
///     boxed(from_fn(|ctx, next| async move {
///         ctx.insert("second", true);
///         next.run().await
///     })),
/// ]);
///
/// let ctx = Context::new();
/// chain.call(ctx.clone(), Next::noop()).await.unwrap();
/// assert_eq!(ctx.len(), 2);
/// # }
/// ```
pub fn compose<I>(steps: I) -> Composed
where
    I: IntoIterator<Item = BoxMiddleware>,
{
    let mut steps: Vec<BoxMiddleware> = steps.into_iter().collect();
    let steps = match steps.len() {
        0 => Steps::Empty,
        1 => Steps::Single(steps.remove(0)),
        _ => Steps::Many(steps.into()),
    };
    Composed { steps }
}

impl Composed {
    /// Number of steps in the chain.
    pub fn len(&self) -> usize {
        match &self.steps {
            Steps::Empty => 0,
            Steps::Single(_) => 1,
            Steps::Many(steps) => steps.len(),
        }
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        matches!(self.steps, Steps::Empty)
    }
}

impl Middleware for Composed {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        match &self.steps {
            Steps::Empty => next.run().await,
            Steps::Single(step) => call_caught(&**step, ctx, next).await,
            Steps::Many(steps) => dispatch(Arc::clone(steps), 0, ctx, next).await,
        }
    }
}

fn dispatch(
    steps: Arc<[BoxMiddleware]>,
    index: usize,
    ctx: Context,
    terminal: Next,
) -> BoxFuture<'static, StepResult> {
    let Some(step) = steps.get(index).cloned() else {
        return terminal.run();
    };
    let next = {
        let ctx = ctx.clone();
        Next::from_boxed(Box::new(move || dispatch(steps, index + 1, ctx, terminal)))
    };
    Box::pin(async move { call_caught(&*step, ctx, next).await })
}

/// Construct a [`Composed`] chain from a list of middleware.
///
/// # Example
/// ```ignore
/// let chain = chain![logging, auth, handler];
/// ```
#[macro_export]
macro_rules! chain {
    () => { $crate::compose(::std::vec::Vec::new()) };
    ($($step:expr),+ $(,)?) => {
        $crate::compose(::std::vec![$($crate::boxed($step)),+])
    };
}
