//! Error boundary installed around every compiled chain.

use futures::{FutureExt, future::BoxFuture};
use kasane_core::{
    BoxError, ChainError, Composed, Context, Middleware, Next, SharedError, panic_message,
};
use serde_json::Value;
use std::{error::Error, panic::AssertUnwindSafe, sync::Arc};

/// Decides whether an error belongs to a named kind.
pub type Classifier = Arc<dyn Fn(&(dyn Error + Send + Sync + 'static)) -> bool + Send + Sync>;

/// Outcome of an error handler: `Ok(Some(value))` recovers with `value`,
/// `Ok(None)` passes to the next handler, `Err` re-raises.
pub type HandlerOutcome = Result<Option<Value>, BoxError>;

/// A registered error handler.
pub type ErrorHandler = Arc<dyn Fn(ErrorEvent) -> BoxFuture<'static, HandlerOutcome> + Send + Sync>;

/// What an error handler receives.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The error that escaped the chain.
    pub error: SharedError,
    /// The context of the failed invocation.
    pub context: Context,
    /// The first registered kind whose classifier matched.
    pub kind: Option<String>,
}

/// A composer's chain wrapped in its error boundary.
///
/// Obtained from `Composer::compose()`; cheap to share across tasks.
pub struct CompiledChain {
    chain: Composed,
    kinds: Arc<[(String, Classifier)]>,
    handlers: Arc<[ErrorHandler]>,
}

impl CompiledChain {
    pub(crate) fn new(
        chain: Composed,
        kinds: Vec<(String, Classifier)>,
        handlers: Vec<ErrorHandler>,
    ) -> Self {
        Self {
            chain,
            kinds: kinds.into(),
            handlers: handlers.into(),
        }
    }

    /// Run the chain against `ctx` with no terminal continuation.
    pub async fn run(&self, ctx: Context) -> Result<Option<Value>, BoxError> {
        self.run_with(ctx, Next::noop()).await
    }

    /// Run the chain against `ctx`, calling `terminal` after the last step.
    ///
    /// Resolves `Ok(None)` on success or when an error was swallowed, and
    /// `Ok(Some(value))` when an error handler recovered with `value`. Fails
    /// only when a handler re-raises or a step ran its continuation twice.
    pub async fn run_with(&self, ctx: Context, terminal: Next) -> Result<Option<Value>, BoxError> {
        let outcome = AssertUnwindSafe(self.chain.call(ctx.clone(), terminal))
            .catch_unwind()
            .await;
        let error: BoxError = match outcome {
            Ok(Ok(())) => return Ok(None),
            Ok(Err(error)) => error,
            Err(payload) => ChainError::Panic(panic_message(&*payload)).into(),
        };
        if matches!(
            error.downcast_ref::<ChainError>(),
            Some(ChainError::DoubleContinuation)
        ) {
            return Err(error);
        }
        self.recover(SharedError::from(error), ctx).await
    }

    /// The first registered kind whose classifier matches `error`.
    pub fn kind_of(&self, error: &(dyn Error + Send + Sync + 'static)) -> Option<&str> {
        self.kinds
            .iter()
            .find(|(_, classify)| classify(error))
            .map(|(kind, _)| kind.as_str())
    }

    async fn recover(&self, error: SharedError, ctx: Context) -> Result<Option<Value>, BoxError> {
        let kind = self.kind_of(&*error).map(str::to_owned);
        for handler in self.handlers.iter() {
            let event = ErrorEvent {
                error: error.clone(),
                context: ctx.clone(),
                kind: kind.clone(),
            };
            if let Some(value) = handler(event).await? {
                return Ok(Some(value));
            }
        }
        let unhandled = ChainError::Unhandled(error);
        tracing::error!(error = %unhandled, kind = ?kind, "unhandled error in middleware chain");
        Ok(None)
    }
}

impl std::fmt::Debug for CompiledChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledChain")
            .field("steps", &self.chain.len())
            .field("kinds", &self.kinds.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
