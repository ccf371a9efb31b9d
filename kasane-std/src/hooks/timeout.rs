//! Timeout middleware for time-limited steps.

use kasane_core::{ChainError, Context, Middleware, Next, StepResult};
use std::time::Duration;
use tokio::time::timeout;

/// A middleware that fails with [`ChainError::Timeout`] when `inner` (and
/// everything it awaits downstream) takes longer than `duration`.
///
/// The inner future is dropped on expiry; work it already spawned keeps
/// running.
pub struct Timeout<M> {
    inner: M,
    duration: Duration,
}

impl<M> Timeout<M> {
    /// Wrap `inner` with a time limit.
    pub fn new(inner: M, duration: Duration) -> Self {
        Self { inner, duration }
    }
}

impl<M: Middleware> Middleware for Timeout<M> {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        match timeout(self.duration, self.inner.call(ctx, next)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.duration).into()),
        }
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_core::from_fn;

    #[tokio::test]
    async fn test_timeout_expires() {
        let slow = from_fn(|_ctx, next| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            next.run().await
        });
        let err = Timeout::new(slow, Duration::from_millis(10))
            .call(Context::new(), Next::noop())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_fast_step_passes() {
        let fast = from_fn(|ctx, next| async move {
            ctx.insert("done", true);
            next.run().await
        });
        let ctx = Context::new();
        Timeout::new(fast, Duration::from_secs(1))
            .call(ctx.clone(), Next::noop())
            .await
            .unwrap();
        assert!(ctx.contains("done"));
    }
}
