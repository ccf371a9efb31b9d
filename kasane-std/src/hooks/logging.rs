//! Tracer that logs entry activity through `tracing`.

use crate::composer::{EntryInfo, TraceExit, Tracer};
use kasane_core::Context;
use std::time::Instant;

/// A tracer emitting a `debug` event when each entry starts and settles.
#[derive(Debug, Clone, Copy)]
pub struct LoggingTracer {
    label: &'static str,
}

impl LoggingTracer {
    /// Create a tracer labelled `kasane`.
    pub fn new() -> Self {
        Self::named("kasane")
    }

    /// Create a tracer with a custom label, recorded as the `label` field of
    /// every event.
    pub fn named(label: &'static str) -> Self {
        Self { label }
    }
}

impl Default for LoggingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for LoggingTracer {
    fn enter(&self, entry: &EntryInfo, ctx: &Context) -> Option<TraceExit> {
        let label = self.label;
        let index = entry.index;
        let kind = entry.kind;
        let name = entry.name.clone();
        tracing::debug!(
            label,
            index,
            %kind,
            name = name.as_deref(),
            keys = ctx.len(),
            "entering middleware"
        );

        let started = Instant::now();
        let exit: TraceExit = Box::new(move |error| {
            let elapsed = started.elapsed();
            match error {
                Some(error) => tracing::debug!(
                    label,
                    index,
                    %kind,
                    name = name.as_deref(),
                    ?elapsed,
                    %error,
                    "middleware failed"
                ),
                None => tracing::debug!(
                    label,
                    index,
                    %kind,
                    name = name.as_deref(),
                    ?elapsed,
                    "middleware settled"
                ),
            }
        });
        Some(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use kasane_core::from_fn;

    #[tokio::test]
    async fn test_logging_tracer_is_transparent() {
        let mut composer = Composer::new()
            .step(from_fn(|ctx, next| async move {
                ctx.insert("seen", true);
                next.run().await
            }))
            .trace(LoggingTracer::new());

        let ctx = Context::new();
        let result = composer.run(ctx.clone()).await.unwrap();
        assert_eq!(result, None);
        assert!(ctx.contains("seen"));
    }

    #[test]
    fn test_named_sets_label() {
        assert_eq!(LoggingTracer::new().label, "kasane");
        assert_eq!(LoggingTracer::named("api").label, "api");
    }
}
