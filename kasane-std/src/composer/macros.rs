//! Macros: named bundles of pre-steps and a context enrichment, switched on
//! per handler through [`HandlerOptions`].
//!
//! ```rust,ignore
//! let app = Composer::new()
//!     .define_macro("auth", MacroHooks::new().derive(|ctx| async move {
//!         Ok(ctx.get("token").map(|token| json!({ "user": token })))
//!     }))
//!     .handle(HandlerOptions::new().with("auth", true), reply);
//! ```

use futures::future::BoxFuture;
use kasane_core::{
    BoxError, BoxMiddleware, Context, Middleware, Next, StepResult, boxed, compose,
};
use serde_json::Value;
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

/// A macro's enrichment: `None` stops the chain, `Some(fields)` is merged.
pub type MacroDerive =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<Option<Value>, BoxError>> + Send + Sync>;

/// What a macro contributes to a handler's chain.
#[derive(Clone, Default)]
pub struct MacroHooks {
    pre_handler: Vec<BoxMiddleware>,
    derive: Option<MacroDerive>,
}

impl MacroHooks {
    /// Empty hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step that runs before the handler.
    pub fn pre_handler<M: Middleware>(mut self, middleware: M) -> Self {
        self.pre_handler.push(boxed(middleware));
        self
    }

    /// Set the enrichment step. Returning `Ok(None)` acts as an inline guard.
    pub fn derive<F, Fut>(mut self, derive: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
    {
        self.derive = Some(Arc::new(
            move |ctx: Context| -> BoxFuture<'static, Result<Option<Value>, BoxError>> {
                Box::pin(derive(ctx))
            },
        ));
        self
    }
}

impl fmt::Debug for MacroHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroHooks")
            .field("pre_handler", &self.pre_handler.len())
            .field("derive", &self.derive.is_some())
            .finish()
    }
}

/// A macro definition.
#[derive(Clone)]
pub enum MacroDef {
    /// Built from the option value; `true` is passed as `None`.
    Parameterized(Arc<dyn Fn(Option<Value>) -> MacroHooks + Send + Sync>),
    /// The same hooks whatever the option value.
    Static(MacroHooks),
}

impl MacroDef {
    /// A macro that receives its option value.
    pub fn parameterized<F>(build: F) -> Self
    where
        F: Fn(Option<Value>) -> MacroHooks + Send + Sync + 'static,
    {
        Self::Parameterized(Arc::new(build))
    }

    /// Resolve the hooks for an option value.
    pub fn resolve(&self, value: &Value) -> MacroHooks {
        match self {
            Self::Static(hooks) => hooks.clone(),
            Self::Parameterized(build) => match value {
                Value::Bool(true) => build(None),
                other => build(Some(other.clone())),
            },
        }
    }
}

impl From<MacroHooks> for MacroDef {
    fn from(hooks: MacroHooks) -> Self {
        Self::Static(hooks)
    }
}

impl fmt::Debug for MacroDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameterized(_) => f.write_str("Parameterized(..)"),
            Self::Static(hooks) => f.debug_tuple("Static").field(hooks).finish(),
        }
    }
}

/// Per-handler options: explicit pre-steps plus macro switches, in
/// declaration order.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    pre_handler: Vec<BoxMiddleware>,
    macros: Vec<(String, Value)>,
}

impl HandlerOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit step that runs before any macro.
    pub fn pre_handler<M: Middleware>(mut self, middleware: M) -> Self {
        self.pre_handler.push(boxed(middleware));
        self
    }

    /// Switch a macro on (`true` or a parameter value) or off (`false`/`null`).
    ///
    /// Setting the same macro twice keeps its original position.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.macros.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.macros.push((name, value)),
        }
        self
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("pre_handler", &self.pre_handler.len())
            .field("macros", &self.macros)
            .finish()
    }
}

struct MacroDeriveStep {
    derive: MacroDerive,
}

impl Middleware for MacroDeriveStep {
    async fn call(&self, ctx: Context, next: Next) -> StepResult {
        match (self.derive)(ctx.clone()).await? {
            Some(enrichment) => {
                ctx.enrich(enrichment)?;
                next.run().await
            }
            None => Ok(()),
        }
    }
}

/// Build the chain for `handler` from its options.
///
/// Order: explicit pre-steps, then for every enabled macro (declaration order)
/// its pre-steps and derive step, then the handler.
pub fn build_from_options(
    macros: &HashMap<String, MacroDef>,
    options: Option<&HandlerOptions>,
    handler: BoxMiddleware,
) -> BoxMiddleware {
    let Some(options) = options else {
        return handler;
    };

    let mut steps = options.pre_handler.clone();
    for (name, value) in &options.macros {
        if matches!(value, Value::Bool(false) | Value::Null) {
            continue;
        }
        let Some(definition) = macros.get(name) else {
            continue;
        };
        let hooks = definition.resolve(value);
        steps.extend(hooks.pre_handler);
        if let Some(derive) = hooks.derive {
            steps.push(boxed(MacroDeriveStep { derive }));
        }
    }
    steps.push(handler);

    if steps.len() == 1 {
        return steps.remove(0);
    }
    boxed(compose(steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_core::from_fn;
    use serde_json::json;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn record(label: &'static str, log: Arc<Mutex<Vec<String>>>) -> impl Middleware {
        from_fn(move |_ctx, next| {
            log.lock().unwrap().push(label.to_string());
            async move { next.run().await }
        })
    }

    #[tokio::test]
    async fn test_no_options_returns_handler() {
        let handler = boxed(record("handler", Arc::default()));
        let built = build_from_options(&HashMap::new(), None, handler.clone());
        assert!(Arc::ptr_eq(&built, &handler));
    }

    #[tokio::test]
    async fn test_single_step_is_unwrapped() {
        let handler = boxed(record("handler", Arc::default()));
        let options = HandlerOptions::new().with("unknown", true);
        let built = build_from_options(&HashMap::new(), Some(&options), handler.clone());
        assert!(Arc::ptr_eq(&built, &handler));
    }

    #[tokio::test]
    async fn test_pipeline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut macros = HashMap::new();
        macros.insert(
            "first".to_string(),
            MacroDef::from(MacroHooks::new().pre_handler(record("first", log.clone()))),
        );
        macros.insert(
            "second".to_string(),
            MacroDef::from(MacroHooks::new().pre_handler(record("second", log.clone()))),
        );
        macros.insert(
            "disabled".to_string(),
            MacroDef::from(MacroHooks::new().pre_handler(record("disabled", log.clone()))),
        );

        let options = HandlerOptions::new()
            .pre_handler(record("explicit", log.clone()))
            .with("second", true)
            .with("disabled", false)
            .with("first", true);
        let built = build_from_options(
            &macros,
            Some(&options),
            boxed(record("handler", log.clone())),
        );
        built.call_dyn(Context::new(), Next::noop()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["explicit", "second", "first", "handler"]
        );
    }

    #[tokio::test]
    async fn test_parameterized_macro_receives_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let mut macros = HashMap::new();
        macros.insert(
            "role".to_string(),
            MacroDef::parameterized(move |value| {
                recorder.lock().unwrap().push(value.clone());
                MacroHooks::new().derive(move |_ctx| {
                    let value = value.clone();
                    async move { Ok(Some(json!({ "role": value }))) }
                })
            }),
        );

        let ctx = Context::new();
        let options = HandlerOptions::new().with("role", "admin");
        let built = build_from_options(&macros, Some(&options), boxed(record("h", Arc::default())));
        built.call_dyn(ctx.clone(), Next::noop()).await.unwrap();

        let options = HandlerOptions::new().with("role", true);
        build_from_options(&macros, Some(&options), boxed(record("h", Arc::default())));

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("admin")), None]);
        assert_eq!(ctx.get("role"), Some(json!("admin")));
    }

    #[tokio::test]
    async fn test_derive_none_stops_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut macros = HashMap::new();
        macros.insert(
            "auth".to_string(),
            MacroDef::from(MacroHooks::new().derive(|ctx| async move {
                Ok(ctx.get("token").map(|token| json!({ "user": token })))
            })),
        );

        let handler = boxed(from_fn(move |_ctx, next| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { next.run().await }
        }));
        let options = HandlerOptions::new().with("auth", true);
        let built = build_from_options(&macros, Some(&options), handler);

        built.call_dyn(Context::new(), Next::noop()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let ctx = Context::from(json!({ "token": "t-1" }));
        built.call_dyn(ctx.clone(), Next::noop()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.get("user"), Some(json!("t-1")));
    }
}
