//! Registration operations.
//!
//! Every operation consumes the composer and returns it, so registrations
//! chain. Each one drops the cached compiled chain.

use super::{
    Composer, EntryKind, ErrorEvent, HandlerOptions, HandlerOutcome, MacroDef, Scope,
    build_from_options,
    isolation::Isolated,
    steps::{
        BranchStep, Condition, DecorateStep, DeriveStep, ForkStep, GuardStep, LazyStep,
        RouteCase, RouteStep, TapStep,
    },
};
use futures::future::BoxFuture;
use kasane_core::{BoxError, BoxMiddleware, Context, Middleware, boxed};
use serde_json::Value;
use std::{collections::HashMap, error::Error, future::Future, sync::Arc};

impl Composer {
    /// Append a raw step.
    pub fn step<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(boxed(middleware), EntryKind::Use, Scope::Local);
        self
    }

    /// Append several raw steps, one entry each.
    pub fn steps<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = BoxMiddleware>,
    {
        for step in steps {
            self.push(step, EntryKind::Use, Scope::Local);
        }
        self
    }

    /// Append a step that merges the object returned by `derive` into the
    /// context, then continues.
    pub fn derive<F, Fut>(self, derive: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send,
    {
        self.derive_as(Scope::Local, derive)
    }

    /// [`derive`](Self::derive) with an explicit scope.
    pub fn derive_as<F, Fut>(mut self, scope: Scope, derive: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send,
    {
        self.push(boxed(DeriveStep::new(derive)), EntryKind::Derive, scope);
        self
    }

    /// Append a step that merges a fixed object into the context.
    pub fn decorate(self, values: impl Into<Value>) -> Self {
        self.decorate_as(Scope::Local, values)
    }

    /// [`decorate`](Self::decorate) with an explicit scope.
    pub fn decorate_as(mut self, scope: Scope, values: impl Into<Value>) -> Self {
        self.push(
            boxed(DecorateStep::new(values.into())),
            EntryKind::Decorate,
            scope,
        );
        self
    }

    /// Gate: continue only when `predicate` holds.
    ///
    /// Inside a plugin merged with [`extend`](Self::extend), a failed gate
    /// skips the rest of the plugin but never the parent's later steps.
    pub fn guard<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.push(
            boxed(GuardStep::gate(Arc::new(predicate))),
            EntryKind::Guard,
            Scope::Local,
        );
        self
    }

    /// Side effect: run `middleware` when `predicate` holds, then always
    /// continue.
    pub fn guard_with<P, M>(mut self, predicate: P, middleware: M) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
        M: Middleware,
    {
        self.push(
            boxed(GuardStep::side_effect(Arc::new(predicate), boxed(middleware))),
            EntryKind::Guard,
            Scope::Local,
        );
        self
    }

    /// Run `on_true` when `condition` holds; otherwise continue.
    ///
    /// A [`Condition::Static`] is resolved now: `true` registers `on_true`
    /// directly and `false` registers nothing.
    pub fn branch<T: Middleware>(self, condition: impl Into<Condition>, on_true: T) -> Self {
        self.register_branch(condition.into(), boxed(on_true), None)
    }

    /// Run `on_true` or `on_false` depending on `condition`.
    ///
    /// A [`Condition::Static`] is resolved now and only the chosen side is
    /// registered.
    pub fn branch_else<T, F>(self, condition: impl Into<Condition>, on_true: T, on_false: F) -> Self
    where
        T: Middleware,
        F: Middleware,
    {
        self.register_branch(condition.into(), boxed(on_true), Some(boxed(on_false)))
    }

    fn register_branch(
        mut self,
        condition: Condition,
        on_true: BoxMiddleware,
        on_false: Option<BoxMiddleware>,
    ) -> Self {
        match condition {
            Condition::Static(true) => self.push(on_true, EntryKind::Branch, Scope::Local),
            Condition::Static(false) => {
                if let Some(on_false) = on_false {
                    self.push(on_false, EntryKind::Branch, Scope::Local);
                }
            }
            Condition::Dynamic(predicate) => self.push(
                boxed(BranchStep::new(predicate, on_true, on_false)),
                EntryKind::Branch,
                Scope::Local,
            ),
        }
        self
    }

    /// Dispatch to the case named by `router`; continue when none matches.
    pub fn route<R, K, I>(self, router: R, cases: I) -> Self
    where
        R: Fn(&Context) -> Option<String> + Send + Sync + 'static,
        K: Into<String>,
        I: IntoIterator<Item = (K, RouteCase)>,
    {
        self.register_route(router, cases, None)
    }

    /// [`route`](Self::route) with a fallback for unmatched keys.
    pub fn route_or<R, K, I>(self, router: R, cases: I, fallback: RouteCase) -> Self
    where
        R: Fn(&Context) -> Option<String> + Send + Sync + 'static,
        K: Into<String>,
        I: IntoIterator<Item = (K, RouteCase)>,
    {
        self.register_route(router, cases, Some(fallback))
    }

    fn register_route<R, K, I>(mut self, router: R, cases: I, fallback: Option<RouteCase>) -> Self
    where
        R: Fn(&Context) -> Option<String> + Send + Sync + 'static,
        K: Into<String>,
        I: IntoIterator<Item = (K, RouteCase)>,
    {
        let cases: HashMap<String, BoxMiddleware> = cases
            .into_iter()
            .map(|(key, case)| (key.into(), case.into_middleware()))
            .collect();
        let step = RouteStep::new(
            Arc::new(router),
            cases,
            fallback.map(RouteCase::into_middleware),
        );
        self.push(boxed(step), EntryKind::Route, Scope::Local);
        self
    }

    /// Start `middleware` on a detached task and continue immediately.
    ///
    /// Requires a tokio runtime. The forked chain's failures are logged and
    /// discarded.
    pub fn fork<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(
            boxed(ForkStep::new(boxed(middleware))),
            EntryKind::Fork,
            Scope::Local,
        );
        self
    }

    /// Run `middleware` to completion with a no-op continuation, then continue.
    pub fn tap<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(
            boxed(TapStep::new(boxed(middleware))),
            EntryKind::Tap,
            Scope::Local,
        );
        self
    }

    /// Build a step from the context on every invocation and run it.
    pub fn lazy<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BoxMiddleware, BoxError>> + Send,
    {
        self.push(
            boxed(LazyStep::new(factory)),
            EntryKind::Lazy,
            Scope::Local,
        );
        self
    }

    /// Register an error handler. Handlers run in registration order.
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ErrorEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        self.error_handlers
            .push(Arc::new(move |event: ErrorEvent| -> BoxFuture<'static, HandlerOutcome> {
                Box::pin(handler(event))
            }));
        self.invalidate();
        self
    }

    /// Register a named error kind. Re-registering a kind replaces its
    /// classifier but keeps its position.
    pub fn error_kind<C>(mut self, kind: impl Into<String>, classifier: C) -> Self
    where
        C: Fn(&(dyn Error + Send + Sync + 'static)) -> bool + Send + Sync + 'static,
    {
        self.set_error_kind(kind.into(), Arc::new(classifier));
        self
    }

    /// Register a named kind matching errors of type `E`.
    pub fn error_class<E: Error + 'static>(self, kind: impl Into<String>) -> Self {
        self.error_kind(kind, |error| error.is::<E>())
    }

    pub(crate) fn set_error_kind(&mut self, kind: String, classifier: super::Classifier) {
        match self.error_kinds.iter_mut().find(|(existing, _)| *existing == kind) {
            Some((_, slot)) => *slot = classifier,
            None => self.error_kinds.push((kind, classifier)),
        }
        self.invalidate();
    }

    /// Configure a nested composer and append it as one isolated local step.
    ///
    /// The nested composer's error kinds and handlers join this composer's.
    pub fn group<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(Composer) -> Composer,
    {
        let nested = configure(Composer::new());
        for (kind, classifier) in &nested.error_kinds {
            self.set_error_kind(kind.clone(), classifier.clone());
        }
        self.error_handlers
            .extend(nested.error_handlers.iter().cloned());
        let isolated = Isolated::new(boxed(nested.chain()));
        self.push(boxed(isolated), EntryKind::Group, Scope::Local);
        self
    }

    /// Register a macro, replacing any previous definition of `name`.
    pub fn define_macro(mut self, name: impl Into<String>, definition: impl Into<MacroDef>) -> Self {
        self.macros.insert(name.into(), definition.into());
        self.invalidate();
        self
    }

    /// Register several macros.
    pub fn define_macros<K, I>(mut self, definitions: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, MacroDef)>,
    {
        self.macros
            .extend(definitions.into_iter().map(|(name, def)| (name.into(), def)));
        self.invalidate();
        self
    }

    /// Whether a macro named `name` is registered.
    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Append `handler` preceded by the steps its options switch on.
    ///
    /// Macros are resolved against the definitions registered so far.
    pub fn handle<M: Middleware>(mut self, options: HandlerOptions, handler: M) -> Self {
        let step = build_from_options(&self.macros, Some(&options), boxed(handler));
        self.push(step, EntryKind::Use, Scope::Local);
        self
    }
}
