//! The middleware registry.
//!
//! A [`Composer`] collects steps through chaining registration methods and
//! compiles them, on demand, into a [`CompiledChain`] wrapped in an error
//! boundary. The compiled chain is cached until the next mutation.
//!
//! # Example
//!
//! ```rust,ignore
//! use kasane_std::composer::Composer;
//! use serde_json::json;
//!
//! let mut app = Composer::new()
//!     .derive(|_ctx| async { Ok(json!({ "b": "x" })) })
//!     .step(from_fn(|ctx, next| async move {
//!         assert_eq!(ctx.get("b"), Some(json!("x")));
//!         next.run().await
//!     }));
//!
//! app.run(Context::from(json!({ "a": 1 }))).await?;
//! ```

mod boundary;
mod entry;
mod isolation;
mod macros;
mod merge;
mod methods;
mod ops;
mod steps;
mod trace;

pub use boundary::{Classifier, CompiledChain, ErrorEvent, ErrorHandler, HandlerOutcome};
pub use entry::{EntryInfo, EntryKind, MiddlewareEntry, Scope};
pub use isolation::{Isolated, restore};
pub use macros::{HandlerOptions, MacroDef, MacroDerive, MacroHooks, build_from_options};
pub use methods::{Method, RESERVED_METHODS};
pub use steps::{Condition, Predicate, RouteCase, Router};
pub use trace::{TraceExit, Tracer, on_exit};

use kasane_core::{BoxError, BoxMiddleware, Composed, Context, Next, boxed, compose};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};
use trace::Traced;

/// Identity of a composer, used for plugin deduplication.
#[derive(Debug, Clone, Default)]
pub struct ComposerOptions {
    name: Option<String>,
    seed: Option<Value>,
}

impl ComposerOptions {
    /// Anonymous composer: never deduplicated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plugin name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the seed distinguishing instances of the same plugin.
    pub fn with_seed(mut self, seed: impl Into<Value>) -> Self {
        self.seed = Some(seed.into());
        self
    }
}

/// A middleware registry with scoping, plugin merging and an error boundary.
#[derive(Clone)]
pub struct Composer {
    name: Option<String>,
    seed: Option<Value>,
    entries: Vec<MiddlewareEntry>,
    error_handlers: Vec<ErrorHandler>,
    error_kinds: Vec<(String, Classifier)>,
    macros: HashMap<String, MacroDef>,
    dedup: HashSet<String>,
    methods: HashMap<String, Method>,
    tracer: Option<Arc<dyn Tracer>>,
    compiled: Option<Arc<CompiledChain>>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    /// Create an anonymous, empty composer.
    pub fn new() -> Self {
        Self::with_options(ComposerOptions::default())
    }

    /// Create an empty composer with the given identity.
    pub fn with_options(options: ComposerOptions) -> Self {
        Self {
            name: options.name,
            seed: options.seed,
            entries: Vec::new(),
            error_handlers: Vec::new(),
            error_kinds: Vec::new(),
            macros: HashMap::new(),
            dedup: HashSet::new(),
            methods: HashMap::new(),
            tracer: None,
            compiled: None,
        }
    }

    /// Shorthand for a named composer without a seed.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_options(ComposerOptions::new().with_name(name))
    }

    /// Plugin name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Plugin seed, if any.
    pub fn seed(&self) -> Option<&Value> {
        self.seed.as_ref()
    }

    /// Deduplication key: the name followed by the canonical JSON of the seed
    /// (`null` when absent). Anonymous composers have none.
    pub fn dedup_key(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        let seed = self.seed.as_ref().map(canonical).unwrap_or(Value::Null);
        Some(format!("{name}{seed}"))
    }

    /// Whether a plugin with `key` has already been merged, directly or
    /// transitively.
    pub fn has_extended(&self, key: &str) -> bool {
        self.dedup.contains(key)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a compiled chain is cached.
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Drop the cached compiled chain.
    pub fn invalidate(&mut self) {
        self.compiled = None;
    }

    pub(crate) fn push(&mut self, handler: BoxMiddleware, kind: EntryKind, scope: Scope) {
        let mut entry = MiddlewareEntry::new(handler, kind, scope);
        entry.plugin = self.dedup_key();
        self.push_entry(entry);
    }

    pub(crate) fn push_entry(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
        self.invalidate();
    }

    fn chain_of<'a, I>(&self, entries: I) -> Composed
    where
        I: IntoIterator<Item = (usize, &'a MiddlewareEntry)>,
    {
        let steps = entries.into_iter().map(|(index, entry)| match &self.tracer {
            Some(tracer) => boxed(Traced::new(
                entry.info(index),
                entry.handler.clone(),
                tracer.clone(),
            )),
            None => entry.handler.clone(),
        });
        compose(steps.collect::<Vec<_>>())
    }

    /// The raw onion chain of every entry, without the error boundary.
    pub fn chain(&self) -> Composed {
        self.chain_of(self.entries.iter().enumerate())
    }

    /// Compile the registry, reusing the cached chain when nothing changed.
    pub fn compose(&mut self) -> Arc<CompiledChain> {
        if let Some(compiled) = &self.compiled {
            return compiled.clone();
        }
        let compiled = Arc::new(CompiledChain::new(
            self.chain(),
            self.error_kinds.clone(),
            self.error_handlers.clone(),
        ));
        tracing::debug!(
            composer = self.name.as_deref().unwrap_or("<anonymous>"),
            entries = self.entries.len(),
            handlers = self.error_handlers.len(),
            "compiled middleware chain"
        );
        self.compiled = Some(compiled.clone());
        compiled
    }

    /// Compile if needed and run against `ctx`.
    ///
    /// See [`CompiledChain::run_with`] for the result.
    pub async fn run(&mut self, ctx: Context) -> Result<Option<Value>, BoxError> {
        self.run_with(ctx, Next::noop()).await
    }

    /// Compile if needed and run against `ctx` with a terminal continuation.
    pub async fn run_with(
        &mut self,
        ctx: Context,
        terminal: Next,
    ) -> Result<Option<Value>, BoxError> {
        let compiled = self.compose();
        compiled.run_with(ctx, terminal).await
    }

    /// Read-only view of the registry.
    pub fn inspect(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.info(index))
            .collect()
    }

    /// Install a tracer; the next compile wraps every entry with it.
    pub fn trace<T: Tracer>(mut self, tracer: T) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self.invalidate();
        self
    }

    /// Remove the tracer.
    pub fn untrace(mut self) -> Self {
        self.tracer = None;
        self.invalidate();
        self
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("name", &self.name)
            .field("seed", &self.seed)
            .field("entries", &self.entries)
            .field("error_handlers", &self.error_handlers.len())
            .field(
                "error_kinds",
                &self.error_kinds.iter().map(|(kind, _)| kind).collect::<Vec<_>>(),
            )
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .field("dedup", &self.dedup)
            .field("compiled", &self.compiled.is_some())
            .finish_non_exhaustive()
    }
}

/// Copy of `value` with object keys sorted, so equal seeds print equally.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|key| (key.clone(), canonical(&map[key])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
