//! # kasane - Onion Middleware Composition
//!
//! `kasane` layers middleware around a shared, dynamic context. Steps run in
//! order, each deciding whether to continue; plugins are merged with scoping,
//! deduplication and snapshot isolation; failures meet one error boundary per
//! compiled chain.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kasane::prelude::*;
//!
//! let auth = Composer::named("auth")
//!     .derive_as(Scope::Scoped, |ctx| async move {
//!         Ok(json!({ "user": ctx.get("token") }))
//!     });
//!
//! let mut app = Composer::new()
//!     .extend(&auth)
//!     .step(from_fn(|ctx, next| async move {
//!         ctx.insert("seen", true);
//!         next.run().await
//!     }))
//!     .on_error(|event| async move {
//!         Ok(Some(json!({ "error": event.error.to_string() })))
//!     });
//!
//! app.run(Context::from(json!({ "token": "t-1" }))).await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use kasane_core::{
    // Error types
    BoxError,
    // Middleware
    BoxMiddleware,
    ChainError,
    // Composition
    Composed,
    // Context
    Context,
    DynMiddleware,
    Fields,
    // Message
    Message,
    Middleware,
    Named,
    Next,
    RegistrationError,
    SharedError,
    StepResult,
    boxed,
    call_caught,
    chain,
    compose,
    from_fn,
    named,
    panic_message,
};

// Registry
pub use kasane_std::composer::{
    Classifier, CompiledChain, Composer, ComposerOptions, Condition, EntryInfo, EntryKind,
    ErrorEvent, HandlerOptions, HandlerOutcome, Isolated, MacroDef, MacroHooks, RouteCase, Scope,
    TraceExit, Tracer, build_from_options, on_exit,
};

// Event queue
pub use kasane_std::queue::{DEFAULT_STOP_TIMEOUT, EventQueue};

pub use serde_json::{Value, json};

/// Registry support module.
pub mod composer {
    #![allow(clippy::wildcard_imports)]
    pub use kasane_std::composer::*;
}

/// Standard middleware and tracers.
pub mod hooks {
    #![allow(clippy::wildcard_imports)]
    pub use kasane_std::hooks::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use kasane_std::testing::*;
}

/// Prelude module - common imports for Kasane.
///
/// # Usage
///
/// ```rust,ignore
/// use kasane::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Errors
        BoxError,
        // Core traits
        BoxMiddleware,
        ChainError,
        // Registry
        Composer,
        ComposerOptions,
        Condition,
        Context,
        ErrorEvent,
        EventQueue,
        HandlerOptions,
        MacroDef,
        MacroHooks,
        Middleware,
        Next,
        RouteCase,
        Scope,
        StepResult,
        Value,
        boxed,
        compose,
        from_fn,
        json,
    };
}
