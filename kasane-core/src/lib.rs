//! # kasane-core
//!
//! Core traits for the Kasane middleware composition framework.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! plugins that only need to write middleware, without the registry in
//! `kasane-std`.
//!
//! # The Onion Model
//!
//! A chain is an ordered list of [`Middleware`]. Each step receives the shared
//! [`Context`] and a [`Next`] continuation:
//!
//! ```text
//!  step 1 ──► step 2 ──► step 3 ──► terminal
//!    ◄──────────◄───────────◄──────────┘
//! ```
//!
//! Code before `next.run().await` runs on the way in, code after it on the way
//! out. A step that does not run `next` stops everything after it.
//!
//! # Error Types
//!
//! - [`ChainError`] - Errors raised while a chain runs
//! - [`RegistrationError`] - Errors raised while building a composer

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod compose;
mod context;
mod error;
mod message;
mod middleware;

// Re-exports
pub use compose::{Composed, compose};
pub use context::{Context, Fields};
pub use error::{BoxError, ChainError, RegistrationError, SharedError, panic_message};
pub use message::Message;
pub use middleware::{
    BoxMiddleware, DynMiddleware, Middleware, Named, Next, StepResult, boxed, call_caught,
    from_fn, named,
};
