//! # kasane-std
//!
//! Standard implementations for the Kasane middleware composition framework.
//!
//! This crate provides:
//! - **Registry**: [`Composer`](composer::Composer) with scoping, plugin
//!   merging, snapshot isolation, an error boundary and macros
//! - **Event queue**: [`EventQueue`](queue::EventQueue)
//! - **Standard hooks**: Logging tracer, Timeout
//! - **Testing helpers**: [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use kasane_core;

// Modules
pub mod composer;
pub mod hooks;
pub mod queue;
pub mod testing;
