//! Error types for Kasane.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`ChainError`] - Errors raised while a middleware chain runs
//! - [`RegistrationError`] - Errors raised while building a composer
//!
//! Middleware themselves fail with a [`BoxError`]. Once an error reaches the
//! error boundary it is shared with error handlers as a [`SharedError`].

use std::{error::Error, fmt, ops::Deref, sync::Arc, time::Duration};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors that can occur while a middleware chain runs.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A middleware invoked its continuation more than once.
    #[error("next() called multiple times")]
    DoubleContinuation,

    /// A middleware panicked.
    #[error("middleware panicked: {0}")]
    Panic(String),

    /// An error escaped the chain and no error handler claimed it.
    ///
    /// Only ever logged by the error boundary; `run()` still resolves.
    #[error("unhandled error in middleware chain: {0}")]
    Unhandled(#[source] SharedError),

    /// A derive step produced something other than an object or null.
    #[error("enrichment must be an object or null, got {0}")]
    InvalidEnrichment(&'static str),

    /// A middleware wrapped in a timeout did not settle in time.
    #[error("middleware timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur while building a composer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A custom method name collides with a built-in registration method.
    #[error("method `{0}` conflicts with a built-in composer method")]
    MethodConflict(String),

    /// No custom method with this name was defined.
    #[error("no method named `{0}` is defined")]
    UnknownMethod(String),
}

/// A reference-counted error that can be handed to several error handlers.
///
/// Dereferences to `dyn Error + Send + Sync`, so `is::<T>()` and
/// `downcast_ref::<T>()` work directly on it.
#[derive(Clone)]
pub struct SharedError(Arc<dyn Error + Send + Sync + 'static>);

impl SharedError {
    /// Wrap an error.
    pub fn new<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self(Arc::new(error))
    }

    /// Box this error again, e.g. to re-raise it from an error handler.
    pub fn into_boxed(self) -> BoxError {
        Box::new(self)
    }
}

impl From<BoxError> for SharedError {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl Deref for SharedError {
    type Target = dyn Error + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for SharedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// Render a panic payload as a message.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
