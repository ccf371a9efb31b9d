//! Standard middleware and tracers.

mod logging;
mod timeout;

pub use logging::LoggingTracer;
pub use timeout::Timeout;
