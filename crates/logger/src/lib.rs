//! Shared tracing setup for the watchup binaries.

mod tracing;

pub use self::tracing::{LogFormat, init_tracing, init_tracing_with_level};
