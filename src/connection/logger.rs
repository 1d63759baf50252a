//! Logging callback handed down to dials and connections

use std::fmt;
use std::sync::Arc;

/// Printf-style logging callback.
///
/// Invoked on the dial, read and write paths with a pre-formatted line, so it
/// must not block for long.
pub type Logf = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// Logger forwarding every line to `tracing` at debug level
pub fn tracing_logger() -> Logf {
    Arc::new(|args: fmt::Arguments<'_>| tracing::debug!(target: "wire_dial", "{}", args))
}

/// Logger discarding every line
pub fn silent_logger() -> Logf {
    Arc::new(|_: fmt::Arguments<'_>| {})
}
