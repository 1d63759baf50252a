//! Connection management
//!
//! This module handles:
//! * Host selection and failover (open strategies)
//! * The pluggable transport factory
//! * Transport abstraction (TCP, TLS over TCP, custom streams)
//! * The wrapped connection handed to protocol code
//! * TLS configuration and support

mod conn;
mod dial;
mod hook;
mod logger;
mod strategy;
mod tls;
mod transport;

pub use conn::Connection;
pub use dial::{
    dial, DialOptions, DialOptionsBuilder, Dialer, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
pub use hook::{deregister_dial, dial_fn, global as global_dial_hook, register_dial, DialFn, DialHook};
pub use logger::{silent_logger, tracing_logger, Logf};
pub use strategy::{unix_micros, HostOrder, IdentGenerator, OpenStrategy};
pub use tls::{server_name_for, TlsConfig, TlsConfigBuilder};
pub use transport::{CustomStream, Transport};
