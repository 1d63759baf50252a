//! wire-dial: the transport layer beneath a database wire-protocol client
//!
//! This crate handles:
//! * Host selection and failover across a configured host list
//! * A process-wide pluggable transport factory (proxies, test doubles, instrumented sockets)
//! * A wrapped transport with full-read/full-write semantics, amortized deadlines
//!   and idempotent close
//!
//! Callers above this layer see opaque byte streams. Every I/O failure on an
//! established connection is reported as [`Error::BadConn`].
//!
//! ```no_run
//! # async fn example() -> wire_dial::Result<()> {
//! use wire_dial::{dial, DialOptions, OpenStrategy};
//! use std::time::Duration;
//!
//! let options = DialOptions::builder(["db1:9000", "db2:9000"])
//!     .strategy(OpenStrategy::InOrder)
//!     .read_timeout(Duration::from_secs(30))
//!     .build();
//!
//! let mut conn = dial(&options).await?;
//! conn.write(b"ping").await?;
//! let mut reply = [0u8; 4];
//! conn.read(&mut reply).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;

pub use client::{ConnectionInfo, DialSettings};
pub use connection::{
    deregister_dial, dial, register_dial, Connection, DialFn, DialHook, DialOptions, Dialer,
    OpenStrategy, Transport,
};
pub use error::{Error, Result};
