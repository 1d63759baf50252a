//! Plain-data dial settings for configuration loaders

use crate::connection::{
    silent_logger, tracing_logger, DialOptions, OpenStrategy, TlsConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dial settings as found in configuration files.
///
/// Timeouts are in seconds and may be fractional. Missing fields take the
/// same defaults as [`DialOptions::new`], except logging, which is off unless
/// `debug` is set.
///
/// ```ignore
/// let settings: DialSettings = serde_json::from_str(r#"{
///     "hosts": ["db1:9000", "db2:9000"],
///     "open_strategy": "in_order",
///     "read_timeout": 30
/// }"#)?;
/// let options = settings.into_options()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialSettings {
    /// Candidate `host:port` addresses
    pub hosts: Vec<String>,
    /// Connect over TLS
    pub secure: bool,
    /// Skip server certificate verification
    pub skip_verify: bool,
    /// CA certificate file (PEM) for secure dials
    pub tls_ca: Option<String>,
    /// Per-host connect timeout, seconds
    pub connect_timeout: f64,
    /// Read timeout, seconds
    pub read_timeout: f64,
    /// Write timeout, seconds
    pub write_timeout: f64,
    /// Disable Nagle's algorithm
    pub no_delay: bool,
    /// Host visitation order
    #[serde(alias = "connection_open_strategy")]
    pub open_strategy: OpenStrategy,
    /// Send dial and I/O diagnostics to `tracing`
    pub debug: bool,
}

impl Default for DialSettings {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            secure: false,
            skip_verify: false,
            tls_ca: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT.as_secs_f64(),
            read_timeout: DEFAULT_READ_TIMEOUT.as_secs_f64(),
            write_timeout: DEFAULT_WRITE_TIMEOUT.as_secs_f64(),
            no_delay: true,
            open_strategy: OpenStrategy::default(),
            debug: false,
        }
    }
}

impl DialSettings {
    /// Validate and convert into [`DialOptions`]
    pub fn into_options(self) -> Result<DialOptions> {
        if self.hosts.is_empty() {
            return Err(Error::Config("at least one host is required".into()));
        }

        let mut builder = DialOptions::builder(self.hosts)
            .secure(self.secure)
            .skip_verify(self.skip_verify)
            .connect_timeout(seconds("connect_timeout", self.connect_timeout)?)
            .read_timeout(seconds("read_timeout", self.read_timeout)?)
            .write_timeout(seconds("write_timeout", self.write_timeout)?)
            .no_delay(self.no_delay)
            .strategy(self.open_strategy)
            .logger(if self.debug {
                tracing_logger()
            } else {
                silent_logger()
            });

        if let Some(ca_path) = self.tls_ca {
            builder = builder.tls_config(TlsConfig::builder().ca_cert_path(ca_path).build()?);
        }

        Ok(builder.build())
    }
}

/// Parse a timeout given in (possibly fractional) seconds
pub(crate) fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::Config(format!("invalid {}: {}", name, value)))
}
