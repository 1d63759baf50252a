//! Dial orchestration: host failover and connection setup

use super::conn::Connection;
use super::hook::{self, DialHook};
use super::logger::{tracing_logger, Logf};
use super::strategy::{self, HostOrder, IdentGenerator, OpenStrategy};
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::metrics;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Default time allowed to connect to a single host
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout on an established connection
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// Default write timeout on an established connection
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Dial configuration
///
/// Immutable for the duration of one dial call. Use `DialOptions::builder()`
/// to override the defaults.
#[derive(Clone)]
pub struct DialOptions {
    /// Connect over TLS
    pub secure: bool,
    /// Skip server certificate verification (secure dials only)
    pub skip_verify: bool,
    /// TLS settings; `None` with `secure` set means system defaults
    pub tls_config: Option<TlsConfig>,
    /// Candidate `host:port` addresses
    pub hosts: Vec<String>,
    /// Time allowed to connect to a single host (zero = no limit)
    pub connect_timeout: Duration,
    /// Read timeout on the established connection (zero = none)
    pub read_timeout: Duration,
    /// Write timeout on the established connection (zero = none)
    pub write_timeout: Duration,
    /// Disable Nagle's algorithm
    pub no_delay: bool,
    /// Host visitation order
    pub strategy: OpenStrategy,
    /// Logging callback
    pub logger: Logf,
}

impl DialOptions {
    /// Options with defaults for the given hosts
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            secure: false,
            skip_verify: false,
            tls_config: None,
            hosts: hosts.into_iter().map(Into::into).collect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            no_delay: true,
            strategy: OpenStrategy::default(),
            logger: tracing_logger(),
        }
    }

    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let options = DialOptions::builder(["db1:9000", "db2:9000"])
    ///     .strategy(OpenStrategy::InOrder)
    ///     .connect_timeout(Duration::from_secs(2))
    ///     .build();
    /// ```
    pub fn builder<I, S>(hosts: I) -> DialOptionsBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DialOptionsBuilder {
            options: Self::new(hosts),
        }
    }

    /// TLS client config for a secure dial, with `skip_verify` applied
    fn client_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        let tls = match &self.tls_config {
            Some(tls) => tls.clone(),
            None => TlsConfig::system()?,
        };
        Ok(tls.client_config_for(self.skip_verify))
    }
}

impl std::fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialOptions")
            .field("secure", &self.secure)
            .field("skip_verify", &self.skip_verify)
            .field("tls_config", &self.tls_config)
            .field("hosts", &self.hosts)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("no_delay", &self.no_delay)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DialOptions`]
#[derive(Debug, Clone)]
pub struct DialOptionsBuilder {
    options: DialOptions,
}

impl DialOptionsBuilder {
    /// Connect over TLS
    pub fn secure(mut self, secure: bool) -> Self {
        self.options.secure = secure;
        self
    }

    /// Skip server certificate verification
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.options.skip_verify = skip;
        self
    }

    /// Supply TLS settings
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.options.tls_config = Some(tls);
        self
    }

    /// Set the per-host connect timeout
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.options.connect_timeout = duration;
        self
    }

    /// Set the read timeout
    ///
    /// Default: 60 seconds
    pub fn read_timeout(mut self, duration: Duration) -> Self {
        self.options.read_timeout = duration;
        self
    }

    /// Set the write timeout
    ///
    /// Default: 60 seconds
    pub fn write_timeout(mut self, duration: Duration) -> Self {
        self.options.write_timeout = duration;
        self
    }

    /// Enable or disable TCP_NODELAY (default: enabled)
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.options.no_delay = no_delay;
        self
    }

    /// Set the host visitation order
    pub fn strategy(mut self, strategy: OpenStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Set the logging callback
    pub fn logger(mut self, logger: Logf) -> Self {
        self.options.logger = logger;
        self
    }

    /// Build the options
    pub fn build(self) -> DialOptions {
        self.options
    }
}

/// Opens connections, trying hosts one at a time until one answers.
///
/// A default `Dialer` uses the process-wide transport factory and identity
/// counter; both can be replaced per dialer.
#[derive(Clone)]
pub struct Dialer {
    hook: Option<Arc<DialHook>>,
    idents: Option<Arc<IdentGenerator>>,
    clock: fn() -> u64,
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("hook", &self.hook)
            .field("idents", &self.idents)
            .finish_non_exhaustive()
    }
}

impl Dialer {
    /// Dialer backed by process-wide state
    pub fn new() -> Self {
        Self {
            hook: None,
            idents: None,
            clock: strategy::unix_micros,
        }
    }

    /// Use this transport factory slot instead of the process-wide one
    pub fn with_hook(mut self, hook: Arc<DialHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Use this identity generator instead of the process-wide one
    pub fn with_idents(mut self, idents: Arc<IdentGenerator>) -> Self {
        self.idents = Some(idents);
        self
    }

    /// Microsecond clock sampled by [`OpenStrategy::TimeRandom`]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    fn hook(&self) -> &DialHook {
        self.hook.as_deref().unwrap_or_else(|| hook::global())
    }

    fn next_ident(&self) -> usize {
        match &self.idents {
            Some(idents) => idents.next_ident(),
            None => strategy::global_idents().next_ident(),
        }
    }

    /// Connect to the first host that answers.
    ///
    /// Hosts are visited in the order given by `options.strategy`, one at a
    /// time. Failed attempts are logged and skipped; if every host fails, the
    /// error of the last attempt is returned. A failure to apply `no_delay`
    /// on a connected socket aborts the dial.
    pub async fn dial(&self, options: &DialOptions) -> Result<Connection> {
        if options.hosts.is_empty() {
            return Err(Error::Config("no hosts configured".into()));
        }

        let ident = self.next_ident();
        let strategy = options.strategy.as_str();
        async {
            let tls = if options.secure {
                Some(options.client_config()?)
            } else {
                None
            };

            let started = std::time::Instant::now();
            let mut last_err = None;
            let order = HostOrder::new(options.hosts.len(), options.strategy, ident)
                .with_clock(self.clock);

            for num in order {
                let host = &options.hosts[num];
                metrics::counters::dial_attempted(strategy);

                let dial_fn = self.hook().current();
                let result = match (dial_fn, &tls) {
                    (Some(dial_fn), tls) => {
                        dial_fn("tcp", host.as_str(), options.connect_timeout, tls.clone()).await
                    }
                    (None, Some(tls)) => {
                        Transport::connect_tls(host, options.connect_timeout, tls.clone()).await
                    }
                    (None, None) => Transport::connect_tcp(host, options.connect_timeout).await,
                };

                match result {
                    Ok(transport) => {
                        let remote = transport
                            .peer_addr()
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|_| host.clone());
                        (options.logger)(format_args!(
                            "[dial] secure={}, skip_verify={}, strategy={}, ident={}, server={} -> {}",
                            options.secure, options.skip_verify, strategy, ident, num, remote
                        ));
                        transport.set_nodelay(options.no_delay)?;

                        metrics::counters::dial_succeeded(strategy);
                        metrics::histograms::connect_duration(
                            strategy,
                            started.elapsed().as_millis() as u64,
                        );
                        tracing::debug!(server = num, %remote, "connection established");

                        return Ok(Connection::new(transport, ident)
                            .with_timeouts(options.read_timeout, options.write_timeout)
                            .with_logger(options.logger.clone()));
                    }
                    Err(err) => {
                        (options.logger)(format_args!(
                            "[dial err] secure={}, skip_verify={}, strategy={}, ident={}, addr={}\n{:?}",
                            options.secure, options.skip_verify, strategy, ident, host, err
                        ));
                        metrics::counters::dial_failed(strategy);
                        last_err = Some(err);
                    }
                }
            }

            Err(match last_err {
                Some(err) => Error::Io(err),
                None => Error::Config("no hosts configured".into()),
            })
        }
        .instrument(tracing::debug_span!("dial", ident, strategy))
        .await
    }
}

/// Connect using the process-wide transport factory and identity counter.
pub async fn dial(options: &DialOptions) -> Result<Connection> {
    Dialer::new().dial(options).await
}
