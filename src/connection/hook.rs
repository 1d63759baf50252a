//! Pluggable transport factory
//!
//! By default dials go through the built-in TCP/TLS dialers. Installing a
//! [`DialFn`] reroutes every subsequent host attempt through it, which is how
//! proxies, instrumented sockets and test doubles are substituted.

use super::transport::Transport;
use futures::future::BoxFuture;
use rustls::ClientConfig;
use std::future::Future;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Transport factory: `(network, address, timeout, tls config) -> transport`.
///
/// The TLS config is `Some` only for secure dials.
pub type DialFn = Arc<
    dyn Fn(&str, &str, Duration, Option<Arc<ClientConfig>>) -> BoxFuture<'static, io::Result<Transport>>
        + Send
        + Sync,
>;

/// Box a closure returning a future into a [`DialFn`]
pub fn dial_fn<F, Fut>(f: F) -> DialFn
where
    F: Fn(&str, &str, Duration, Option<Arc<ClientConfig>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<Transport>> + Send + 'static,
{
    Arc::new(
        move |network: &str,
              address: &str,
              timeout: Duration,
              tls: Option<Arc<ClientConfig>>|
              -> BoxFuture<'static, io::Result<Transport>> {
            Box::pin(f(network, address, timeout, tls))
        },
    )
}

/// Slot holding at most one transport factory.
///
/// Readers take the shared lock just long enough to clone the factory out, so
/// dials never hold the lock across an await.
pub struct DialHook {
    slot: RwLock<Option<DialFn>>,
}

impl DialHook {
    /// Empty slot (default dialers)
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Install a factory, replacing any previous one
    pub fn install<F, Fut>(&self, f: F)
    where
        F: Fn(&str, &str, Duration, Option<Arc<ClientConfig>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<Transport>> + Send + 'static,
    {
        self.install_fn(dial_fn(f));
    }

    /// Install an already boxed factory
    pub fn install_fn(&self, f: DialFn) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(f);
    }

    /// Remove the factory, going back to the default dialers
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Currently installed factory
    pub fn current(&self) -> Option<DialFn> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a factory is installed
    pub fn is_installed(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for DialHook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DialHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialHook")
            .field("installed", &self.is_installed())
            .finish()
    }
}

static GLOBAL_DIAL: DialHook = DialHook::new();

/// Process-wide slot consulted by dialers without their own hook
pub fn global() -> &'static DialHook {
    &GLOBAL_DIAL
}

/// Register a process-wide transport factory. Last writer wins.
pub fn register_dial<F, Fut>(f: F)
where
    F: Fn(&str, &str, Duration, Option<Arc<ClientConfig>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<Transport>> + Send + 'static,
{
    GLOBAL_DIAL.install(f);
}

/// Deregister the process-wide transport factory.
pub fn deregister_dial() {
    GLOBAL_DIAL.clear();
}
