//! Host visitation order for a dial call

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Order in which configured hosts are tried when opening a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenStrategy {
    /// Start at an offset derived from the dial identity, then wrap around
    #[default]
    Random,
    /// Hosts in listed order, first to last
    InOrder,
    /// Each attempt picks a not-yet-tried host from the current time
    TimeRandom,
}

impl OpenStrategy {
    /// Name used in logs, metrics and connection strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::InOrder => "in_order",
            Self::TimeRandom => "time_random",
        }
    }
}

impl std::fmt::Display for OpenStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpenStrategy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "in_order" => Ok(Self::InOrder),
            "time_random" => Ok(Self::TimeRandom),
            _ => Err(Error::Config(format!(
                "invalid open strategy '{}': expected random, in_order, or time_random",
                s
            ))),
        }
    }
}

/// Hands out dial identities.
///
/// Identities correlate log lines of one dial call and its connection, and seed
/// the [`OpenStrategy::Random`] starting offset. They are never negative.
#[derive(Debug, Default)]
pub struct IdentGenerator {
    tick: AtomicU32,
}

impl IdentGenerator {
    /// Generator whose first identity is 1
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    /// Generator whose first identity is `value + 1`
    pub const fn starting_after(value: u32) -> Self {
        Self {
            tick: AtomicU32::new(value),
        }
    }

    /// Next identity
    pub fn next_ident(&self) -> usize {
        // The counter wraps through the signed range; fold it back to non-negative.
        let tick = self.tick.fetch_add(1, Ordering::Relaxed).wrapping_add(1) as i32;
        tick.unsigned_abs() as usize
    }
}

static IDENTS: IdentGenerator = IdentGenerator::new();

/// Process-wide identity generator used when a dialer has none of its own
pub(crate) fn global_idents() -> &'static IdentGenerator {
    &IDENTS
}

/// Wall clock in microseconds since the Unix epoch
pub fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Iterator over the host indices one dial call visits.
///
/// Yields exactly `len` indices, each in `0..len`, and never the same index
/// twice. The clock is only consulted by [`OpenStrategy::TimeRandom`] and
/// returns microseconds.
pub struct HostOrder<C = fn() -> u64> {
    len: usize,
    strategy: OpenStrategy,
    ident: usize,
    attempt: usize,
    tried: HashSet<usize>,
    clock: C,
}

impl HostOrder {
    /// Order over `len` hosts, sampling the wall clock for `TimeRandom`
    pub fn new(len: usize, strategy: OpenStrategy, ident: usize) -> Self {
        Self {
            len,
            strategy,
            ident,
            attempt: 0,
            tried: HashSet::with_capacity(len),
            clock: unix_micros,
        }
    }
}

impl<C> HostOrder<C> {
    /// Replace the microsecond clock
    pub fn with_clock<D>(self, clock: D) -> HostOrder<D>
    where
        D: FnMut() -> u64,
    {
        HostOrder {
            len: self.len,
            strategy: self.strategy,
            ident: self.ident,
            attempt: self.attempt,
            tried: self.tried,
            clock,
        }
    }
}

impl<C: FnMut() -> u64> HostOrder<C> {
    fn sample(&mut self) -> usize {
        ((self.clock)() % self.len as u64) as usize
    }
}

impl<C: FnMut() -> u64> Iterator for HostOrder<C> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.attempt >= self.len {
            return None;
        }
        let i = self.attempt;
        self.attempt += 1;

        let num = match self.strategy {
            OpenStrategy::InOrder => i,
            OpenStrategy::Random => (self.ident % self.len + i) % self.len,
            OpenStrategy::TimeRandom => {
                let mut num = self.sample();
                while self.tried.contains(&num) {
                    num = self.sample();
                }
                self.tried.insert(num);
                num
            }
        };
        Some(num)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.attempt;
        (remaining, Some(remaining))
    }
}

impl<C: FnMut() -> u64> ExactSizeIterator for HostOrder<C> {}
