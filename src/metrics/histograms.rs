//! Histogram metrics

use super::labels;

/// Elapsed time of a successful dial call, failed attempts included
pub fn connect_duration(strategy: &'static str, millis: u64) {
    metrics::histogram!(labels::CONNECT_DURATION, "strategy" => strategy).record(millis as f64);
}
