//! Counter metrics

use super::labels;

/// One host attempt started
pub fn dial_attempted(strategy: &'static str) {
    metrics::counter!(labels::DIAL_ATTEMPTS, "strategy" => strategy).increment(1);
}

/// One host attempt failed
pub fn dial_failed(strategy: &'static str) {
    metrics::counter!(labels::DIAL_FAILURES, "strategy" => strategy).increment(1);
}

/// A dial call produced a connection
pub fn dial_succeeded(strategy: &'static str) {
    metrics::counter!(labels::DIAL_SUCCESS, "strategy" => strategy).increment(1);
}

/// A connection was closed after a read or write failure
pub fn bad_conn(op: &'static str) {
    metrics::counter!(labels::BAD_CONN, "op" => op).increment(1);
}
