//! Metric names and label values

/// Dial attempts against a single host
pub const DIAL_ATTEMPTS: &str = "wire_dial_attempts_total";
/// Failed dial attempts against a single host
pub const DIAL_FAILURES: &str = "wire_dial_failures_total";
/// Successful dials
pub const DIAL_SUCCESS: &str = "wire_dial_success_total";
/// Connections invalidated by an I/O failure
pub const BAD_CONN: &str = "wire_dial_bad_conn_total";
/// Time from the first attempt to an established connection
pub const CONNECT_DURATION: &str = "wire_dial_connect_duration_ms";

/// Read operation label
pub const OP_READ: &str = "read";
/// Write operation label
pub const OP_WRITE: &str = "write";
