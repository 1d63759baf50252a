//! Connection string parsing
//!
//! Supports the format:
//! * tcp://[user[:password]@]host:port[/database][?params]
//!
//! Recognized parameters:
//! * `alt_hosts` - comma-separated fallback `host:port` addresses
//! * `connection_open_strategy` - `random`, `in_order` or `time_random`
//! * `secure`, `skip_verify`, `no_delay`, `debug` - booleans
//! * `timeout`, `read_timeout`, `write_timeout` - seconds, fractional allowed
//! * `tls_ca` - CA certificate file for secure dials
//!
//! Other parameters belong to the protocol layer and are ignored here.

use super::settings::{seconds, DialSettings};
use crate::connection::DialOptions;
use crate::{Error, Result};

/// Parsed connection info
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    /// Username, passed through to the protocol layer
    pub user: Option<String>,
    /// Password, passed through to the protocol layer
    pub password: Option<String>,
    /// Database name, passed through to the protocol layer
    pub database: Option<String>,
    /// Transport settings
    pub settings: DialSettings,
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    if query_string.is_empty() {
        return None;
    }

    // Remove leading '?' if present
    let query = query_string.trim_start_matches('?');

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == param {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid {} '{}': expected true or false",
            name, value
        ))),
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<f64> {
    let secs: f64 = value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {} '{}'", name, value)))?;
    // Reject values that cannot become a Duration
    seconds(name, secs)?;
    Ok(secs)
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("tcp://")
            .ok_or_else(|| Error::Config("connection string must start with tcp://".into()))?;

        // Split off query string before parsing the authority
        let (rest, query_string) = match rest.find('?') {
            Some(q_pos) => rest.split_at(q_pos),
            None => (rest, ""),
        };

        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(auth.to_string()), None),
            },
            None => (None, None),
        };

        let (host_port, database) = match rest.find('/') {
            Some(pos) => {
                let db = &rest[pos + 1..];
                (&rest[..pos], (!db.is_empty()).then(|| db.to_string()))
            }
            None => (rest, None),
        };

        if host_port.is_empty() {
            return Err(Error::Config("connection string has no host".into()));
        }

        let mut settings = DialSettings {
            hosts: vec![host_port.to_string()],
            ..DialSettings::default()
        };

        if let Some(alt_hosts) = parse_query_param(query_string, "alt_hosts") {
            settings.hosts.extend(
                alt_hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(strategy) = parse_query_param(query_string, "connection_open_strategy") {
            settings.open_strategy = strategy.parse()?;
        }
        if let Some(value) = parse_query_param(query_string, "secure") {
            settings.secure = parse_bool("secure", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "skip_verify") {
            settings.skip_verify = parse_bool("skip_verify", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "no_delay") {
            settings.no_delay = parse_bool("no_delay", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "debug") {
            settings.debug = parse_bool("debug", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "timeout") {
            settings.connect_timeout = parse_seconds("timeout", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "read_timeout") {
            settings.read_timeout = parse_seconds("read_timeout", &value)?;
        }
        if let Some(value) = parse_query_param(query_string, "write_timeout") {
            settings.write_timeout = parse_seconds("write_timeout", &value)?;
        }
        settings.tls_ca = parse_query_param(query_string, "tls_ca");

        Ok(Self {
            user,
            password,
            database,
            settings,
        })
    }

    /// Convert to DialOptions
    pub fn to_options(&self) -> Result<DialOptions> {
        self.settings.clone().into_options()
    }
}
