//! Configuration loading: connection strings and serde settings

mod connection_string;
mod settings;

pub use connection_string::ConnectionInfo;
pub use settings::DialSettings;
