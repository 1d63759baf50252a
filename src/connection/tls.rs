//! TLS configuration for secure dials.
//!
//! A [`TlsConfig`] is the caller-supplied TLS settings object. The dialer
//! applies its own `skip_verify` flag on top through
//! [`TlsConfig::client_config_for`].

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs;
use std::sync::Arc;

/// TLS configuration for secure connections.
///
/// Server certificates are validated against the platform root store, falling
/// back to the bundled Mozilla roots when the platform store is empty. Whether
/// verification happens at all is decided per dial by `skip_verify`.
///
/// # Examples
///
/// ```ignore
/// use wire_dial::connection::TlsConfig;
///
/// // System roots
/// let tls = TlsConfig::builder().build()?;
///
/// // Custom CA certificate
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = use system roots)
    ca_cert_path: Option<String>,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// TLS configuration with default settings
    pub fn system() -> Result<Self> {
        Self::builder().build()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// ClientConfig with the dial-level `skip_verify` flag applied.
    ///
    /// When `skip_verify` is set the server certificate is not checked at all.
    /// Otherwise the verifying config is returned unchanged.
    pub fn client_config_for(&self, skip_verify: bool) -> Arc<ClientConfig> {
        if !skip_verify {
            return self.client_config();
        }
        let mut config = (*self.client_config).clone();
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerify));
        Arc::new(config)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA certificate file cannot be read or holds no
    /// valid certificate.
    pub fn build(self) -> Result<TlsConfig> {
        let root_store = match &self.ca_cert_path {
            Some(ca_path) => load_custom_ca(ca_path)?,
            None => load_system_roots(),
        };
        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_config: Arc::new(client_config),
        })
    }
}

fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        tracing::warn!(
            errors = result.errors.len(),
            "no usable system root certificates, using bundled webpki roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Tls(format!(
            "Failed to read CA certificate file '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Tls(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Tls(format!(
            "No valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

/// TLS server name (SNI) for a `host:port` dial address.
///
/// Accepts DNS names, IPv4 addresses and bracketed IPv6 addresses. A missing
/// port is tolerated.
pub fn server_name_for(address: &str) -> Result<ServerName<'static>> {
    let host = split_host(address);
    let host = host.trim_end_matches('.');

    if host.is_empty() || host.len() > 253 {
        return Err(Error::Tls(format!(
            "Invalid hostname for TLS: '{}'",
            address
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':')
    {
        return Err(Error::Tls(format!(
            "Invalid hostname for TLS: '{}'",
            address
        )));
    }

    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Tls(format!("Invalid hostname for TLS: '{}'", address)))
}

fn split_host(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 address
        Some((host, _)) if !host.contains(':') => host,
        Some(_) => address,
        None => address,
    }
}

/// Certificate verifier that skips all verification.
#[derive(Debug)]
struct NoVerify;

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_builder_defaults() {
        let tls = TlsConfigBuilder::default();
        assert!(tls.ca_cert_path.is_none());
    }

    #[test]
    fn test_tls_config_system_roots() {
        let tls = TlsConfig::system().expect("Failed to build TLS config");
        assert!(tls.ca_cert_path.is_none());
    }

    #[test]
    fn test_tls_config_missing_ca_file() {
        let result = TlsConfig::builder()
            .ca_cert_path("/nonexistent/ca.pem")
            .build();
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_tls_config_ca_file_without_certs() {
        let path = std::env::temp_dir().join("wire-dial-empty-ca.pem");
        fs::write(&path, "not a certificate\n").unwrap();
        let result = TlsConfig::builder()
            .ca_cert_path(path.to_string_lossy())
            .build();
        let _ = fs::remove_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_config_for_skip_verify() {
        let tls = TlsConfig::system().unwrap();
        let verified = tls.client_config_for(false);
        assert!(Arc::ptr_eq(&verified, &tls.client_config()));

        let skipped = tls.client_config_for(true);
        assert!(!Arc::ptr_eq(&skipped, &tls.client_config()));
    }

    #[test]
    fn test_skip_verify_alone_picks_verifier() {
        let tls = TlsConfig::system().unwrap();

        let skipped = tls.client_config_for(true);
        assert!(format!("{:?}", skipped).contains("NoVerify"));

        // An earlier insecure dial leaves the shared config verifying
        let verified = tls.client_config_for(false);
        assert!(!format!("{:?}", verified).contains("NoVerify"));
        assert!(!format!("{:?}", tls.client_config()).contains("NoVerify"));
    }

    #[test]
    fn test_server_name_for_dns_host() {
        let name = server_name_for("db.internal.example.com:9440").unwrap();
        assert_eq!(name.to_str(), "db.internal.example.com");
    }

    #[test]
    fn test_server_name_for_trailing_dot() {
        assert!(server_name_for("example.com.:9440").is_ok());
    }

    #[test]
    fn test_server_name_for_ip_addresses() {
        assert!(matches!(
            server_name_for("127.0.0.1:9440").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(matches!(
            server_name_for("[::1]:9440").unwrap(),
            ServerName::IpAddress(_)
        ));
    }

    #[test]
    fn test_server_name_for_invalid() {
        assert!(server_name_for(":9440").is_err());
        assert!(server_name_for("bad host!:9440").is_err());
    }

    #[test]
    fn test_tls_config_debug() {
        let tls = TlsConfig::system().unwrap();
        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("TlsConfig"));
        assert!(debug_str.contains("ca_cert_path"));
    }
}
