//! Connection configuration for the scraped directory server.

use crate::addr::LdapAddress;
use crate::{Error, Result};
use native_tls::Certificate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default per-operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Bind credentials for the scrape connection.
///
/// Scrapes bind only when credentials are present; the constructor rejects a
/// username without a password and vice versa, so an anonymous scrape is
/// represented by `None`, never by a half-filled pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindCredentials {
    /// Bind DN or username.
    username: String,
    /// Bind password.
    #[serde(skip_serializing)]
    password: String,
}

impl BindCredentials {
    /// Creates bind credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either field is empty.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return Err(Error::Config(
                "bind username and password must be given together".to_string(),
            ));
        }
        Ok(Self { username, password })
    }

    /// Builds optional credentials from possibly-empty flag values.
    ///
    /// Both empty means an anonymous scrape (`None`); exactly one empty is a
    /// configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when only one of the two values is set.
    pub fn from_optional(username: &str, password: &str) -> Result<Option<Self>> {
        if username.is_empty() && password.is_empty() {
            return Ok(None);
        }
        Self::new(username, password).map(Some)
    }

    /// Returns the bind DN or username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the bind password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Configuration for connecting to the scraped directory server.
///
/// Produced once at startup and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    address: LdapAddress,
    credentials: Option<BindCredentials>,
    base_dn: String,
    start_tls: bool,
    tls_verify: bool,
    ca_cert_pem: Option<Vec<u8>>,
    connect_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl LdapConfig {
    /// Creates a configuration for the given resolved address, with TLS
    /// verification on, no StartTLS, and anonymous binds.
    #[must_use]
    pub fn new(address: LdapAddress) -> Self {
        Self {
            address,
            credentials: None,
            base_dn: String::new(),
            start_tls: false,
            tls_verify: true,
            ca_cert_pem: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }

    /// Sets the bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the base DN for the posixAccount search.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    /// Requests a StartTLS upgrade on plaintext connections.
    #[must_use]
    pub const fn with_start_tls(mut self, start_tls: bool) -> Self {
        self.start_tls = start_tls;
        self
    }

    /// Enables or disables TLS certificate verification. Disabling requires
    /// this explicit call; there is no other way to skip validation.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Loads and validates a CA certificate file for TLS trust.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaCertNotFound`], [`Error::CaCertUnreadable`], or
    /// [`Error::CaCertInvalid`]; all of these are fatal at startup.
    pub fn with_ca_cert_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.ca_cert_pem = Some(load_ca_cert(path.as_ref())?);
        Ok(self)
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Overrides the per-operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Returns the resolved directory address.
    #[must_use]
    pub const fn address(&self) -> &LdapAddress {
        &self.address
    }

    /// Returns the bind credentials, when scrapes should authenticate.
    #[must_use]
    pub const fn credentials(&self) -> Option<&BindCredentials> {
        self.credentials.as_ref()
    }

    /// Returns the base DN for the posixAccount search. May be empty when
    /// the operator did not configure one.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Whether plaintext connections are upgraded with StartTLS.
    #[must_use]
    pub const fn start_tls(&self) -> bool {
        self.start_tls
    }

    /// Whether TLS certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Returns the validated CA certificate PEM, when one was loaded. Absent
    /// means the system trust store applies.
    #[must_use]
    pub fn ca_cert_pem(&self) -> Option<&[u8]> {
        self.ca_cert_pem.as_deref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the per-operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Reads a CA certificate file and verifies the PEM parses as a certificate.
///
/// The expected TLS server name stays the host resolved from the directory
/// address; the trust material loaded here only extends the root set.
///
/// # Errors
///
/// Returns [`Error::CaCertNotFound`] for a missing file,
/// [`Error::CaCertUnreadable`] when the read fails, and
/// [`Error::CaCertInvalid`] when no certificate can be parsed from the
/// contents.
pub fn load_ca_cert(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(Error::CaCertNotFound(path.to_path_buf()));
    }
    let pem = fs::read(path).map_err(|err| Error::CaCertUnreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Certificate::from_pem(&pem).map_err(|_| Error::CaCertInvalid(path.to_path_buf()))?;
    Ok(pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{LdapAddress, Transport};
    use std::io::Write;

    fn sample_address() -> LdapAddress {
        LdapAddress::resolve("ldaps://directory.example.com:636").unwrap()
    }

    #[test]
    fn builder_defaults() {
        let config = LdapConfig::new(sample_address());
        assert!(config.credentials().is_none());
        assert!(config.base_dn().is_empty());
        assert!(!config.start_tls());
        assert!(config.tls_verify());
        assert!(config.ca_cert_pem().is_none());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides() {
        let credentials =
            BindCredentials::new("cn=monitor,dc=example,dc=com", "secret").unwrap();
        let config = LdapConfig::new(sample_address())
            .with_credentials(credentials)
            .with_base_dn("ou=People,dc=example,dc=com")
            .with_start_tls(true)
            .with_tls_verification(false)
            .with_connect_timeout_secs(20)
            .with_operation_timeout_secs(30);

        assert_eq!(
            config.credentials().unwrap().username(),
            "cn=monitor,dc=example,dc=com"
        );
        assert_eq!(config.base_dn(), "ou=People,dc=example,dc=com");
        assert!(config.start_tls());
        assert!(!config.tls_verify());
        assert_eq!(config.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.address().transport(), Transport::Tcp);
    }

    #[test]
    fn credentials_reject_one_sided_pair() {
        assert!(BindCredentials::new("cn=monitor", "").is_err());
        assert!(BindCredentials::new("", "secret").is_err());
        assert!(BindCredentials::from_optional("cn=monitor", "").is_err());
        assert!(BindCredentials::from_optional("", "secret").is_err());
        assert!(BindCredentials::from_optional("", "").unwrap().is_none());
        assert!(BindCredentials::from_optional("cn=monitor", "secret")
            .unwrap()
            .is_some());
    }

    #[test]
    fn password_is_not_serialized() {
        let credentials = BindCredentials::new("cn=monitor", "secret").unwrap();
        let json = serde_json::to_string(&credentials).unwrap();
        assert!(json.contains("cn=monitor"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn load_ca_cert_missing_file() {
        let err = load_ca_cert(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(matches!(err, Error::CaCertNotFound(_)));
    }

    #[test]
    fn load_ca_cert_rejects_garbage_pem() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();
        let err = load_ca_cert(file.path()).unwrap_err();
        assert!(matches!(err, Error::CaCertInvalid(_)));
    }
}
