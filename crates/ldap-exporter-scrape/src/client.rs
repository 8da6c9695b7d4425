//! Directory connection seam over ldap3.

use crate::Result;
use async_trait::async_trait;
use ldap3::{
    DerefAliases, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions,
};
use ldap_exporter_core::addr::Transport;
use ldap_exporter_core::config::LdapConfig;
use ldap_exporter_core::error::Error;
use native_tls::{Certificate, TlsConnector};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// A directory entry as returned by a search.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve server order).
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(|value| value.as_str()))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait DirectorySession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>>;
}

/// Connector backed by `ldap3`.
///
/// Encryption is established here, before the session is handed out: an
/// `ldaps` address is encrypted from the first byte, and a requested StartTLS
/// upgrade runs during connection setup, ahead of any other operation. Either
/// failing surfaces as the connect error.
pub(crate) struct Ldap3Connector {
    config: Arc<LdapConfig>,
}

impl Ldap3Connector {
    pub(crate) fn new(config: Arc<LdapConfig>) -> Self {
        Self { config }
    }

    fn connection_url(&self) -> String {
        let address = self.config.address();
        match address.transport() {
            Transport::Unix => format!(
                "ldapi://{}",
                utf8_percent_encode(address.addr(), NON_ALPHANUMERIC)
            ),
            Transport::Tcp if address.implicit_tls() => format!("ldaps://{}", address.addr()),
            Transport::Tcp => format!("ldap://{}", address.addr()),
        }
    }

    fn settings(&self) -> Result<LdapConnSettings> {
        let config = &self.config;
        let mut settings = LdapConnSettings::new().set_conn_timeout(config.connect_timeout());
        if config.start_tls() {
            settings = settings.set_starttls(true);
        }

        if config.address().implicit_tls() || config.start_tls() {
            if config.tls_verify() {
                if let Some(pem) = config.ca_cert_pem() {
                    let certificate = Certificate::from_pem(pem).map_err(|err| {
                        Error::Config(format!("invalid CA certificate: {err}"))
                    })?;
                    let connector = TlsConnector::builder()
                        .add_root_certificate(certificate)
                        .build()
                        .map_err(|err| {
                            Error::Config(format!("failed to construct TLS connector: {err}"))
                        })?;
                    settings = settings.set_connector(connector);
                }
            } else {
                let connector = TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .build()
                    .map_err(|err| {
                        Error::Config(format!("failed to construct TLS connector: {err}"))
                    })?;
                settings = settings.set_connector(connector).set_no_tls_verify(true);
            }
        }

        Ok(settings)
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        let settings = self.settings()?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.connection_url())
            .await
            .map_err(map_connection_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(Ldap3Session {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct Ldap3Session {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
            .map_err(map_connection_error)?;
        result.success().map_err(map_connection_error)?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<DirectoryEntry>> {
        let options = SearchOptions::new()
            .deref(DerefAliases::Never)
            .sizelimit(0)
            .timelimit(1);
        let result = timeout(
            self.operation_timeout,
            self.inner
                .with_search_options(options)
                .search(base_dn, Scope::Subtree, filter, attributes.to_vec()),
        )
        .await
        .map_err(|_| Error::Timeout("directory search timed out".to_string()))?
        .map_err(map_search_error)?;
        let (entries, _) = result.success().map_err(map_search_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("directory unbind timed out".to_string()))?
            .map_err(map_connection_error)?;
        Ok(())
    }
}

fn map_connection_error(err: ldap3::LdapError) -> Error {
    Error::Connection(err.to_string())
}

/// Search failures keep the server result code so the scrape counter can
/// distinguish a time-limit violation from other failures.
fn map_search_error(err: ldap3::LdapError) -> Error {
    match err {
        ldap3::LdapError::LdapResult { result } => Error::Search {
            message: format!("result code {}: {}", result.rc, result.text),
            result_code: Some(result.rc),
        },
        other => Error::Search {
            message: other.to_string(),
            result_code: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap_exporter_core::addr::LdapAddress;

    fn connector_for(addr: &str) -> Ldap3Connector {
        let config = LdapConfig::new(LdapAddress::resolve(addr).unwrap());
        Ldap3Connector::new(Arc::new(config))
    }

    #[test]
    fn plaintext_connection_url() {
        let connector = connector_for("ldap://directory.example.com:389");
        assert_eq!(
            connector.connection_url(),
            "ldap://directory.example.com:389"
        );
    }

    #[test]
    fn ldaps_connection_url() {
        let connector = connector_for("ldaps://directory.example.com:636");
        assert_eq!(
            connector.connection_url(),
            "ldaps://directory.example.com:636"
        );
    }

    #[test]
    fn ldapi_connection_url_is_reencoded() {
        let connector = connector_for("ldapi://%2Fvar%2Frun%2Fldapi");
        assert_eq!(connector.connection_url(), "ldapi://%2Fvar%2Frun%2Fldapi");
    }

    #[test]
    fn bare_host_port_dials_plaintext() {
        let connector = connector_for("directory.example.com:389");
        assert_eq!(
            connector.connection_url(),
            "ldap://directory.example.com:389"
        );
    }

    #[test]
    fn entry_first_value() {
        let mut attributes = HashMap::new();
        attributes.insert(
            "monitorCounter".to_string(),
            vec!["17".to_string(), "18".to_string()],
        );
        let entry = DirectoryEntry {
            dn: "cn=Bytes,cn=Statistics,cn=Monitor".to_string(),
            attributes,
        };
        assert_eq!(entry.first("monitorCounter"), Some("17"));
        assert_eq!(entry.first("monitoredInfo"), None);
    }
}
