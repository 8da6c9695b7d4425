//! Directory address resolution.
//!
//! Accepted forms: `ldap://host:port`, `ldaps://host:port`,
//! `ldapi://<url-escaped-socket-path>`, and bare `host:port` (plaintext).

use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

const SCHEME_LDAP: &str = "ldap";
const SCHEME_LDAPS: &str = "ldaps";
const SCHEME_LDAPI: &str = "ldapi";

/// Transport used to reach the directory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// TCP connection to host:port.
    Tcp,
    /// Unix domain socket.
    Unix,
}

/// A resolved directory address.
///
/// `implicit_tls` is set only when the scheme demanded it (`ldaps`); the
/// StartTLS upgrade is a separate configuration decision and is never
/// inferred here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapAddress {
    transport: Transport,
    host: String,
    addr: String,
    implicit_tls: bool,
}

impl LdapAddress {
    /// Resolves a user-supplied address string.
    ///
    /// Standard URL parsing is attempted first. Inputs without a host
    /// component (bare `host:port`, or scheme prefixes the URL parser
    /// rejects) fall back to manual prefix stripping, checked as `ldapi://`,
    /// then `ldaps://`, then `ldap://` with plaintext as the default. The
    /// socket path of an `ldapi` address is percent-decoded; the other forms
    /// are taken verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressFormat`] for any other explicit scheme.
    pub fn resolve(addr: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(addr) {
            if !url.host_str().unwrap_or_default().is_empty() {
                return Self::from_url(&url);
            }
        }

        if let Some(rest) = addr.strip_prefix("ldapi://") {
            return Ok(Self::unix(percent_decode_str(rest).decode_utf8_lossy().into_owned()));
        }
        if let Some(rest) = addr.strip_prefix("ldaps://") {
            return Ok(Self::tcp(rest, true));
        }
        let rest = addr.strip_prefix("ldap://").unwrap_or(addr);
        Ok(Self::tcp(rest, false))
    }

    fn from_url(url: &Url) -> Result<Self> {
        let host = url.host_str().unwrap_or_default();
        match url.scheme() {
            SCHEME_LDAP | SCHEME_LDAPS => {
                let addr = match url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                Ok(Self {
                    transport: Transport::Tcp,
                    host: host.to_string(),
                    addr,
                    implicit_tls: url.scheme() == SCHEME_LDAPS,
                })
            }
            SCHEME_LDAPI => Ok(Self::unix(
                percent_decode_str(host).decode_utf8_lossy().into_owned(),
            )),
            other => Err(Error::AddressFormat(other.to_string())),
        }
    }

    fn tcp(addr: &str, implicit_tls: bool) -> Self {
        Self {
            transport: Transport::Tcp,
            host: host_of(addr).to_string(),
            addr: addr.to_string(),
            implicit_tls,
        }
    }

    fn unix(path: String) -> Self {
        Self {
            transport: Transport::Unix,
            host: path.clone(),
            addr: path,
            implicit_tls: false,
        }
    }

    /// Transport selected by the address scheme.
    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// Host name without the port, used as the expected TLS server name.
    /// For unix sockets this is the socket path.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Dial target: `host:port` for TCP, the decoded socket path for unix.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether the scheme requires encryption from the first byte (`ldaps`).
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.implicit_tls
    }
}

/// Strips a trailing `:port` (digits only) and any IPv6 brackets.
fn host_of(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match addr.rfind(':') {
        Some(idx)
            if idx + 1 < addr.len() && addr[idx + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &addr[..idx]
        }
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plaintext_url() {
        let address = LdapAddress::resolve("ldap://directory.example.com:389").unwrap();
        assert_eq!(address.transport(), Transport::Tcp);
        assert_eq!(address.addr(), "directory.example.com:389");
        assert_eq!(address.host(), "directory.example.com");
        assert!(!address.implicit_tls());
    }

    #[test]
    fn resolves_ldaps_url() {
        let address = LdapAddress::resolve("ldaps://directory.example.com:636").unwrap();
        assert_eq!(address.transport(), Transport::Tcp);
        assert_eq!(address.addr(), "directory.example.com:636");
        assert!(address.implicit_tls());
    }

    #[test]
    fn resolves_bare_host_port_as_plaintext() {
        let address = LdapAddress::resolve("directory.example.com:389").unwrap();
        assert_eq!(address.transport(), Transport::Tcp);
        assert_eq!(address.addr(), "directory.example.com:389");
        assert_eq!(address.host(), "directory.example.com");
        assert!(!address.implicit_tls());
    }

    #[test]
    fn resolves_ldapi_with_escaped_socket_path() {
        let address = LdapAddress::resolve("ldapi://%2Fvar%2Frun%2Fldapi").unwrap();
        assert_eq!(address.transport(), Transport::Unix);
        assert_eq!(address.addr(), "/var/run/ldapi");
        assert!(!address.implicit_tls());
    }

    #[test]
    fn resolves_ldapi_with_unescaped_socket_path() {
        // An empty URL host means the manual fallback handles the path.
        let address = LdapAddress::resolve("ldapi:///var/run/ldapi").unwrap();
        assert_eq!(address.transport(), Transport::Unix);
        assert_eq!(address.addr(), "/var/run/ldapi");
    }

    #[test]
    fn rejects_unknown_scheme_by_name() {
        let err = LdapAddress::resolve("foo://bar").unwrap_err();
        assert_eq!(err, Error::AddressFormat("foo".to_string()));
    }

    #[test]
    fn url_without_port_keeps_bare_host() {
        let address = LdapAddress::resolve("ldap://directory.example.com").unwrap();
        assert_eq!(address.addr(), "directory.example.com");
        assert_eq!(address.host(), "directory.example.com");
    }

    #[test]
    fn host_of_handles_ipv6_brackets() {
        assert_eq!(host_of("[::1]:389"), "::1");
        assert_eq!(host_of("localhost:389"), "localhost");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[test]
    fn never_infers_start_tls() {
        // Only ldaps sets implicit TLS; plaintext stays plaintext until the
        // caller asks for the StartTLS upgrade explicitly.
        for addr in ["ldap://h:389", "h:389"] {
            assert!(!LdapAddress::resolve(addr).unwrap().implicit_tls());
        }
    }
}
