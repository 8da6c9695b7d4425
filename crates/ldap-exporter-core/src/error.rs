//! Error types for exporter operations.

use std::path::PathBuf;
use thiserror::Error;

/// LDAP result code for a server-side time limit violation.
const TIME_LIMIT_EXCEEDED: u32 = 3;

/// Main error type for exporter operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The directory address used a scheme the exporter does not recognize.
    #[error("unsupported directory address scheme `{0}`")]
    AddressFormat(String),

    /// The CA certificate file does not exist.
    #[error("CA certificate file `{0}` does not exist")]
    CaCertNotFound(PathBuf),

    /// The CA certificate file exists but could not be read.
    #[error("CA certificate file `{path}` is not readable: {reason}")]
    CaCertUnreadable {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error message.
        reason: String,
    },

    /// The CA certificate file contained no parseable certificate.
    #[error("no certificate could be parsed from `{0}`")]
    CaCertInvalid(PathBuf),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Metric registration or encoding failed.
    #[error("metric error: {0}")]
    Metrics(String),

    /// Opening, upgrading, or authenticating the directory connection failed.
    #[error("directory connection failed: {0}")]
    Connection(String),

    /// A directory search failed.
    #[error("directory search failed: {message}")]
    Search {
        /// Error message.
        message: String,
        /// LDAP result code, when the server returned one.
        result_code: Option<u32>,
    },

    /// A directory operation exceeded the client-side timeout.
    #[error("directory operation timed out: {0}")]
    Timeout(String),

    /// The metrics HTTP server failed.
    #[error("metrics server error: {0}")]
    Server(String),
}

/// Specialized result type for exporter operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error carries the LDAP timeLimitExceeded result
    /// code. Only server-reported search results qualify; client-side
    /// timeouts do not.
    #[must_use]
    pub fn is_time_limit_exceeded(&self) -> bool {
        matches!(
            self,
            Self::Search {
                result_code: Some(TIME_LIMIT_EXCEEDED),
                ..
            }
        )
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AddressFormat("foo".to_string());
        assert_eq!(err.to_string(), "unsupported directory address scheme `foo`");

        let err = Error::Search {
            message: "no such object".to_string(),
            result_code: Some(32),
        };
        assert_eq!(err.to_string(), "directory search failed: no such object");
    }

    #[test]
    fn test_time_limit_classification() {
        let timed_out = Error::Search {
            message: "time limit exceeded".to_string(),
            result_code: Some(3),
        };
        assert!(timed_out.is_time_limit_exceeded());

        let other = Error::Search {
            message: "no such object".to_string(),
            result_code: Some(32),
        };
        assert!(!other.is_time_limit_exceeded());

        // A client-side timeout is not the server-side condition.
        assert!(!Error::Timeout("bind".to_string()).is_time_limit_exceeded());
        assert!(!Error::Connection("refused".to_string()).is_time_limit_exceeded());
    }

    #[test]
    fn test_ca_cert_errors_name_the_path() {
        let path = PathBuf::from("/etc/ssl/ca.pem");
        assert!(Error::CaCertNotFound(path.clone())
            .to_string()
            .contains("/etc/ssl/ca.pem"));
        assert!(Error::CaCertInvalid(path)
            .to_string()
            .contains("/etc/ssl/ca.pem"));
    }

    #[test]
    fn test_error_clone_and_eq() {
        let err = Error::Connection("refused".to_string());
        assert_eq!(err, err.clone());
    }
}
