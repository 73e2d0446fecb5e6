//! Error types for map registration and refresh cycles

use thiserror::Error;

/// Map engine result type
pub type Result<T> = std::result::Result<T, MapError>;

/// Map engine errors
///
/// Nothing here is process-fatal. Configuration errors are returned from
/// registration; every other variant aborts a single refresh cycle and keeps
/// the previous generation published.
#[derive(Error, Debug)]
pub enum MapError {
    /// Map line does not match the map grammar
    #[error("Invalid map definition: {0}")]
    InvalidMapLine(String),

    /// Inline `key=` value or key file could not be decoded
    #[error("Invalid public key: {0}")]
    InvalidPubkey(String),

    /// HTTP map URL could not be parsed
    #[error("Cannot parse HTTP url: {0}")]
    InvalidUrl(String),

    /// Map file exists but cannot be accessed
    #[error("Cannot open file '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Engine configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Engine configuration file could not be decoded
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Neither A nor AAAA lookup produced a usable address
    #[error("Cannot resolve {0}")]
    Resolve(String),

    /// No resolved address accepted a connection
    #[error("Cannot connect to {0}")]
    Connect(String),

    /// Server answered with a status the current stage cannot use
    #[error("HTTP error {status} for {url}")]
    Http { status: u16, url: String },

    /// Connection with the HTTP server terminated incorrectly
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// A network operation exceeded the map timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Discovered public key is not in the trusted key set
    #[error("Untrusted public key {0}")]
    UntrustedKey(String),

    /// Signature does not match the data
    #[error("Incorrect signature: {0}")]
    BadSignature(String),

    /// Signature file has the wrong size
    #[error("Invalid signature length {got} (expected {expected})")]
    SignatureLength { got: usize, expected: usize },

    /// Temporary buffer file could not be created
    #[error("Cannot create temporary file: {0}")]
    TempFile(String),

    /// File could not be memory-mapped
    #[error("Cannot map file {path}: {source}")]
    Mmap {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapError {
    /// True for errors that must reject a map at registration time
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            MapError::InvalidMapLine(_)
                | MapError::InvalidPubkey(_)
                | MapError::InvalidUrl(_)
                | MapError::Unreadable { .. }
                | MapError::Config(_)
                | MapError::ConfigParse(_)
        )
    }

    /// True for signature and key trust failures
    pub fn is_trust(&self) -> bool {
        matches!(
            self,
            MapError::UntrustedKey(_) | MapError::BadSignature(_) | MapError::SignatureLength { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(MapError::InvalidMapLine("x".into()).is_config());
        assert!(!MapError::Resolve("example.com".into()).is_config());
        assert!(MapError::SignatureLength { got: 3, expected: 64 }.is_trust());
        assert!(!MapError::Timeout("dns".into()).is_trust());
    }

    #[test]
    fn test_error_messages() {
        let err = MapError::Http {
            status: 404,
            url: "http://example.com/list".into(),
        };
        assert_eq!(err.to_string(), "HTTP error 404 for http://example.com/list");
    }
}
