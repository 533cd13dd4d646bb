//! Error types for the extraction pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting a design context
#[derive(Error, Debug)]
pub enum Error {
    /// The requested URL is malformed or not http(s)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The engine could not render the page within its timeout
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The page rendered but produced no usable body
    #[error("Rendered page has no body content: {0}")]
    EmptyBody(String),

    /// A single asset could not be fetched
    #[error("Asset fetch failed: {0}")]
    AssetFetch(String),

    /// Stylesheet instrumentation or stylesheet fetch failed
    #[error("CSS capture failed: {0}")]
    CssCapture(String),

    /// Failed to launch the browser or build the HTTP client
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The caller-supplied deadline elapsed
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The generation collaborator returned something undecodable
    #[error("Generator reply could not be decoded: {0}")]
    Generator(String),

    /// Artifact persistence failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error aborts the whole extraction request.
    ///
    /// Asset and stylesheet failures are recovered where they occur and only
    /// show up in diagnostics.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::AssetFetch(_) | Error::CssCapture(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovered_errors_are_not_fatal() {
        assert!(!Error::AssetFetch("404".into()).is_fatal());
        assert!(!Error::CssCapture("coverage".into()).is_fatal());
        assert!(Error::EmptyBody("<body></body>".into()).is_fatal());
        assert!(Error::Timeout(100).is_fatal());
    }

    #[test]
    fn messages_carry_the_cause() {
        let err = Error::InvalidUrl("ftp://example.com".into());
        assert_eq!(err.to_string(), "Invalid URL: ftp://example.com");
    }
}
