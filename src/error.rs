/// Error types for the alternate-hostname transport
use thiserror::Error;

/// Main error type for transport adapter operations
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Configuration errors, raised before any network activity
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TLS/SSL errors, including certificate hostname mismatches
    #[error("SSL error: {0}")]
    Ssl(String),

    /// Connection establishment errors
    #[error("Failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    /// Request exceeded its send timeout
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout {
        url: String,
        timeout: std::time::Duration,
    },

    /// HTTP protocol errors surfaced by the client
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request URL could not be parsed or has no host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No mounted adapter matches the request URL
    #[error("No connection adapters were found for '{0}'")]
    NoAdapter(String),

    /// File I/O errors (CA bundles, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Whether this error came from the TLS layer.
    pub fn is_ssl(&self) -> bool {
        matches!(self, AdapterError::Ssl(_))
    }
}

/// Result type alias for convenience
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Helper trait to convert foreign errors into [`AdapterError::Configuration`].
///
/// # Example
///
/// ```rust
/// use alt_sni::error::ToAdapterError;
///
/// let result: Result<u16, &'static str> = Err("not a number");
/// let converted = result.to_adapter_error("pool size").unwrap_err();
/// assert!(converted.to_string().contains("pool size"));
/// ```
pub trait ToAdapterError<T> {
    /// Convert the result, prefixing the error message with `context`.
    fn to_adapter_error(self, context: &str) -> AdapterResult<T>;
}

impl<T, E: std::fmt::Display> ToAdapterError<T> for Result<T, E> {
    fn to_adapter_error(self, context: &str) -> AdapterResult<T> {
        self.map_err(|e| AdapterError::Configuration(format!("{}: {}", context, e)))
    }
}
