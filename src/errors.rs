//! Error types and handling for the token authentication pipeline
//!
//! Errors fall into three families that callers usually treat differently:
//!
//! - **Configuration**: missing or contradictory credential material. Fatal, never retried.
//! - **Authentication**: the identity provider rejected the request or the token call
//!   failed on the network. Wraps the underlying cause.
//! - **Profile parsing**: a credentials file could not be read or understood.
//!
//! The remaining variants describe failures of the authenticated API call itself.
//!
//! # Example
//!
//! ```no_run
//! # use azure_token_auth::{Error, TokenSupplier};
//! # async fn example(supplier: &TokenSupplier) -> Result<(), Box<dyn std::error::Error>> {
//! match supplier.get_token("management.azure.com").await {
//!     Ok(_token) => println!("authenticated"),
//!     Err(Error::Authentication { message, .. }) => println!("rejected: {}", message),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed underlying cause carried by authentication errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or contradictory credential material
    #[error("configuration: {0}")]
    Configuration(String),

    /// The identity provider rejected the request, or token acquisition failed
    #[error("authentication: {message}")]
    Authentication {
        /// Human readable description
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxError>,
    },

    /// Malformed credentials profile or unreadable certificate path
    #[error("profile: {0}")]
    ProfileParse(String),

    /// HTTP error from the authenticated API
    #[error("http {status}: {message} (req={request_id:?})")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
        /// Request ID from x-ms-request-id / x-request-id
        request_id: Option<String>,
    },

    /// Deserialization error
    #[error("deserialize: {0}")]
    Deserialize(String),

    /// Network error
    #[error("network: {0}")]
    Network(String),

    /// Request timeout
    #[error("timeout")]
    Timeout,

    /// Other errors
    #[error("other: {0}")]
    Other(String),
}

/// Coarse error categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential configuration problems
    Configuration,
    /// Token acquisition failures
    Authentication,
    /// Credentials profile problems
    Profile,
    /// Resource not found (404)
    NotFound,
    /// Rate limit exceeded (429)
    RateLimit,
    /// Request timeout
    Timeout,
    /// Network level failures
    Network,
    /// Server side failures (5xx)
    Server,
    /// Other/unknown error
    Other,
}

impl Error {
    /// Build an authentication error with an underlying cause
    pub fn authentication(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Authentication {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Build an authentication error without an underlying cause
    pub fn rejected(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
            source: None,
        }
    }

    /// Get the error kind for categorization
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::ProfileParse(_) => ErrorKind::Profile,
            Error::Http { status: 404, .. } => ErrorKind::NotFound,
            Error::Http { status: 429, .. } => ErrorKind::RateLimit,
            Error::Http { status, .. } if *status >= 500 => ErrorKind::Server,
            Error::Timeout => ErrorKind::Timeout,
            Error::Network(_) => ErrorKind::Network,
            _ => ErrorKind::Other,
        }
    }

    /// Get the HTTP status code if this is an HTTP error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the request ID if available
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Http { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() || err.is_request() {
            Error::Network(err.to_string())
        } else if err.is_decode() {
            Error::Deserialize(err.to_string())
        } else {
            Error::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialize(err.to_string())
    }
}
