//! Error types for the geocat crate.

use std::fmt;

/// Result type for geocat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request itself is malformed: bad resource name, unknown layer,
    /// invalid version. Never retried.
    InvalidArgument {
        /// Description of what was invalid.
        message: String,
    },
    /// The service refused the credentials (HTTP 403). Never retried.
    AccessDenied {
        /// The URL that was refused.
        url: String,
        /// The response body or error message.
        message: String,
    },
    /// The resource does not exist, or a cache-only request missed.
    NotFound {
        /// What was not found.
        message: String,
    },
    /// The service failed or answered with something unparseable.
    ServiceUnavailable {
        /// The HTTP status code, when the failure came with one.
        status: Option<u16>,
        /// The response body or error message.
        message: String,
    },
    /// The caller cancelled the request chain.
    Cancelled,
    /// The transport failed before a response arrived.
    Network {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// Cache operation failed.
    Cache {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build an [`Error::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }

    /// Build an [`Error::ServiceUnavailable`] without a status code.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Error::ServiceUnavailable {
            status: None,
            message: message.into(),
        }
    }

    /// The HTTP status code associated with this error, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::AccessDenied { .. } => Some(403),
            Error::ServiceUnavailable { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a retry of the same request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable { .. } | Error::Network { .. })
    }

    /// Whether this error is the result of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { message } => write!(f, "invalid argument: {message}"),
            Error::AccessDenied { url, message } => {
                write!(f, "access to {url} denied: {message}")
            }
            Error::NotFound { message } => write!(f, "not found: {message}"),
            Error::ServiceUnavailable {
                status: Some(status),
                message,
            } => write!(f, "service unavailable (status {status}): {message}"),
            Error::ServiceUnavailable {
                status: None,
                message,
            } => write!(f, "service unavailable: {message}"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::Network { url, message } => {
                write!(f, "network request to {url} failed: {message}")
            }
            Error::Cache { operation, message } => {
                write!(f, "cache {operation} failed: {message}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<geocat_model::ModelError> for Error {
    fn from(e: geocat_model::ModelError) -> Self {
        match e {
            geocat_model::ModelError::InvalidResponse { .. } => {
                Error::service_unavailable(e.to_string())
            }
            geocat_model::ModelError::InvalidHrn { .. }
            | geocat_model::ModelError::InvalidTileKey { .. } => {
                Error::invalid_argument(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_map_to_taxonomy() {
        let parse = geocat_model::Hrn::parse("nope").unwrap_err();
        assert!(matches!(Error::from(parse), Error::InvalidArgument { .. }));

        let body = geocat_model::from_json::<geocat_model::Catalog>("catalog", b"garbage")
            .unwrap_err();
        assert!(matches!(
            Error::from(body),
            Error::ServiceUnavailable { status: None, .. }
        ));
    }

    #[test]
    fn test_http_status() {
        let denied = Error::AccessDenied {
            url: "https://example.com".to_string(),
            message: "forbidden".to_string(),
        };
        assert_eq!(denied.http_status(), Some(403));
        assert_eq!(Error::Cancelled.http_status(), None);
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!denied.is_retryable());
        assert!(Error::service_unavailable("busy").is_retryable());
        assert_eq!(
            Error::ServiceUnavailable {
                status: Some(429),
                message: String::new()
            }
            .http_status(),
            Some(429)
        );
    }
}
