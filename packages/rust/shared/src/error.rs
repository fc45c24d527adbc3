//! Error types for orgenrich.
//!
//! Library crates use [`EnrichError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all orgenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A remote endpoint answered with a non-2xx status.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Response payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// WebDriver / headless browser failure.
    #[error("browser error: {0}")]
    Browser(String),

    /// The WebDriver session no longer exists (closed window, invalid id).
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input rejected before any request was made.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnrichError>;

impl EnrichError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed (transport failures and 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether a browser session that produced this error should be discarded.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::SessionLost(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EnrichError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = EnrichError::Http {
            status: 500,
            url: "https://crm.test/contacts".into(),
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from https://crm.test/contacts: boom");
    }

    #[test]
    fn transient_classification() {
        assert!(EnrichError::Network("timed out".into()).is_transient());

        let server_error = EnrichError::Http {
            status: 503,
            url: String::new(),
            body: String::new(),
        };
        assert!(server_error.is_transient());
        assert_eq!(server_error.status(), Some(503));

        let not_found = EnrichError::Http {
            status: 404,
            url: String::new(),
            body: String::new(),
        };
        assert!(!not_found.is_transient());
        assert!(!EnrichError::parse("bad json").is_transient());
    }

    #[test]
    fn session_invalidation() {
        assert!(EnrichError::SessionLost("invalid session id".into()).invalidates_session());
        assert!(EnrichError::Network("connection refused".into()).invalidates_session());
        assert!(!EnrichError::Browser("timeout: page load".into()).invalidates_session());
    }
}
