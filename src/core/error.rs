//! Unified error handling for Fragway
//!
//! Every component reports failures through [`GatewayError`]. Handler
//! failures that are part of normal business flow are *not* errors; they are
//! expressed through [`HandlerOutcome::Failure`](super::traits::HandlerOutcome).
//! Anything surfacing as a `GatewayError` from a handler is treated as fatal.

use std::fmt;

/// Unified error types for the gateway
#[derive(Debug)]
pub enum GatewayError {
    /// Startup configuration problems (unknown handler, bad handler config, ...)
    Configuration(String),

    /// Structural validation of the configuration document failed
    Validation(String),

    /// The inbound request could not be interpreted (bad query escapes, ...)
    MalformedRequest(String),

    /// The request body exceeds the configured limit (bytes)
    PayloadTooLarge(usize),

    /// Unexpected error raised by a handler
    Handler(String),

    /// A handler did not finish within its time budget
    Timeout(String),

    /// I/O errors
    Io(std::io::Error),

    /// JSON / YAML (de)serialization errors
    Serialization(String),

    /// Internal system errors
    Internal(String),

    /// Resource not found errors
    NotFound(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            GatewayError::Validation(msg) => write!(f, "Validation error: {msg}"),
            GatewayError::MalformedRequest(msg) => write!(f, "Malformed request: {msg}"),
            GatewayError::PayloadTooLarge(limit) => {
                write!(f, "Request body exceeds {limit} bytes")
            }
            GatewayError::Handler(msg) => write!(f, "Handler error: {msg}"),
            GatewayError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            GatewayError::Io(err) => write!(f, "I/O error: {err}"),
            GatewayError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            GatewayError::Internal(msg) => write!(f, "Internal error: {msg}"),
            GatewayError::NotFound(msg) => write!(f, "Resource not found: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl GatewayError {
    pub fn serialization_error(context: &str, err: impl fmt::Display) -> Self {
        GatewayError::Serialization(format!("{context}: {err}"))
    }

    pub fn handler_error(handler: &str, err: impl fmt::Display) -> Self {
        GatewayError::Handler(format!("[{handler}] {err}"))
    }
}

// Error conversions
impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(err: validator::ValidationErrors) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> GatewayResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> GatewayResult<T> {
        self.map_err(|e| GatewayError::Internal(format!("{context}: {e}")))
    }
}

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::GatewayError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::GatewayError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::core::error::GatewayError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::GatewayError::Internal(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = config_error!("unknown handler {}", "foo");
        assert_eq!(err.to_string(), "Configuration error: unknown handler foo");

        let err = internal_error!("boom");
        assert_eq!(err.to_string(), "Internal error: boom");
    }

    #[test]
    fn test_with_context() {
        let res: Result<(), &str> = Err("disk gone");
        let err = res.with_context("Reading template").unwrap_err();
        assert!(matches!(err, GatewayError::Internal(ref m) if m == "Reading template: disk gone"));
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;
        let err: GatewayError = std::io::Error::new(std::io::ErrorKind::NotFound, "x").into();
        assert!(err.source().is_some());
    }
}
