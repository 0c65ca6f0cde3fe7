//! Error types for the logging pipeline

use std::time::Duration;

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Embedded database error
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// File output error with path
    #[error("File output error for '{path}': {message}")]
    FileOutputError { path: String, message: String },

    /// File rotation error
    #[error("File rotation failed for '{path}': {message}")]
    FileRotationError { path: String, message: String },

    /// Remote collector answered with a non-success status
    #[error("HTTP request to '{endpoint}' failed with status {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// Request never produced a status code
    #[error("HTTP transport error: {0}")]
    HttpTransport(String),

    /// Operation exceeded its deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Batch delivery gave up after retrying
    #[error("Delivery failed after {attempts} attempts: {message}")]
    DeliveryFailed { attempts: u32, message: String },

    /// Output was used after `close()`
    #[error("Output '{output}' is closed")]
    OutputClosed { output: String },

    /// Output panicked while handling an operation
    #[error("Output '{output}' panicked: {message}")]
    OutputPanicked { output: String, message: String },

    /// Background task could not be joined
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a file output error
    pub fn file_output(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileOutputError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file rotation error
    pub fn file_rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::FileRotationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn http_status(endpoint: impl Into<String>, status: u16) -> Self {
        LoggerError::HttpStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    pub fn http_transport<S: Into<String>>(msg: S) -> Self {
        LoggerError::HttpTransport(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        LoggerError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn delivery_failed(attempts: u32, message: impl Into<String>) -> Self {
        LoggerError::DeliveryFailed {
            attempts,
            message: message.into(),
        }
    }

    pub fn closed(output: impl Into<String>) -> Self {
        LoggerError::OutputClosed {
            output: output.into(),
        }
    }

    pub fn panicked(output: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::OutputPanicked {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// Whether a failed delivery is worth retrying
    ///
    /// Transport failures, timeouts and 5xx answers are transient; everything
    /// else (notably 4xx) means the collector rejected the payload.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            LoggerError::HttpStatus { status, .. } => (500..600).contains(status),
            LoggerError::HttpTransport(_) | LoggerError::Timeout { .. } => true,
            LoggerError::IoError(_) | LoggerError::IoOperation { .. } => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for LoggerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LoggerError::TaskJoin(err.to_string())
    }
}

/// Extract a readable message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::config("FileOutput", "Invalid path");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));

        let err = LoggerError::file_output("/var/log/app.log", "Permission denied");
        assert!(matches!(err, LoggerError::FileOutputError { .. }));

        let err = LoggerError::closed("http");
        assert!(matches!(err, LoggerError::OutputClosed { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::file_rotation("/var/log/app.log", "Disk full");
        assert_eq!(
            err.to_string(),
            "File rotation failed for '/var/log/app.log': Disk full"
        );

        let err = LoggerError::http_status("https://logs.example.com", 503);
        assert_eq!(
            err.to_string(),
            "HTTP request to 'https://logs.example.com' failed with status 503"
        );

        let err = LoggerError::delivery_failed(4, "connection refused");
        assert_eq!(
            err.to_string(),
            "Delivery failed after 4 attempts: connection refused"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(LoggerError::http_status("x", 500).is_transient());
        assert!(LoggerError::http_status("x", 503).is_transient());
        assert!(!LoggerError::http_status("x", 404).is_transient());
        assert!(!LoggerError::http_status("x", 400).is_transient());
        assert!(LoggerError::http_transport("reset").is_transient());
        assert!(LoggerError::timeout("send", Duration::from_secs(1)).is_transient());
        assert!(!LoggerError::other("nope").is_transient());
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("writing log file", "cannot write to file", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("writing log file"));
        assert!(err.to_string().contains("cannot write to file"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
