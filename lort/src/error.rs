//! Error handling for the lort CLI.

use thiserror::Error;

/// Main error type for the lort CLI application.
#[derive(Error, Debug)]
pub enum LortError {
    /// Error when configuration loading or validation fails.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error when file operations fail.
    #[error("File operation failed: {0}")]
    FileOperation(String),

    /// Error when input validation fails.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A lexical, parse or runtime error from the Loreline core.
    #[error("{0}")]
    Script(#[from] loreline::Error),

    /// Error when IO operations fail.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when JSON serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using LortError.
pub type Result<T> = std::result::Result<T, LortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = LortError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_script_error_conversion() {
        let inner = loreline::Error::new(
            loreline::ParseErrorKind::UnexpectedToken,
            "expected a beat name",
            loreline::Position::new(1, 1, 0, 0),
        );
        let err: LortError = inner.into();
        assert!(err.to_string().contains("expected a beat name"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LortError = io_err.into();
        assert!(matches!(err, LortError::Io(_)));
    }
}
