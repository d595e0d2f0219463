//! Error types for djtool core.

use thiserror::Error;

use crate::session::SessionError;

/// Core error type for djtool operations.
#[derive(Error, Debug)]
pub enum DjtoolError {
    /// Server-related errors
    #[error("Server error: {0}")]
    Server(#[from] tonic::transport::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file parsing errors
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// Daemon endpoint errors
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session errors returned to the caller
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Result type alias for djtool operations.
pub type Result<T> = std::result::Result<T, DjtoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_djtool_error_address_parsing() {
        let parse_err = "invalid:address:format".parse::<std::net::SocketAddr>().unwrap_err();
        let err: DjtoolError = parse_err.into();
        assert!(matches!(err, DjtoolError::InvalidAddress(_)));
    }

    #[test]
    fn test_djtool_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: DjtoolError = io_err.into();
        assert!(matches!(err, DjtoolError::Io(_)));
    }

    #[test]
    fn test_djtool_error_config_display() {
        let err = DjtoolError::Config("liveness window must be non-zero".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("liveness window"));
    }

    #[test]
    fn test_djtool_error_config_parse() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: DjtoolError = toml_err.into();
        assert!(matches!(err, DjtoolError::ConfigParse(_)));
    }

    #[test]
    fn test_djtool_error_from_session() {
        let err: DjtoolError = SessionError::Closed.into();
        assert!(matches!(err, DjtoolError::Session(SessionError::Closed)));
        assert!(err.to_string().contains("Session error"));
    }
}
