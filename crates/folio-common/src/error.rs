//! Folio Error - Shared Error Types
//!
//! Errors raised while loading configuration and auxiliary files.
//!
//! @version 0.1.0
//! @author Folio Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Error type for configuration and file handling.
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for shared Folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;

impl FolioError {
    /// Returns true if the error came from reading the filesystem.
    pub fn is_io(&self) -> bool {
        matches!(self, FolioError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FolioError = io.into();
        assert!(err.is_io());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_configuration_message() {
        let err = FolioError::Configuration("bad key".to_string());
        assert!(!err.is_io());
        assert_eq!(err.to_string(), "configuration error: bad key");
    }
}
