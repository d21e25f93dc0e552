use thiserror::Error;

/// bundlecopy error types
#[derive(Error, Debug)]
pub enum CopyError {
    /// Invalid combination of source/destination flags or settings
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A bundle was given where an image was expected, or the reverse
    #[error("{0}")]
    MismatchError(String),

    /// Lock file declares a kind other than BundleLock or ImagesLock
    #[error("Unexpected lock kind, expected BundleLock or ImagesLock, got: {0}")]
    LockKindError(String),

    /// Lock file could not be read or parsed
    #[error("Lock file error: {path} - {message}")]
    LockFile { path: String, message: String },

    /// Malformed image or repository reference
    #[error("Reference error: {0}")]
    ReferenceError(String),

    /// Content did not hash to the digest it was addressed by
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// OCI image error
    #[error("OCI image error: {0}")]
    OciImageError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// Tar archive error
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CopyError {
    fn from(err: serde_json::Error) -> Self {
        CopyError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CopyError {
    fn from(err: serde_yaml::Error) -> Self {
        CopyError::SerializationError(err.to_string())
    }
}

/// Result type alias for bundlecopy operations
pub type Result<T> = std::result::Result<T, CopyError>;
