//! Error types for the Vani orchestration core.

/// Result type alias for Vani operations
pub type VaniResult<T> = Result<T, VaniError>;

/// Main error type for Vani operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VaniError {
    /// Request failed validation (oversized text, malformed tag, missing field)
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Artifacts are missing locally and cannot be fetched
    #[error("Artifact unavailable: {message}")]
    ArtifactUnavailable {
        /// Error message describing which artifact is missing
        message: String,
    },

    /// Remote store connectivity or copy failure
    #[error("Transfer failed: {message}")]
    TransferFailure {
        /// Error message describing the transfer issue
        message: String,
    },

    /// Download completed but the manifest is still unsatisfied
    #[error("Manifest incomplete: {message}")]
    ManifestIncomplete {
        /// Error message naming the missing files
        message: String,
    },

    /// Model or vocoder handle construction failed
    #[error("Model loading error: {message}")]
    ModelError {
        /// Error message describing the model loading failure
        message: String,
    },

    /// Acoustic model, vocoder or preprocessor call failed
    #[error("TTS synthesis failed: {message}")]
    SynthesisError {
        /// Error message describing the failure
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Thread or concurrency error
    #[error("Concurrency error: {message}")]
    ConcurrencyError {
        /// Error message describing the concurrency issue
        message: String,
    },
}

impl VaniError {
    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new artifact unavailable error
    #[must_use]
    pub fn artifact_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ArtifactUnavailable {
            message: message.into(),
        }
    }

    /// Create a new transfer failure
    #[must_use]
    pub fn transfer<S: Into<String>>(message: S) -> Self {
        Self::TransferFailure {
            message: message.into(),
        }
    }

    /// Create a new manifest incomplete error
    #[must_use]
    pub fn manifest_incomplete<S: Into<String>>(message: S) -> Self {
        Self::ManifestIncomplete {
            message: message.into(),
        }
    }

    /// Create a new model error
    #[must_use]
    pub fn model<S: Into<String>>(message: S) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisError {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new concurrency error
    #[must_use]
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// Human-readable detail without the category prefix
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidInput { message }
            | Self::ArtifactUnavailable { message }
            | Self::TransferFailure { message }
            | Self::ManifestIncomplete { message }
            | Self::ModelError { message }
            | Self::SynthesisError { message }
            | Self::ConfigurationError { message }
            | Self::FileError { message }
            | Self::ConcurrencyError { message } => message,
        }
    }

    /// Check if this error is retriable (bounded retry by the caller)
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ArtifactUnavailable { .. } | Self::TransferFailure { .. }
        )
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::ConfigurationError { .. }
        )
    }

    /// Get the error category for logging/metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "input",
            Self::ArtifactUnavailable { .. } => "artifact",
            Self::TransferFailure { .. } => "transfer",
            Self::ManifestIncomplete { .. } => "manifest",
            Self::ModelError { .. } => "model",
            Self::SynthesisError { .. } => "synthesis",
            Self::ConfigurationError { .. } => "configuration",
            Self::FileError { .. } => "file",
            Self::ConcurrencyError { .. } => "concurrency",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for VaniError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<object_store::Error> for VaniError {
    fn from(err: object_store::Error) -> Self {
        Self::transfer(err.to_string())
    }
}

impl From<toml::de::Error> for VaniError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid TOML: {err}"))
    }
}

impl From<hound::Error> for VaniError {
    fn from(err: hound::Error) -> Self {
        Self::file(format!("WAV encoding error: {err}"))
    }
}

impl From<tokio::task::JoinError> for VaniError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::concurrency(format!("Worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = VaniError::synthesis("Test synthesis error");
        assert_eq!(err.category(), "synthesis");
        assert!(!err.is_retriable());
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_error_display() {
        let err = VaniError::manifest_incomplete("missing generator");
        assert_eq!(err.to_string(), "Manifest incomplete: missing generator");
        assert_eq!(err.detail(), "missing generator");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(VaniError::invalid_input("test").category(), "input");
        assert_eq!(VaniError::artifact_unavailable("test").category(), "artifact");
        assert_eq!(VaniError::transfer("test").category(), "transfer");
        assert_eq!(VaniError::manifest_incomplete("test").category(), "manifest");
        assert_eq!(VaniError::model("test").category(), "model");
        assert_eq!(VaniError::configuration("test").category(), "configuration");
        assert_eq!(VaniError::file("test").category(), "file");
        assert_eq!(VaniError::concurrency("test").category(), "concurrency");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(VaniError::transfer("test").is_retriable());
        assert!(VaniError::artifact_unavailable("test").is_retriable());
        assert!(!VaniError::manifest_incomplete("test").is_retriable());
        assert!(!VaniError::synthesis("test").is_retriable());
        assert!(!VaniError::invalid_input("test").is_retriable());
    }

    #[test]
    fn test_user_errors() {
        assert!(VaniError::invalid_input("test").is_user_error());
        assert!(VaniError::configuration("test").is_user_error());
        assert!(!VaniError::synthesis("test").is_user_error());
        assert!(!VaniError::transfer("test").is_user_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err = VaniError::from(io_err);
        assert!(matches!(err, VaniError::FileError { .. }));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err = VaniError::from(toml_err);
        assert!(matches!(err, VaniError::ConfigurationError { .. }));
    }

    #[test]
    fn test_error_equality() {
        let err1 = VaniError::synthesis("test message");
        let err2 = VaniError::synthesis("test message");
        let err3 = VaniError::synthesis("different message");

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
