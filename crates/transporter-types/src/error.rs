use std::fmt;

use thiserror::Error;

pub type UploadResult<T> = Result<T, UploadError>;

/// Which validation call rejected the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Metadata,
    Assets,
    ClientChecksum,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => f.write_str("metadata validation"),
            Self::Assets => f.write_str("asset validation"),
            Self::ClientChecksum => f.write_str("client checksum"),
        }
    }
}

/// Every way an upload run can fail. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Lookup(String),

    #[error("{message}")]
    Validation {
        stage: ValidationStage,
        message: String,
    },

    #[error("{0}")]
    Reservation(String),

    #[error("Upload to {uri} failed: {reason}")]
    Transfer { uri: String, reason: String },

    #[error("{0}")]
    Commit(String),

    #[error("{0}")]
    Completion(String),

    #[error("{0}")]
    Archive(String),

    #[error("Could not download file: {0}")]
    Download(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    pub fn validation(stage: ValidationStage, message: impl Into<String>) -> Self {
        Self::Validation {
            stage,
            message: message.into(),
        }
    }

    pub fn transfer(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_passed_through() {
        let err = UploadError::validation(ValidationStage::Assets, "Asset validation failed!\nbad icon");
        assert_eq!(err.to_string(), "Asset validation failed!\nbad icon");
        assert!(matches!(
            err,
            UploadError::Validation { stage: ValidationStage::Assets, .. }
        ));
    }

    #[test]
    fn transfer_error_names_the_uri() {
        let err = UploadError::transfer("https://example.com/put", "status 400");
        assert_eq!(err.to_string(), "Upload to https://example.com/put failed: status 400");
    }
}
