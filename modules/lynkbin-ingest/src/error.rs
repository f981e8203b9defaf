use std::time::Duration;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Everything a submission can fail with.
///
/// Only [`IngestError::public_message`] is meant for end users. The `Display`
/// output carries upstream detail and belongs in logs.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        IngestError::InvalidInput(message.into())
    }

    /// Short message safe to show the submitter.
    pub fn public_message(&self) -> String {
        match self {
            IngestError::InvalidInput(msg) => msg.clone(),
            IngestError::Extraction(_) => "Failed to extract post details".to_string(),
            IngestError::Media(_) => "Failed to download post media".to_string(),
            IngestError::Oracle(_) => "Failed to summarize post".to_string(),
            IngestError::Store(StoreError::NotFound(_)) => {
                "Post not found or you don't have permission to delete it".to_string()
            }
            IngestError::Store(_) => "Failed to save post".to_string(),
        }
    }

    /// Whether the failure is attributable to the submitted reference rather
    /// than to our own infrastructure.
    pub fn is_client_error(&self) -> bool {
        match self {
            IngestError::InvalidInput(_)
            | IngestError::Extraction(_)
            | IngestError::Media(_)
            | IngestError::Oracle(OracleError::MalformedClassification(_)) => true,
            IngestError::Oracle(OracleError::UpstreamFailure(_) | OracleError::Timeout(_)) => false,
            IngestError::Store(StoreError::NotFound(_)) => true,
            IngestError::Store(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Could not determine media type of post")]
    DetectionFailed,

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
}

impl ExtractionError {
    pub fn navigation(url: &str, reason: impl std::fmt::Display) -> Self {
        ExtractionError::NavigationFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("None of {attempted} media item(s) could be downloaded")]
    NoMediaDownloaded { attempted: usize },

    #[error("Scratch storage error: {0}")]
    Scratch(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Malformed classification: {0}")]
    MalformedClassification(String),

    #[error("Oracle request failed: {0}")]
    UpstreamFailure(String),

    #[error("Oracle did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailure(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
