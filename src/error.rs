//! Error types for ranobe2ebook operations.

use thiserror::Error;

/// Errors reported by a [`ContentSource`](crate::source::ContentSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {0}")]
    Status(u16),

    /// The response body ended early. Worth retrying.
    #[error("truncated response")]
    Truncated,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid payload: {0}")]
    Invalid(String),
}

impl SourceError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Truncated)
    }
}

/// Errors that can occur while converting chapters and assembling a book.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Image {url} skipped: {reason}")]
    ImageFetch { url: String, reason: String },

    #[error("Failed to fetch volume {volume} chapter {number}: {source}")]
    ChapterFetch {
        volume: String,
        number: String,
        #[source]
        source: SourceError,
    },

    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn image(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::ImageFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
