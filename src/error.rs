//! Error types for image data management
//!
//! Every fallible operation in the crate returns [`ImageError`]. Errors are
//! surfaced to the immediate caller as soon as they are detected; nothing is
//! retried internally.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ImageError>;

#[derive(Debug, Error)]
pub enum ImageError {
    /// The selector pair matched no row
    #[error("no image found for sample_id={sample_id}, image_id={image_id}")]
    NotFound { sample_id: String, image_id: String },

    /// `add` targeted an identifier pair that already exists
    #[error("image already exists for sample_id={sample_id}, image_id={image_id}")]
    DuplicateEntry { sample_id: String, image_id: String },

    /// The image source is neither an existing image file nor a valid URL
    #[error("invalid image source: {0}")]
    InvalidSource(String),

    /// A raster was requested from a record that has no source to read from
    #[error("no source available for {0}")]
    SourceUnavailable(String),

    /// Reading, downloading or decoding an image failed
    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    /// A scalar argument was malformed
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImageError {
    pub(crate) fn fetch(locator: impl Into<String>, reason: impl ToString) -> Self {
        ImageError::Fetch {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        ImageError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
