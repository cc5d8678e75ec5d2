//! Result and error types for adslot.

use thiserror::Error;

/// Result type for adslot operations
pub type AdSlotResult<T> = Result<T, AdSlotError>;

/// Errors that can occur while building or driving an ad slot
#[derive(Debug, Error)]
pub enum AdSlotError {
    /// Unit id cannot be substituted into the content URL
    #[error("Invalid ad unit id {unit_id:?}: {message}")]
    InvalidUnitId {
        /// Rejected unit id
        unit_id: String,
        /// Error message
        message: String,
    },

    /// Content URL template rendered to something unparseable
    #[error("Invalid content URL {url}: {message}")]
    InvalidContentUrl {
        /// Rendered URL
        url: String,
        /// Error message
        message: String,
    },

    /// Key-value store read, write or delete failed
    #[error("Storage error for key {key}: {message}")]
    Storage {
        /// Key being accessed
        key: String,
        /// Error message
        message: String,
    },

    /// Content surface operation failed (load, inject, cookies, evaluate)
    #[error("Content surface error: {message}")]
    Surface {
        /// Error message
        message: String,
    },

    /// The system browser refused or failed to open a URL
    #[error("Failed to open {url} externally: {message}")]
    ExternalOpen {
        /// URL that could not be opened
        url: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdSlotError {
    /// Create a storage error
    #[must_use]
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a content surface error
    #[must_use]
    pub fn surface(message: impl Into<String>) -> Self {
        Self::Surface {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
