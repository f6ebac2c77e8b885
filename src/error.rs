//! Error types for FarmClassifieds
//!
//! Every operation in the crate returns [`AppError`]. The domain variants are
//! expected, recoverable conditions that callers turn into user-facing
//! messages; the infrastructure variants wrap failures of the database,
//! asset storage or configuration.

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// The seller already owns as many listings as their quota allows
    #[error("Ad limit reached ({limit}). Please contact the administrator to post more ads.")]
    QuotaExceeded { limit: i64 },

    /// Listing or user absent, or the caller does not own it
    #[error("Resource not found")]
    NotFound,

    /// Staff-only operation attempted by a regular seller
    #[error("Access denied")]
    Forbidden,

    /// More than the allowed number of images on one listing
    #[error("You can upload up to {max} images.")]
    CapacityExceeded { max: usize },

    /// Uploaded bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    Decode(String),

    /// Owner renewals exhausted
    #[error("Renewal limit reached ({max}). Please contact administrator.")]
    RenewalLimit { max: i64 },

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Superuser accounts cannot be deleted
    #[error("Superusers cannot be deleted.")]
    ProtectedUser,

    /// A concurrent writer kept changing the same record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Asset storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::NotFound => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::CapacityExceeded { .. } => "capacity_exceeded",
            AppError::Decode(_) => "decode",
            AppError::RenewalLimit { .. } => "renewal_limit",
            AppError::Validation(_) => "validation",
            AppError::ProtectedUser => "protected_user",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Count this error in the error metric and hand it back.
    pub(crate) fn recorded(self) -> Self {
        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();
        self
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
