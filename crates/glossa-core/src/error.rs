//! Error types for the Glossa reconciliation engine.
//!
//! The taxonomy separates failures that abort a whole reconciliation run
//! (a store snapshot could not be fetched) from failures that only affect a
//! single repair item, which are recorded and left for the next pass.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Glossa library.
#[derive(Debug, Error)]
pub enum GlossaError {
    // Reconciliation errors
    #[error("Store unavailable ({store}): {message}")]
    StoreUnavailable { store: String, message: String },

    #[error("Repair '{stage}' failed for {item}: {message}")]
    ItemRepairFailed {
        stage: String,
        item: String,
        message: String,
    },

    #[error("{kind} not found: {id}")]
    ResourceNotFound { kind: String, id: String },

    #[error("Revision conflict on {kind} {id}: expected {expected:?}, found {actual:?}")]
    RevisionConflict {
        kind: String,
        id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// HTTP status returned by the remote service, if any
        status_code: Option<u16>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Glossa operations.
pub type Result<T> = std::result::Result<T, GlossaError>;

impl From<std::io::Error> for GlossaError {
    fn from(err: std::io::Error) -> Self {
        GlossaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for GlossaError {
    fn from(err: serde_json::Error) -> Self {
        GlossaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for GlossaError {
    fn from(err: rusqlite::Error) -> Self {
        GlossaError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for GlossaError {
    fn from(err: reqwest::Error) -> Self {
        GlossaError::Network {
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
        }
    }
}

impl GlossaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        GlossaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        GlossaError::ResourceNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Wrap any error raised while snapshotting `store`.
    ///
    /// Errors that already carry the store name are passed through untouched.
    pub fn store_unavailable(store: &str, err: GlossaError) -> Self {
        match err {
            GlossaError::StoreUnavailable { .. } => err,
            other => GlossaError::StoreUnavailable {
                store: store.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Returns true for `ResourceNotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GlossaError::ResourceNotFound { .. })
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Store unavailable / network error
    /// - -32002: Resource not found
    /// - -32003: Repair failed
    /// - -32005: Revision conflict
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            GlossaError::StoreUnavailable { .. }
            | GlossaError::Network { .. }
            | GlossaError::Timeout(_) => -32000,

            GlossaError::ResourceNotFound { .. } => -32002,

            GlossaError::ItemRepairFailed { .. } => -32003,

            GlossaError::RevisionConflict { .. } => -32005,

            GlossaError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            GlossaError::Timeout(_) => true,
            GlossaError::Network { status_code, .. } => match status_code {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            _ => false,
        }
    }
}
