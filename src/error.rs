//! Error types for credential store operations.

use crate::native::ErrorCode;
use thiserror::Error;

/// Result type alias using [`CredStoreError`].
pub type Result<T> = std::result::Result<T, CredStoreError>;

/// Errors that can occur while talking to the credential store.
///
/// A missing credential is not an error: lookups return `Ok(None)` and
/// deletes of missing targets succeed. Everything here is raised to the
/// immediate caller.
#[derive(Debug, Error)]
pub enum CredStoreError {
    /// The caller passed an argument the store can never accept (empty id,
    /// oversized secret, ...). Raised before any native call is made.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// A credential record violated its invariants at construction.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// A native call failed with a status that is not "not found".
    #[error("{operation} failed with native error {}: {message}", code.code())]
    NativeFailure {
        /// Native operation name (read, write, delete, enumerate, free)
        operation: &'static str,
        /// Original status reported by the OS
        code: ErrorCode,
        /// Translated message
        message: String,
    },

    /// A buffer returned by the OS could not be decoded.
    #[error("failed to decode native credential: {0}")]
    Decode(String),

    /// The requested native API is not available on this platform.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CredStoreError {
    /// Creates a native failure for `operation`.
    pub fn native(operation: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::NativeFailure {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Returns the native status code, if this is a native failure.
    pub fn native_code(&self) -> Option<u32> {
        match self {
            Self::NativeFailure { code, .. } => Some(code.code()),
            _ => None,
        }
    }

    /// True for a native failure carrying `ERROR_NOT_FOUND`.
    ///
    /// Lookups and deletes report a missing target as success, so this only
    /// holds for errors a caller constructed itself.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NativeFailure {
                code: ErrorCode::NotFound,
                ..
            }
        )
    }

    /// True when the OS reported a code the translator has no message for.
    pub fn is_unknown_code(&self) -> bool {
        matches!(
            self,
            Self::NativeFailure {
                code: ErrorCode::Other(_),
                ..
            }
        )
    }
}
