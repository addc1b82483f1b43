//! Argument checks performed before any native call.
//!
//! Everything here raises [`CredStoreError::InvalidUsage`]: these are caller
//! mistakes the OS would reject anyway, caught before a buffer is allocated.

use crate::native::api::{
    wide_len, CRED_MAX_CREDENTIAL_BLOB_SIZE, CRED_MAX_TARGET_NAME_LENGTH,
    CRED_MAX_USERNAME_LENGTH,
};
use crate::{CredStoreError, Result};

/// Validates a target name.
///
/// # Example
///
/// ```
/// use credstore::validation::validate_id;
///
/// assert!(validate_id("svc@host").is_ok());
/// assert!(validate_id("").is_err());
/// assert!(validate_id("bad\0id").is_err());
/// ```
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(CredStoreError::InvalidUsage("id cannot be empty".to_string()));
    }

    if id.contains('\0') {
        return Err(CredStoreError::InvalidUsage(
            "id contains null byte".to_string(),
        ));
    }

    if wide_len(id) > CRED_MAX_TARGET_NAME_LENGTH {
        return Err(CredStoreError::InvalidUsage(format!(
            "id exceeds maximum length of {} characters",
            CRED_MAX_TARGET_NAME_LENGTH
        )));
    }

    Ok(())
}

/// Validates a user name for writing.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(CredStoreError::InvalidUsage(
            "username cannot be empty".to_string(),
        ));
    }

    if username.contains('\0') {
        return Err(CredStoreError::InvalidUsage(
            "username contains null byte".to_string(),
        ));
    }

    if wide_len(username) > CRED_MAX_USERNAME_LENGTH {
        return Err(CredStoreError::InvalidUsage(format!(
            "username exceeds maximum length of {} characters",
            CRED_MAX_USERNAME_LENGTH
        )));
    }

    Ok(())
}

/// Validates that a secret fits the native blob once encoded as UTF-16.
pub fn validate_secret(secret: &str) -> Result<()> {
    let size = wide_len(secret) * 2;
    if size > CRED_MAX_CREDENTIAL_BLOB_SIZE {
        return Err(CredStoreError::InvalidUsage(format!(
            "secret is {} bytes, maximum is {}",
            size, CRED_MAX_CREDENTIAL_BLOB_SIZE
        )));
    }
    Ok(())
}

/// Validates an enumeration filter (`PREFIX*`).
pub fn validate_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(CredStoreError::InvalidUsage(
            "filter cannot be empty".to_string(),
        ));
    }

    if filter.contains('\0') {
        return Err(CredStoreError::InvalidUsage(
            "filter contains null byte".to_string(),
        ));
    }

    Ok(())
}
