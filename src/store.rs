//! Credential store trait.
//!
//! [`CredentialStore`] is the CRUD surface the rest of an application codes
//! against. [`CredentialManager`](crate::CredentialManager) implements it on
//! top of the native interop layer; tests and alternative hosts can supply
//! their own.

use crate::manager::Credentials;
use crate::{Credential, CredentialType, Result};

/// CRUD access to a credential store.
///
/// All implementations must be `Send + Sync`. Every method is synchronous
/// and blocks the calling thread for the duration of the underlying call.
///
/// # Absent versus failed
///
/// A missing credential is never an error. [`find`](CredentialStore::find)
/// returns `Ok(None)` and deleting a missing target returns `Ok(())`. Errors
/// are reserved for caller mistakes
/// ([`InvalidUsage`](crate::CredStoreError::InvalidUsage)) and statuses the
/// OS reports as failures
/// ([`NativeFailure`](crate::CredStoreError::NativeFailure)).
///
/// # Example
///
/// ```
/// use credstore::native::MockCredentialApi;
/// use credstore::{CredentialManager, CredentialStore, CredentialType};
/// use std::sync::Arc;
///
/// fn rotate(store: &dyn CredentialStore, id: &str, secret: &str) -> credstore::Result<bool> {
///     let Some(current) = store.find(id, CredentialType::Generic)? else {
///         return Ok(false);
///     };
///     store.update(&current.to_builder().with_secret(secret).build()?)?;
///     Ok(true)
/// }
///
/// let manager = CredentialManager::new(Arc::new(MockCredentialApi::new()));
/// assert!(!rotate(&manager, "svc@host", "p2").unwrap());
/// ```
pub trait CredentialStore: Send + Sync {
    /// Returns the name of the underlying API ("win32", "mock").
    fn name(&self) -> &str;

    // ========================================================================
    // Reads
    // ========================================================================

    /// Looks up one credential by target name and type.
    ///
    /// # Errors
    ///
    /// - [`InvalidUsage`](crate::CredStoreError::InvalidUsage): empty `id`
    ///   or an `Unknown` type
    /// - [`NativeFailure`](crate::CredStoreError::NativeFailure): the OS
    ///   reported anything other than success or not-found
    fn find(&self, id: &str, cred_type: CredentialType) -> Result<Option<Credential>>;

    /// Enumerates credentials whose target matches `filter` (`PREFIX*`).
    ///
    /// With `search_all` set the filter is ignored and every credential of
    /// the logon session is returned.
    fn find_matching(&self, filter: &str, search_all: bool) -> Result<Credentials>;

    /// Enumerates every credential of the logon session.
    fn credentials(&self) -> Result<Credentials>;

    /// Checks whether a credential exists.
    fn exists(&self, id: &str, cred_type: CredentialType) -> Result<bool> {
        Ok(self.find(id, cred_type)?.is_some())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Creates or replaces a credential.
    ///
    /// # Errors
    ///
    /// - [`InvalidUsage`](crate::CredStoreError::InvalidUsage): empty user
    ///   name, or a field over its native size limit
    /// - [`NativeFailure`](crate::CredStoreError::NativeFailure): the write
    ///   was rejected
    fn add(&self, credential: &Credential) -> Result<()>;

    /// Replaces a credential. Same as [`add`](CredentialStore::add); the OS
    /// write is create-or-replace.
    fn update(&self, credential: &Credential) -> Result<()> {
        self.add(credential)
    }

    /// Deletes `credential`. Deleting a missing credential succeeds.
    fn delete(&self, credential: &Credential) -> Result<()> {
        self.delete_by_id(credential.id(), credential.cred_type())
    }

    /// Deletes the credential with `id` and `cred_type`. Deleting a missing
    /// credential succeeds.
    fn delete_by_id(&self, id: &str, cred_type: CredentialType) -> Result<()>;
}
