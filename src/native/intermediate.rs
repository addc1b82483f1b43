//! Staging of a managed credential for a native write.

use super::api::to_wide;
use super::{MarshalService, OwnedBlock, RawCredential};
use crate::credential::file_time_of;
use crate::validation::{validate_id, validate_secret, validate_username};
use crate::{Credential, Result};
use std::fmt;
use std::ptr;
use zeroize::{Zeroize, Zeroizing};

/// Owns everything a `CREDENTIALW` built from a [`Credential`] points at.
///
/// The secret is copied as UTF-16 into a single block from the marshaler;
/// that block is wiped and freed when this value drops, whether or not the
/// write succeeded. The record returned by
/// [`native_credential`](IntermediateCredential::native_credential) is only
/// valid while `self` is alive.
pub struct IntermediateCredential<'a> {
    target_name: Vec<u16>,
    user_name: Vec<u16>,
    comment: Vec<u16>,
    secret: Option<OwnedBlock<'a>>,
    flags: u32,
    cred_type: u32,
    persist: u32,
    last_written: super::FileTime,
}

impl<'a> IntermediateCredential<'a> {
    /// Stages `credential`, allocating its secret from `marshaler`.
    ///
    /// # Errors
    ///
    /// [`CredStoreError::InvalidUsage`](crate::CredStoreError::InvalidUsage) for
    /// an empty id or user name, or a secret over the native size limit.
    pub fn new(credential: &Credential, marshaler: &'a dyn MarshalService) -> Result<Self> {
        validate_id(credential.id())?;
        validate_username(credential.username())?;
        validate_secret(credential.secret())?;

        let secret = if credential.secret().is_empty() {
            None
        } else {
            let units: Zeroizing<Vec<u16>> =
                Zeroizing::new(credential.secret().encode_utf16().collect());
            let mut block = OwnedBlock::new(marshaler, units.len() * 2)?;
            for (dst, unit) in block.as_mut_slice().chunks_exact_mut(2).zip(units.iter()) {
                dst.copy_from_slice(&unit.to_le_bytes());
            }
            Some(block)
        };

        Ok(Self {
            target_name: to_wide(credential.id()),
            user_name: to_wide(credential.username()),
            comment: to_wide(""),
            secret,
            flags: credential.characteristics().bits(),
            cred_type: credential.cred_type().code(),
            persist: credential.persistence().code(),
            last_written: file_time_of(credential),
        })
    }

    /// Size of the staged secret in bytes.
    pub fn secret_size(&self) -> usize {
        self.secret.as_ref().map_or(0, OwnedBlock::len)
    }

    /// Builds the native record pointing into this value's buffers.
    pub fn native_credential(&self) -> RawCredential {
        let (credential_blob, credential_blob_size) = match &self.secret {
            Some(block) => (block.as_ptr(), block.len() as u32),
            None => (ptr::null_mut(), 0),
        };

        RawCredential {
            flags: self.flags,
            cred_type: self.cred_type,
            target_name: self.target_name.as_ptr().cast_mut(),
            comment: self.comment.as_ptr().cast_mut(),
            last_written: self.last_written,
            credential_blob_size,
            credential_blob,
            persist: self.persist,
            attribute_count: 0,
            attributes: ptr::null_mut(),
            target_alias: ptr::null_mut(),
            user_name: self.user_name.as_ptr().cast_mut(),
        }
    }
}

impl Drop for IntermediateCredential<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.secret.as_mut() {
            block.as_mut_slice().zeroize();
        }
    }
}

impl fmt::Debug for IntermediateCredential<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntermediateCredential")
            .field("target_name", &String::from_utf16_lossy(&self.target_name))
            .field("secret_size", &self.secret_size())
            .finish()
    }
}
