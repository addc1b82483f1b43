//! Placeholder for platforms without the Windows credential store.

use super::{CredentialApi, ErrorCode, NativeResult, RawCredential};
use crate::{CredStoreError, Result};
use std::ffi::c_void;

/// Stand-in for the Windows Credential Manager on other platforms.
///
/// Cannot be constructed; [`new`](Win32CredentialApi::new) always fails.
#[derive(Debug)]
pub struct Win32CredentialApi {
    _private: (),
}

impl Win32CredentialApi {
    /// Always fails with [`CredStoreError::Unsupported`].
    pub fn new() -> Result<Self> {
        Err(CredStoreError::Unsupported(
            "Windows Credential Manager is only available on Windows with the `wincred` feature"
                .to_string(),
        ))
    }
}

impl CredentialApi for Win32CredentialApi {
    fn name(&self) -> &str {
        "win32"
    }

    fn cred_read(&self, _: &[u16], _: u32, _: u32) -> NativeResult<*mut RawCredential> {
        Err(ErrorCode::InvalidArgument)
    }

    unsafe fn cred_write(&self, _: *const RawCredential, _: u32) -> NativeResult<()> {
        Err(ErrorCode::InvalidArgument)
    }

    fn cred_delete(&self, _: &[u16], _: u32, _: u32) -> NativeResult<()> {
        Err(ErrorCode::InvalidArgument)
    }

    fn cred_enumerate(
        &self,
        _: Option<&[u16]>,
        _: u32,
    ) -> NativeResult<(u32, *mut *mut RawCredential)> {
        Err(ErrorCode::InvalidArgument)
    }

    unsafe fn cred_free(&self, _: *mut c_void) -> NativeResult<()> {
        Ok(())
    }
}
