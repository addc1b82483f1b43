//! `advapi32` credential API through the `windows` crate.

use super::{CredentialApi, ErrorCode, NativeResult, RawCredential};
use crate::Result;
use std::ffi::c_void;
use std::ptr;
use windows::core::PCWSTR;
use windows::Win32::Security::Credentials::{
    CredDeleteW, CredEnumerateW, CredFree, CredReadW, CredWriteW, CREDENTIALW,
    CRED_ENUMERATE_FLAGS, CRED_TYPE,
};

// Win32 errors surface as HRESULT_FROM_WIN32(code).
const FACILITY_WIN32_MASK: u32 = 0xFFFF_0000;
const FACILITY_WIN32_PREFIX: u32 = 0x8007_0000;

fn error_code(error: windows::core::Error) -> ErrorCode {
    let hr = error.code().0 as u32;
    if hr & FACILITY_WIN32_MASK == FACILITY_WIN32_PREFIX {
        ErrorCode::from(hr & 0xFFFF)
    } else {
        ErrorCode::from(hr)
    }
}

/// The real Windows Credential Manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32CredentialApi;

impl Win32CredentialApi {
    /// Binds to the system credential store.
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

impl CredentialApi for Win32CredentialApi {
    fn name(&self) -> &str {
        "win32"
    }

    fn cred_read(
        &self,
        target: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> NativeResult<*mut RawCredential> {
        let mut buffer: *mut CREDENTIALW = ptr::null_mut();
        // SAFETY: target is NUL-terminated and outlives the call.
        unsafe {
            CredReadW(
                PCWSTR::from_raw(target.as_ptr()),
                CRED_TYPE(cred_type),
                flags,
                &mut buffer,
            )
        }
        .map_err(error_code)?;
        Ok(buffer.cast())
    }

    unsafe fn cred_write(&self, credential: *const RawCredential, flags: u32) -> NativeResult<()> {
        CredWriteW(credential.cast::<CREDENTIALW>(), flags).map_err(error_code)
    }

    fn cred_delete(&self, target: &[u16], cred_type: u32, flags: u32) -> NativeResult<()> {
        // SAFETY: target is NUL-terminated and outlives the call.
        unsafe { CredDeleteW(PCWSTR::from_raw(target.as_ptr()), CRED_TYPE(cred_type), flags) }
            .map_err(error_code)
    }

    fn cred_enumerate(
        &self,
        filter: Option<&[u16]>,
        flags: u32,
    ) -> NativeResult<(u32, *mut *mut RawCredential)> {
        let filter = filter.map_or(PCWSTR::null(), |f| PCWSTR::from_raw(f.as_ptr()));
        let mut count = 0u32;
        let mut buffer: *mut *mut CREDENTIALW = ptr::null_mut();
        // SAFETY: filter is null or NUL-terminated; out-pointers are locals.
        unsafe { CredEnumerateW(filter, CRED_ENUMERATE_FLAGS(flags), &mut count, &mut buffer) }
            .map_err(error_code)?;
        Ok((count, buffer.cast()))
    }

    unsafe fn cred_free(&self, buffer: *mut c_void) -> NativeResult<()> {
        CredFree(buffer.cast_const());
        Ok(())
    }
}
