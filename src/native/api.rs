//! Foreign function bindings.
//!
//! [`CredentialApi`] is the seam between this crate and the OS. Each method
//! maps to one `advapi32` entry point and returns the thread's last-error
//! value as the `Err` side of its result, captured before any other native
//! call can overwrite it.

use super::{ErrorCode, RawCredential};
use std::ffi::c_void;

/// Result of a foreign call: the payload on success, the OS status otherwise.
pub type NativeResult<T> = std::result::Result<T, ErrorCode>;

/// `CRED_ENUMERATE_ALL_CREDENTIALS`
pub const CRED_ENUMERATE_ALL_CREDENTIALS: u32 = 0x1;
/// `CRED_PRESERVE_CREDENTIAL_BLOB`
pub const CRED_PRESERVE_CREDENTIAL_BLOB: u32 = 0x1;

/// Maximum user name length in UTF-16 units (`CRED_MAX_USERNAME_LENGTH`).
pub const CRED_MAX_USERNAME_LENGTH: usize = 513;
/// Maximum comment/alias length in UTF-16 units (`CRED_MAX_STRING_LENGTH`).
pub const CRED_MAX_STRING_LENGTH: usize = 256;
/// Maximum generic target name length (`CRED_MAX_GENERIC_TARGET_NAME_LENGTH`).
pub const CRED_MAX_TARGET_NAME_LENGTH: usize = 32767;
/// Maximum secret size in bytes (`CRED_MAX_CREDENTIAL_BLOB_SIZE`).
pub const CRED_MAX_CREDENTIAL_BLOB_SIZE: usize = 5 * 512;

/// Raw credential API entry points.
///
/// Implementations must be `Send + Sync`; they hold no per-call state.
/// Buffers handed out by [`cred_read`](CredentialApi::cred_read) and
/// [`cred_enumerate`](CredentialApi::cred_enumerate) must be returned through
/// [`cred_free`](CredentialApi::cred_free) exactly once.
pub trait CredentialApi: Send + Sync {
    /// Implementation name ("win32", "mock").
    fn name(&self) -> &str;

    /// `CredReadW`. `target` must be NUL-terminated UTF-16.
    fn cred_read(&self, target: &[u16], cred_type: u32, flags: u32)
        -> NativeResult<*mut RawCredential>;

    /// `CredWriteW`.
    ///
    /// # Safety
    ///
    /// `credential` must point to a valid record whose string and blob
    /// pointers stay valid for the duration of the call.
    unsafe fn cred_write(&self, credential: *const RawCredential, flags: u32) -> NativeResult<()>;

    /// `CredDeleteW`. `target` must be NUL-terminated UTF-16.
    fn cred_delete(&self, target: &[u16], cred_type: u32, flags: u32) -> NativeResult<()>;

    /// `CredEnumerateW`. Returns the element count and the base of a
    /// contiguous array of credential pointers.
    fn cred_enumerate(
        &self,
        filter: Option<&[u16]>,
        flags: u32,
    ) -> NativeResult<(u32, *mut *mut RawCredential)>;

    /// `CredFree`.
    ///
    /// # Safety
    ///
    /// `buffer` must have come from this API and must not have been freed.
    unsafe fn cred_free(&self, buffer: *mut c_void) -> NativeResult<()>;
}

/// Encodes `value` as NUL-terminated UTF-16.
pub fn to_wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Number of UTF-16 units `value` occupies, without terminator.
pub fn wide_len(value: &str) -> usize {
    value.encode_utf16().count()
}
