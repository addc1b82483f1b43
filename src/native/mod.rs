//! Native interop core.
//!
//! Everything that touches memory the OS owns lives here:
//!
//! - [`api`]: the [`CredentialApi`] seam over `CredReadW`, `CredWriteW`,
//!   `CredDeleteW`, `CredEnumerateW` and `CredFree`
//! - [`layout`]: the `CREDENTIALW` and `FILETIME` records
//! - [`marshal`]: allocation, pointer reads and decoding into owned values
//! - [`handle`]: single ownership of OS-returned buffers
//! - [`interop`]: the facade that sequences calls, statuses and buffers
//! - [`intermediate`]: staging of a [`Credential`](crate::Credential) for writing
//!
//! No pointer handed out by the OS escapes this module; callers only ever see
//! [`NativeCredential`] copies.

pub mod api;
pub mod error_code;
pub mod handle;
pub mod intermediate;
pub mod interop;
pub mod layout;
pub mod marshal;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(all(windows, feature = "wincred"))]
mod win32;

#[cfg(not(all(windows, feature = "wincred")))]
mod win32_stub;

pub use api::{CredentialApi, NativeResult};
pub use error_code::{Classification, ErrorCode, ErrorTranslator};
pub use handle::CredentialHandle;
pub use intermediate::IntermediateCredential;
pub use interop::{CredentialList, NativeContext, NativeInterop};
pub use layout::{FileTime, RawCredential};
pub use marshal::{read_wide, HeapMarshaler, MarshalService, NativeCredential, OwnedBlock, RawBlock};

#[cfg(feature = "mock")]
pub use mock::{CountingMarshaler, MockCredentialApi};

#[cfg(all(windows, feature = "wincred"))]
pub use win32::Win32CredentialApi;

#[cfg(not(all(windows, feature = "wincred")))]
pub use win32_stub::Win32CredentialApi;

use crate::{factory, Config, Result};
use std::sync::Arc;

fn win32_api(_config: &Config) -> Result<Arc<dyn CredentialApi>> {
    Ok(Arc::new(Win32CredentialApi::new()?))
}

#[cfg(feature = "mock")]
fn mock_api(_config: &Config) -> Result<Arc<dyn CredentialApi>> {
    Ok(Arc::new(MockCredentialApi::new()))
}

/// Registers all compiled APIs with the factory.
///
/// Called by [`crate::init`]; calling it again is harmless.
pub fn register_all() {
    factory::register_api("win32", win32_api);

    #[cfg(feature = "mock")]
    factory::register_api("mock", mock_api);
}
