//! Ownership of OS-allocated credential buffers.

use super::{NativeContext, NativeCredential, RawCredential};
use crate::Result;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Sole owner of one buffer returned by the credential API.
///
/// The buffer is freed through `CredFree` exactly once: on [`release`] or on
/// drop, whichever comes first. A null or `-1` address yields a handle that is
/// already released. If the free call fails the handle still counts as
/// released and the failure is logged; it is never propagated out of `Drop`.
///
/// [`release`]: CredentialHandle::release
pub struct CredentialHandle {
    buffer: Option<NonNull<c_void>>,
    context: Arc<NativeContext>,
}

impl CredentialHandle {
    /// Takes ownership of `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must be null, `-1`, or a live allocation from
    /// `context.api` that nothing else will free.
    pub unsafe fn new(buffer: *mut c_void, context: Arc<NativeContext>) -> Self {
        let buffer = if buffer as usize == usize::MAX {
            None
        } else {
            NonNull::new(buffer)
        };
        Self { buffer, context }
    }

    /// True until the buffer has been released.
    pub fn is_valid(&self) -> bool {
        self.buffer.is_some()
    }

    /// Borrowed view of the owned address; null once released.
    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.buffer.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    pub(crate) fn context(&self) -> &Arc<NativeContext> {
        &self.context
    }

    /// Decodes the buffer as a single credential record.
    ///
    /// Returns `None` once released. The result is an owned copy and stays
    /// valid after the handle is gone.
    pub fn decoded_value(&self) -> Result<Option<NativeCredential>> {
        match self.buffer {
            // SAFETY: the buffer is live and came from CredReadW, which
            // returns one self-contained CREDENTIALW block.
            Some(buffer) => unsafe {
                self.context
                    .marshaler
                    .decode(buffer.as_ptr().cast::<RawCredential>())
            },
            None => Ok(None),
        }
    }

    /// Frees the buffer. Subsequent calls do nothing.
    pub fn release(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };

        // SAFETY: ownership was transferred in `new` and `take` guarantees
        // this is the only free for the address.
        if let Err(code) = unsafe { self.context.api.cred_free(buffer.as_ptr()) } {
            tracing::error!(
                operation = "release",
                code = code.code(),
                "{}",
                self.context.translator.message_for(code)
            );
        }
    }
}

impl Drop for CredentialHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("valid", &self.is_valid())
            .field("api", &self.context.api.name())
            .finish()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::native::mock::MockCredentialApi;
    use crate::native::{api::to_wide, CredentialApi, ErrorCode, HeapMarshaler};
    use crate::{Credential, CredentialType};

    fn seeded() -> (Arc<MockCredentialApi>, Arc<NativeContext>) {
        let api = Arc::new(MockCredentialApi::new());
        api.seed(
            &Credential::builder("svc@host")
                .with_username("u1")
                .with_secret("p1")
                .build()
                .unwrap(),
        );
        let context = Arc::new(NativeContext::new(api.clone(), Arc::new(HeapMarshaler::new())));
        (api, context)
    }

    fn read(api: &MockCredentialApi) -> *mut c_void {
        api.cred_read(&to_wide("svc@host"), CredentialType::Generic.code(), 0)
            .unwrap()
            .cast()
    }

    #[test]
    fn test_release_frees_exactly_once() {
        let (api, context) = seeded();
        let mut handle = unsafe { CredentialHandle::new(read(&api), context) };
        assert!(handle.is_valid());

        handle.release();
        handle.release();
        assert!(!handle.is_valid());
        drop(handle);

        assert_eq!(api.calls().free, 1);
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_drop_frees() {
        let (api, context) = seeded();
        {
            let _handle = unsafe { CredentialHandle::new(read(&api), context) };
            assert_eq!(api.live_buffers(), 1);
        }
        assert_eq!(api.calls().free, 1);
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_decoded_value_outlives_handle() {
        let (api, context) = seeded();
        let handle = unsafe { CredentialHandle::new(read(&api), context) };
        let value = handle.decoded_value().unwrap().unwrap();
        drop(handle);

        assert_eq!(value.target_name, "svc@host");
        assert_eq!(value.user_name.as_deref(), Some("u1"));
    }

    #[test]
    fn test_decoded_value_after_release_is_none() {
        let (api, context) = seeded();
        let mut handle = unsafe { CredentialHandle::new(read(&api), context) };
        handle.release();
        assert!(handle.decoded_value().unwrap().is_none());
    }

    #[test]
    fn test_invalid_addresses_are_released_up_front() {
        let (api, context) = seeded();
        let null = unsafe { CredentialHandle::new(std::ptr::null_mut(), context.clone()) };
        let sentinel = unsafe { CredentialHandle::new(usize::MAX as *mut c_void, context) };
        assert!(!null.is_valid());
        assert!(!sentinel.is_valid());
        drop(null);
        drop(sentinel);
        assert_eq!(api.calls().free, 0);
    }

    #[test]
    fn test_failed_free_is_not_retried() {
        let (api, context) = seeded();
        let buffer = read(&api);
        api.inject_error(crate::native::mock::Operation::Free, ErrorCode::InvalidArgument);

        let mut handle = unsafe { CredentialHandle::new(buffer, context) };
        handle.release();
        assert!(!handle.is_valid());
        drop(handle);

        assert_eq!(api.calls().free, 1);
    }
}
