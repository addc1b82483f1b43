//! Orchestration of native calls.
//!
//! Each operation issues one foreign call, classifies its status, takes
//! ownership of any returned buffer, decodes it, and then returns a value,
//! returns "absent", or raises [`CredStoreError::NativeFailure`].

use super::api::{to_wide, CredentialApi};
use super::{
    Classification, CredentialHandle, ErrorCode, ErrorTranslator, MarshalService,
    NativeCredential, OwnedBlock, RawCredential,
};
use crate::{CredStoreError, Result};
use std::ffi::c_void;
use std::fmt;
use std::iter::FusedIterator;
use std::mem::size_of;
use std::sync::Arc;

/// Collaborators shared by the facade, its handles and its sequences.
pub struct NativeContext {
    pub api: Arc<dyn CredentialApi>,
    pub marshaler: Arc<dyn MarshalService>,
    pub translator: ErrorTranslator,
}

impl NativeContext {
    /// Bundles `api` and `marshaler` with the default translator.
    pub fn new(api: Arc<dyn CredentialApi>, marshaler: Arc<dyn MarshalService>) -> Self {
        Self {
            api,
            marshaler,
            translator: ErrorTranslator::new(),
        }
    }
}

/// Native interop facade.
#[derive(Clone)]
pub struct NativeInterop {
    context: Arc<NativeContext>,
}

impl NativeInterop {
    /// Creates a facade over `context`.
    pub fn new(context: Arc<NativeContext>) -> Self {
        Self { context }
    }

    /// Shared collaborators.
    pub fn context(&self) -> &Arc<NativeContext> {
        &self.context
    }

    /// Reads one credential. Not found is `Ok(None)`.
    pub fn read(&self, target: &str, cred_type: u32, reserved: u32) -> Result<Option<NativeCredential>> {
        let target = to_wide(target);
        match self.context.api.cred_read(&target, cred_type, reserved) {
            Ok(buffer) if buffer.is_null() => {
                tracing::warn!(
                    operation = "read",
                    "null credential pointer returned on success, treating as absent"
                );
                Ok(None)
            }
            Ok(buffer) => {
                // SAFETY: CredReadW succeeded, so the caller owns `buffer`.
                let handle =
                    unsafe { CredentialHandle::new(buffer.cast::<c_void>(), self.context.clone()) };
                let value = handle.decoded_value();
                if let Err(ref e) = value {
                    tracing::error!(operation = "read", "unable to decode credential: {}", e);
                }
                value
            }
            Err(code) => self.absent_or_fail("read", code),
        }
    }

    /// Writes `credential` with `flags`.
    ///
    /// The record is copied into a scratch block that is freed on every
    /// exit path before any error is surfaced.
    pub fn write(&self, credential: &RawCredential, flags: u32) -> Result<()> {
        let envelope = OwnedBlock::encode(&*self.context.marshaler, credential)?;

        // SAFETY: the envelope holds a copy of `credential`, whose pointers
        // the caller keeps alive for this call.
        let status = unsafe {
            self.context
                .api
                .cred_write(envelope.as_ptr().cast::<RawCredential>(), flags)
        };
        drop(envelope);

        match status {
            Ok(()) => Ok(()),
            Err(code) => self.absent_or_fail("write", code).map(|_: Option<()>| ()),
        }
    }

    /// Deletes a credential. Deleting a missing target succeeds.
    pub fn delete(&self, target: &str, cred_type: u32, flags: u32) -> Result<()> {
        let target = to_wide(target);
        match self.context.api.cred_delete(&target, cred_type, flags) {
            Ok(()) => Ok(()),
            Err(code) => self.absent_or_fail("delete", code).map(|_: Option<()>| ()),
        }
    }

    /// Enumerates credentials matching `filter`.
    ///
    /// The returned sequence owns the OS buffer and frees it once it is
    /// exhausted or dropped.
    pub fn enumerate(&self, filter: Option<&str>, flags: u32) -> Result<CredentialList> {
        let filter = filter.map(to_wide);
        match self.context.api.cred_enumerate(filter.as_deref(), flags) {
            Ok((count, buffer)) => {
                if buffer.is_null() && count > 0 {
                    tracing::warn!(
                        operation = "enumerate",
                        count,
                        "null credential array returned on success, treating as empty"
                    );
                }
                // SAFETY: CredEnumerateW succeeded, so the caller owns `buffer`.
                let handle =
                    unsafe { CredentialHandle::new(buffer.cast::<c_void>(), self.context.clone()) };
                Ok(CredentialList::new(handle, count as usize))
            }
            Err(code) => Ok(self
                .absent_or_fail("enumerate", code)?
                .unwrap_or_else(CredentialList::empty)),
        }
    }

    fn absent_or_fail<T>(&self, operation: &'static str, code: ErrorCode) -> Result<Option<T>> {
        let translator = &self.context.translator;
        match translator.classify(code) {
            Classification::Ignorable => {
                tracing::debug!(operation, "target not found");
                Ok(None)
            }
            Classification::Success => {
                tracing::warn!(operation, "native call failed without reporting an error");
                Ok(None)
            }
            Classification::Fatal => {
                let message = translator.message_for(code);
                tracing::error!(operation, code = code.code(), "{}", message);
                Err(CredStoreError::native(operation, code, message))
            }
        }
    }
}

impl fmt::Debug for NativeInterop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeInterop")
            .field("api", &self.context.api.name())
            .finish()
    }
}

/// Lazy, single-pass sequence over an enumerated credential array.
///
/// Element `i` is read from `base + i * size_of::<*mut CREDENTIALW>()` and
/// decoded into an owned value. The backing buffer is freed as soon as the
/// sequence is exhausted, stops on a decode failure, or is dropped early.
pub struct CredentialList {
    handle: Option<CredentialHandle>,
    count: usize,
    index: usize,
}

impl CredentialList {
    fn new(handle: CredentialHandle, count: usize) -> Self {
        let count = if handle.is_valid() { count } else { 0 };
        Self {
            handle: Some(handle),
            count,
            index: 0,
        }
    }

    fn empty() -> Self {
        Self {
            handle: None,
            count: 0,
            index: 0,
        }
    }

    /// Number of elements the OS reported.
    pub fn reported_count(&self) -> usize {
        self.count
    }

    /// Frees the backing buffer and ends the sequence.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        self.index = self.count;
    }

    fn decode_at(handle: &CredentialHandle, index: usize) -> Result<Option<NativeCredential>> {
        let context = handle.context();
        let base = handle.as_ptr().cast::<*mut RawCredential>();
        // SAFETY: index < count and the array holds `count` pointer slots,
        // each `size_of::<*mut RawCredential>()` bytes apart.
        unsafe {
            let slot = base.cast::<u8>().add(index * size_of::<*mut RawCredential>());
            let element = context.marshaler.read_pointer(slot.cast());
            context.marshaler.decode(element)
        }
    }
}

impl Iterator for CredentialList {
    type Item = NativeCredential;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            self.close();
            return None;
        }
        let handle = self.handle.as_ref()?;

        let index = self.index;
        match Self::decode_at(handle, index) {
            Ok(Some(value)) => {
                self.index += 1;
                if self.index == self.count {
                    self.close();
                }
                Some(value)
            }
            Ok(None) => {
                tracing::error!(operation = "enumerate", index, "null credential pointer in array");
                self.close();
                None
            }
            Err(e) => {
                tracing::error!(operation = "enumerate", index, "unable to decode credential: {}", e);
                self.close();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.count - self.index))
    }
}

impl FusedIterator for CredentialList {}

impl Drop for CredentialList {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CredentialList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialList")
            .field("count", &self.count)
            .field("index", &self.index)
            .field("open", &self.handle.is_some())
            .finish()
    }
}
