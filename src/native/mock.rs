//! In-memory credential API for testing.
//!
//! [`MockCredentialApi`] behaves like the OS as far as this crate can tell:
//! it hands out real buffers laid out the way `CredReadW` and
//! `CredEnumerateW` lay them out, tracks each one until `CredFree`, and
//! reports the same status codes for missing targets and bad flags. It also
//! counts calls and supports error injection, so tests can check buffer
//! lifetimes and failure paths without touching the real store.

use super::api::{
    CRED_ENUMERATE_ALL_CREDENTIALS, CRED_MAX_CREDENTIAL_BLOB_SIZE, CRED_PRESERVE_CREDENTIAL_BLOB,
};
use super::{
    CredentialApi, ErrorCode, FileTime, HeapMarshaler, MarshalService, NativeCredential,
    NativeResult, RawBlock, RawCredential,
};
use crate::credential::file_time_of;
use crate::{Credential, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const MAX_TYPE: u32 = 6;
const MAX_PERSIST: u32 = 3;

/// Entry point selector for [`MockCredentialApi::inject_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Delete,
    Enumerate,
    Free,
}

/// Number of calls made to each entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub read: usize,
    pub write: usize,
    pub delete: usize,
    pub enumerate: usize,
    pub free: usize,
}

impl CallCounts {
    /// Sum over all entry points.
    pub fn total(&self) -> usize {
        self.read + self.write + self.delete + self.enumerate + self.free
    }
}

/// A stored record, strings kept as UTF-16 without terminator.
///
/// Fields are public so tests can seed records a well-behaved writer would
/// never produce (unpaired surrogates, out-of-range types).
#[derive(Debug, Clone, Default)]
pub struct MockRecord {
    pub target_name: Vec<u16>,
    pub user_name: Option<Vec<u16>>,
    pub comment: Option<Vec<u16>>,
    pub target_alias: Option<Vec<u16>>,
    pub credential_blob: Vec<u8>,
    pub flags: u32,
    pub cred_type: u32,
    pub persist: u32,
    pub last_written: FileTime,
}

impl MockRecord {
    /// A generic, machine-persisted record with no secret.
    pub fn new(target_name: &str) -> Self {
        Self {
            target_name: target_name.encode_utf16().collect(),
            cred_type: 1,
            persist: 2,
            last_written: FileTime::from_datetime(Utc::now()),
            ..Self::default()
        }
    }

    fn from_credential(credential: &Credential) -> Self {
        Self {
            target_name: credential.id().encode_utf16().collect(),
            user_name: Some(credential.username().encode_utf16().collect()),
            comment: None,
            target_alias: None,
            credential_blob: credential
                .secret()
                .encode_utf16()
                .flat_map(u16::to_le_bytes)
                .collect(),
            flags: credential.characteristics().bits(),
            cred_type: credential.cred_type().code(),
            persist: credential.persistence().code(),
            last_written: file_time_of(credential),
        }
    }

    fn from_native(native: NativeCredential) -> Self {
        let wide = |s: String| s.encode_utf16().collect::<Vec<u16>>();
        Self {
            target_name: wide(native.target_name),
            user_name: native.user_name.map(wide),
            comment: native.comment.map(wide),
            target_alias: native.target_alias.map(wide),
            credential_blob: native.credential_blob.to_vec(),
            flags: native.flags,
            cred_type: native.cred_type,
            persist: native.persist,
            last_written: FileTime::from_datetime(Utc::now()),
        }
    }

    fn key(&self) -> (String, u32) {
        record_key(&self.target_name, self.cred_type)
    }
}

fn record_key(target: &[u16], cred_type: u32) -> (String, u32) {
    (String::from_utf16_lossy(target).to_lowercase(), cred_type)
}

fn terminated(units: &[u16]) -> Vec<u16> {
    units.iter().copied().chain(std::iter::once(0)).collect()
}

fn strip_terminator(units: &[u16]) -> &[u16] {
    let end = units.iter().position(|u| *u == 0).unwrap_or(units.len());
    &units[..end]
}

/// One `CREDENTIALW` with its strings and blob in the same allocation.
#[repr(C)]
struct ReadBuffer {
    raw: RawCredential,
    target_name: Vec<u16>,
    user_name: Option<Vec<u16>>,
    comment: Option<Vec<u16>>,
    target_alias: Option<Vec<u16>>,
    credential_blob: Vec<u8>,
}

impl ReadBuffer {
    fn boxed(record: &MockRecord) -> Box<Self> {
        let mut buffer = Box::new(Self {
            raw: RawCredential::default(),
            target_name: terminated(&record.target_name),
            user_name: record.user_name.as_deref().map(terminated),
            comment: record.comment.as_deref().map(terminated),
            target_alias: record.target_alias.as_deref().map(terminated),
            credential_blob: record.credential_blob.clone(),
        });

        let optional = |s: &mut Option<Vec<u16>>| s.as_mut().map_or(ptr::null_mut(), |v| v.as_mut_ptr());
        let blob = if buffer.credential_blob.is_empty() {
            ptr::null_mut()
        } else {
            buffer.credential_blob.as_mut_ptr()
        };

        buffer.raw = RawCredential {
            flags: record.flags,
            cred_type: record.cred_type,
            target_name: buffer.target_name.as_mut_ptr(),
            comment: optional(&mut buffer.comment),
            last_written: record.last_written,
            credential_blob_size: buffer.credential_blob.len() as u32,
            credential_blob: blob,
            persist: record.persist,
            attribute_count: 0,
            attributes: ptr::null_mut(),
            target_alias: optional(&mut buffer.target_alias),
            user_name: optional(&mut buffer.user_name),
        };
        buffer
    }
}

/// A pointer array plus the records it points at.
struct ArrayBuffer {
    _entries: Vec<Box<ReadBuffer>>,
    pointers: Vec<*mut RawCredential>,
}

enum Allocation {
    Single(*mut ReadBuffer),
    Array(*mut ArrayBuffer),
}

// Allocations are only touched under the state mutex.
unsafe impl Send for Allocation {}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: both variants were produced by Box::into_raw and are
        // dropped exactly once, when removed from the live map.
        unsafe {
            match *self {
                Allocation::Single(buffer) => drop(Box::from_raw(buffer)),
                Allocation::Array(buffer) => drop(Box::from_raw(buffer)),
            }
        }
    }
}

#[derive(Default)]
struct State {
    records: BTreeMap<(String, u32), MockRecord>,
    live: HashMap<usize, Allocation>,
    injected: HashMap<Operation, ErrorCode>,
    calls: CallCounts,
    null_read: bool,
}

impl State {
    fn take_injected(&mut self, operation: Operation) -> NativeResult<()> {
        match self.injected.remove(&operation) {
            Some(code) => {
                tracing::debug!(?operation, code = code.code(), "returning injected error");
                Err(code)
            }
            None => Ok(()),
        }
    }
}

/// In-memory [`CredentialApi`].
///
/// # Example
///
/// ```
/// use credstore::native::mock::MockCredentialApi;
/// use credstore::native::{api::to_wide, CredentialApi, ErrorCode};
///
/// let api = MockCredentialApi::new();
/// let missing = api.cred_read(&to_wide("svc@host"), 1, 0);
/// assert_eq!(missing.unwrap_err(), ErrorCode::NotFound);
/// assert_eq!(api.calls().read, 1);
/// ```
#[derive(Default)]
pub struct MockCredentialApi {
    state: Mutex<State>,
}

impl MockCredentialApi {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `credential` directly, bypassing the call counters.
    pub fn seed(&self, credential: &Credential) {
        self.seed_record(MockRecord::from_credential(credential));
    }

    /// Stores an arbitrary record.
    pub fn seed_record(&self, record: MockRecord) {
        self.state().records.insert(record.key(), record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the stored record for `target`, if any.
    pub fn record(&self, target: &str, cred_type: u32) -> Option<MockRecord> {
        let target: Vec<u16> = target.encode_utf16().collect();
        self.state()
            .records
            .get(&record_key(&target, cred_type))
            .cloned()
    }

    /// Call counters so far.
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Buffers handed out and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.state().live.len()
    }

    /// Makes the next call to `operation` fail with `code`.
    pub fn inject_error(&self, operation: Operation, code: ErrorCode) {
        self.state().injected.insert(operation, code);
    }

    /// When set, successful reads return a null buffer.
    pub fn set_null_read(&self, enabled: bool) {
        self.state().null_read = enabled;
    }
}

impl CredentialApi for MockCredentialApi {
    fn name(&self) -> &str {
        "mock"
    }

    fn cred_read(
        &self,
        target: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> NativeResult<*mut RawCredential> {
        let mut state = self.state();
        state.calls.read += 1;
        state.take_injected(Operation::Read)?;

        if flags != 0 {
            return Err(ErrorCode::InvalidFlags);
        }
        if cred_type == 0 || cred_type > MAX_TYPE {
            return Err(ErrorCode::InvalidArgument);
        }

        let key = record_key(strip_terminator(target), cred_type);
        let record = state.records.get(&key).ok_or(ErrorCode::NotFound)?;
        if state.null_read {
            return Ok(ptr::null_mut());
        }

        let buffer = Box::into_raw(ReadBuffer::boxed(record));
        state.live.insert(buffer as usize, Allocation::Single(buffer));
        Ok(buffer.cast())
    }

    unsafe fn cred_write(&self, credential: *const RawCredential, flags: u32) -> NativeResult<()> {
        let mut state = self.state();
        state.calls.write += 1;
        state.take_injected(Operation::Write)?;

        if credential.is_null() {
            return Err(ErrorCode::InvalidArgument);
        }
        if flags & !CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
            return Err(ErrorCode::InvalidFlags);
        }

        let raw = ptr::read_unaligned(credential);
        if raw.cred_type == 0 || raw.cred_type > MAX_TYPE {
            return Err(ErrorCode::InvalidArgument);
        }
        if raw.persist == 0 || raw.persist > MAX_PERSIST {
            return Err(ErrorCode::InvalidArgument);
        }
        if raw.credential_blob_size as usize > CRED_MAX_CREDENTIAL_BLOB_SIZE {
            return Err(ErrorCode::InvalidArgument);
        }

        let native = NativeCredential::from_raw(&raw).map_err(|_| ErrorCode::InvalidArgument)?;
        if native.target_name.is_empty() {
            return Err(ErrorCode::InvalidArgument);
        }

        let mut record = MockRecord::from_native(native);
        let key = record.key();
        if flags & CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
            let existing = state.records.get(&key).ok_or(ErrorCode::NotFound)?;
            record.credential_blob = existing.credential_blob.clone();
        }
        state.records.insert(key, record);
        Ok(())
    }

    fn cred_delete(&self, target: &[u16], cred_type: u32, flags: u32) -> NativeResult<()> {
        let mut state = self.state();
        state.calls.delete += 1;
        state.take_injected(Operation::Delete)?;

        if flags != 0 {
            return Err(ErrorCode::InvalidFlags);
        }
        if cred_type == 0 || cred_type > MAX_TYPE {
            return Err(ErrorCode::InvalidArgument);
        }

        let key = record_key(strip_terminator(target), cred_type);
        state
            .records
            .remove(&key)
            .map(|_| ())
            .ok_or(ErrorCode::NotFound)
    }

    fn cred_enumerate(
        &self,
        filter: Option<&[u16]>,
        flags: u32,
    ) -> NativeResult<(u32, *mut *mut RawCredential)> {
        let mut state = self.state();
        state.calls.enumerate += 1;
        state.take_injected(Operation::Enumerate)?;

        if flags & !CRED_ENUMERATE_ALL_CREDENTIALS != 0 {
            return Err(ErrorCode::InvalidFlags);
        }
        if filter.is_some() && flags & CRED_ENUMERATE_ALL_CREDENTIALS != 0 {
            return Err(ErrorCode::InvalidFlags);
        }

        let pattern = filter.map(|f| String::from_utf16_lossy(strip_terminator(f)).to_lowercase());
        let matches = |target: &str| match pattern.as_deref() {
            None => true,
            Some(p) => match p.strip_suffix('*') {
                Some(prefix) => target.starts_with(prefix),
                None => target == p,
            },
        };

        let mut entries: Vec<Box<ReadBuffer>> = state
            .records
            .iter()
            .filter(|((target, _), _)| matches(target))
            .map(|(_, record)| ReadBuffer::boxed(record))
            .collect();
        if entries.is_empty() {
            return Err(ErrorCode::NotFound);
        }

        let pointers: Vec<*mut RawCredential> = entries
            .iter_mut()
            .map(|entry| ptr::addr_of_mut!(entry.raw))
            .collect();
        let count = pointers.len() as u32;
        let array = Box::into_raw(Box::new(ArrayBuffer {
            _entries: entries,
            pointers,
        }));

        // SAFETY: `array` was just leaked and is owned by the live map below.
        let base = unsafe { (*array).pointers.as_mut_ptr() };
        state.live.insert(base as usize, Allocation::Array(array));
        Ok((count, base))
    }

    unsafe fn cred_free(&self, buffer: *mut c_void) -> NativeResult<()> {
        let mut state = self.state();
        state.calls.free += 1;
        state.take_injected(Operation::Free)?;

        match state.live.remove(&(buffer as usize)) {
            Some(allocation) => {
                drop(allocation);
                Ok(())
            }
            None => {
                tracing::error!(address = buffer as usize, "free of unknown or already freed buffer");
                Err(ErrorCode::InvalidArgument)
            }
        }
    }
}

impl std::fmt::Debug for MockCredentialApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MockCredentialApi")
            .field("records", &state.records.len())
            .field("live", &state.live.len())
            .field("calls", &state.calls)
            .finish()
    }
}

/// [`HeapMarshaler`] that counts allocations and frees.
#[derive(Debug, Default)]
pub struct CountingMarshaler {
    inner: HeapMarshaler,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl CountingMarshaler {
    /// Creates a marshaler with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Frees so far.
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.allocations() - self.frees()
    }
}

impl MarshalService for CountingMarshaler {
    fn alloc(&self, size: usize) -> Result<RawBlock> {
        let block = self.inner.alloc(size)?;
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(block)
    }

    fn free(&self, block: RawBlock) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.inner.free(block);
    }
}
