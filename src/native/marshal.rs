//! Marshaling between OS buffers and owned Rust values.

use super::api::CRED_MAX_TARGET_NAME_LENGTH;
use super::{FileTime, RawCredential};
use crate::{CredStoreError, Result};
use std::alloc::{self, Layout};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use zeroize::Zeroizing;

const BLOCK_ALIGN: usize = if align_of::<RawCredential>() > align_of::<u64>() {
    align_of::<RawCredential>()
} else {
    align_of::<u64>()
};

/// A block of unmanaged memory handed out by a [`MarshalService`].
///
/// Not `Clone`: the only way to give it back is by value, so a block can be
/// freed at most once.
#[derive(Debug)]
pub struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawBlock {
    /// Address of the first byte.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; zero-sized blocks are never allocated.
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }
}

/// Primitive unmanaged-memory operations.
///
/// `alloc` and `free` are the only required methods; swapping them lets
/// tests count every allocation the crate performs.
pub trait MarshalService: Send + Sync {
    /// Allocates `size` zeroed bytes.
    fn alloc(&self, size: usize) -> Result<RawBlock>;

    /// Returns `block` to the allocator.
    fn free(&self, block: RawBlock);

    /// Reads one pointer-sized slot.
    ///
    /// # Safety
    ///
    /// `address` must be valid for a pointer-sized read.
    unsafe fn read_pointer(&self, address: *const *mut RawCredential) -> *mut RawCredential {
        ptr::read_unaligned(address)
    }

    /// Decodes the record at `address` into an owned value without taking
    /// ownership of the buffer. A null address decodes to `None`.
    ///
    /// # Safety
    ///
    /// A non-null `address` must point to a readable `CREDENTIALW` whose
    /// string and blob pointers are valid.
    unsafe fn decode(&self, address: *const RawCredential) -> Result<Option<NativeCredential>> {
        if address.is_null() {
            return Ok(None);
        }
        let raw = ptr::read_unaligned(address);
        NativeCredential::from_raw(&raw).map(Some)
    }
}

/// Heap-backed [`MarshalService`] using the global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapMarshaler;

impl HeapMarshaler {
    /// Creates a heap marshaler.
    pub fn new() -> Self {
        Self
    }
}

impl MarshalService for HeapMarshaler {
    fn alloc(&self, size: usize) -> Result<RawBlock> {
        if size == 0 {
            return Err(CredStoreError::InvalidUsage(
                "cannot allocate an empty block".to_string(),
            ));
        }
        let layout = Layout::from_size_align(size, BLOCK_ALIGN)
            .map_err(|e| CredStoreError::Other(anyhow::anyhow!("invalid block layout: {}", e)))?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            CredStoreError::Other(anyhow::anyhow!("allocation of {} bytes failed", size))
        })?;
        Ok(RawBlock { ptr, layout })
    }

    fn free(&self, block: RawBlock) {
        // SAFETY: block was produced by alloc_zeroed with this exact layout and
        // is consumed here, so it cannot be released twice.
        unsafe { alloc::dealloc(block.ptr.as_ptr(), block.layout) }
    }
}

/// A [`RawBlock`] that returns itself to its marshaler when dropped.
pub struct OwnedBlock<'a> {
    block: Option<RawBlock>,
    marshaler: &'a dyn MarshalService,
}

impl<'a> OwnedBlock<'a> {
    /// Allocates `size` bytes from `marshaler`.
    pub fn new(marshaler: &'a dyn MarshalService, size: usize) -> Result<Self> {
        let block = marshaler.alloc(size)?;
        Ok(Self {
            block: Some(block),
            marshaler,
        })
    }

    /// Allocates a block sized for `credential` and copies it in.
    pub fn encode(marshaler: &'a dyn MarshalService, credential: &RawCredential) -> Result<Self> {
        let block = Self::new(marshaler, size_of::<RawCredential>())?;
        // SAFETY: the block is at least size_of::<RawCredential>() bytes and
        // BLOCK_ALIGN satisfies its alignment.
        unsafe { ptr::write(block.as_ptr().cast::<RawCredential>(), *credential) };
        Ok(block)
    }

    /// Address of the block.
    pub fn as_ptr(&self) -> *mut u8 {
        self.block
            .as_ref()
            .map_or(ptr::null_mut(), RawBlock::as_ptr)
    }

    /// Size of the block in bytes.
    pub fn len(&self) -> usize {
        self.block.as_ref().map_or(0, RawBlock::len)
    }

    /// True once the block has been released.
    pub fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Mutable view of the block's bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.block.as_mut() {
            // SAFETY: the block is live and exclusively borrowed.
            Some(block) => unsafe { std::slice::from_raw_parts_mut(block.as_ptr(), block.len()) },
            None => &mut [],
        }
    }
}

impl Drop for OwnedBlock<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.marshaler.free(block);
        }
    }
}

impl fmt::Debug for OwnedBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBlock").field("len", &self.len()).finish()
    }
}

/// Owned snapshot of a `CREDENTIALW` record.
///
/// Every string and the secret blob are copied out, so the value remains
/// usable after the OS buffer has been freed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NativeCredential {
    pub flags: u32,
    pub cred_type: u32,
    pub target_name: String,
    pub comment: Option<String>,
    pub last_written: FileTime,
    pub credential_blob: Zeroizing<Vec<u8>>,
    pub persist: u32,
    pub attribute_count: u32,
    pub target_alias: Option<String>,
    pub user_name: Option<String>,
}

impl NativeCredential {
    /// Copies the record and everything it points at.
    ///
    /// # Safety
    ///
    /// All non-null pointers in `raw` must be valid: strings NUL-terminated,
    /// the blob readable for `credential_blob_size` bytes.
    pub unsafe fn from_raw(raw: &RawCredential) -> Result<Self> {
        let target_name = read_wide(raw.target_name)?.unwrap_or_default();
        let comment = read_wide(raw.comment)?;
        let target_alias = read_wide(raw.target_alias)?;
        let user_name = read_wide(raw.user_name)?;

        let credential_blob = if raw.credential_blob.is_null() || raw.credential_blob_size == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(raw.credential_blob, raw.credential_blob_size as usize)
                .to_vec()
        };

        Ok(Self {
            flags: raw.flags,
            cred_type: raw.cred_type,
            target_name,
            comment,
            last_written: raw.last_written,
            credential_blob: Zeroizing::new(credential_blob),
            persist: raw.persist,
            attribute_count: raw.attribute_count,
            target_alias,
            user_name,
        })
    }
}

impl fmt::Debug for NativeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCredential")
            .field("flags", &self.flags)
            .field("cred_type", &self.cred_type)
            .field("target_name", &self.target_name)
            .field("comment", &self.comment)
            .field("last_written", &self.last_written)
            .field("credential_blob", &format_args!("<{} bytes>", self.credential_blob.len()))
            .field("persist", &self.persist)
            .field("attribute_count", &self.attribute_count)
            .field("target_alias", &self.target_alias)
            .field("user_name", &self.user_name)
            .finish()
    }
}

/// Reads a NUL-terminated UTF-16 string. Null decodes to `None`.
///
/// # Safety
///
/// A non-null `ptr` must be readable up to and including its terminator.
pub unsafe fn read_wide(ptr: *const u16) -> Result<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }

    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
        if len > CRED_MAX_TARGET_NAME_LENGTH {
            return Err(CredStoreError::Decode(format!(
                "string exceeds {} UTF-16 units without a terminator",
                CRED_MAX_TARGET_NAME_LENGTH
            )));
        }
    }

    let units = std::slice::from_raw_parts(ptr, len);
    String::from_utf16(units)
        .map(Some)
        .map_err(|e| CredStoreError::Decode(e.to_string()))
}
