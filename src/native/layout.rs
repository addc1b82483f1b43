//! Fixed-layout records shared with the OS.
//!
//! Field order and sizes follow `CREDENTIALW` from `wincred.h`. The compiler
//! inserts the same alignment padding the C compiler does (after
//! `CredentialBlobSize` on 64-bit targets); the tests pin every offset.

use chrono::{DateTime, TimeZone, Utc};
use std::ffi::c_void;
use std::ptr;

/// `FILETIME`: 100-nanosecond ticks since 1601-01-01 UTC, split in two halves.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTime {
    pub low_date_time: u32,
    pub high_date_time: u32,
}

const TICKS_PER_SECOND: u64 = 10_000_000;
const UNIX_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

impl FileTime {
    /// Joins the two halves into a tick count.
    pub fn ticks(self) -> u64 {
        (u64::from(self.high_date_time) << 32) | u64::from(self.low_date_time)
    }

    /// Splits a tick count into halves.
    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            low_date_time: ticks as u32,
            high_date_time: (ticks >> 32) as u32,
        }
    }

    /// Converts to UTC. Zero maps to the FILETIME epoch.
    pub fn to_datetime(self) -> DateTime<Utc> {
        let ticks = self.ticks();
        let secs = (ticks / TICKS_PER_SECOND) as i64 - UNIX_EPOCH_OFFSET_SECS;
        let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Converts from UTC. Instants before 1601 clamp to zero, instants past
    /// the last representable tick clamp to `u64::MAX`.
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        let secs = value.timestamp() + UNIX_EPOCH_OFFSET_SECS;
        if secs < 0 {
            return Self::default();
        }
        let ticks = (secs as u64)
            .checked_mul(TICKS_PER_SECOND)
            .and_then(|t| t.checked_add(u64::from(value.timestamp_subsec_nanos()) / 100))
            .unwrap_or(u64::MAX);
        Self::from_ticks(ticks)
    }
}

/// `CREDENTIALW` as laid out in memory by the OS.
///
/// Pointers are borrowed views into whichever buffer produced the record;
/// this type owns nothing.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawCredential {
    pub flags: u32,
    pub cred_type: u32,
    pub target_name: *mut u16,
    pub comment: *mut u16,
    pub last_written: FileTime,
    pub credential_blob_size: u32,
    pub credential_blob: *mut u8,
    pub persist: u32,
    pub attribute_count: u32,
    pub attributes: *mut c_void,
    pub target_alias: *mut u16,
    pub user_name: *mut u16,
}

impl Default for RawCredential {
    fn default() -> Self {
        Self {
            flags: 0,
            cred_type: 0,
            target_name: ptr::null_mut(),
            comment: ptr::null_mut(),
            last_written: FileTime::default(),
            credential_blob_size: 0,
            credential_blob: ptr::null_mut(),
            persist: 0,
            attribute_count: 0,
            attributes: ptr::null_mut(),
            target_alias: ptr::null_mut(),
            user_name: ptr::null_mut(),
        }
    }
}
