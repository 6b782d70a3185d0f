// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Access to out-of-band BLOB payloads.

use std::io;
use std::ops::Deref;
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr;

/// Payload redeemed from the attachment table.
///
/// Either a read-only shared mapping of the received descriptor (zero copy)
/// or a private copy of it. The descriptor is closed when the buffer drops.
#[derive(Debug)]
pub struct BlobBuffer {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Mapped(Mapping),
    Owned(Vec<u8>),
}

#[derive(Debug)]
struct Mapping {
    ptr: *mut libc::c_void,
    len: usize,
    _fd: OwnedFd,
}

// SAFETY: the mapping is read-only and owned exclusively by this value; the
// bytes are never mutated through it, so sharing references across threads
// is sound.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        // SAFETY: the mapping covers exactly `len` readable bytes and lives
        // as long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY:
        // - ptr and len come from a successful mmap in `map_readonly`
        // - the region is unmapped exactly once, here
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

fn map_readonly(fd: &OwnedFd, len: usize) -> io::Result<*mut libc::c_void> {
    // SAFETY:
    // - First argument is null, letting the kernel choose the address
    // - len is non-zero (checked by callers)
    // - PROT_READ with MAP_SHARED maps the sender's pages without copying
    // - fd is a valid open descriptor borrowed from OwnedFd
    // - mmap returns MAP_FAILED on error (checked below)
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr)
}

impl BlobBuffer {
    /// Map `len` bytes of `fd`.
    ///
    /// With `direct` the mapping itself is returned; otherwise the bytes are
    /// copied out and the mapping and descriptor are released immediately.
    pub fn from_fd(fd: OwnedFd, len: usize, direct: bool) -> io::Result<Self> {
        if len == 0 {
            return Ok(Self::from_vec(Vec::new()));
        }
        let ptr = map_readonly(&fd, len)?;
        let mapping = Mapping { ptr, len, _fd: fd };
        if direct {
            return Ok(Self {
                inner: Inner::Mapped(mapping),
            });
        }
        let copy = mapping.bytes().to_vec();
        drop(mapping);
        Ok(Self::from_vec(copy))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            inner: Inner::Owned(data),
        }
    }

    /// True when the bytes are the sender's pages rather than a copy.
    pub fn is_mapped(&self) -> bool {
        matches!(self.inner, Inner::Mapped(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            Inner::Mapped(m) => m.bytes(),
            Inner::Owned(v) => v,
        }
    }

    /// Copy into an owned vector.
    pub fn into_vec(self) -> Vec<u8> {
        match self.inner {
            Inner::Owned(v) => v,
            Inner::Mapped(m) => m.bytes().to_vec(),
        }
    }
}

impl Deref for BlobBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for BlobBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
