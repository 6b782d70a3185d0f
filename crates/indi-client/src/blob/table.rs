// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Attachment table: id → received descriptor.

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::AttachmentId;

/// Descriptors waiting to be claimed by the application.
///
/// Shared (behind an `Arc`) between the receive thread, which inserts, and
/// API callers on any thread, which take or release. Guarded by its own lock,
/// never the registry lock.
#[derive(Debug, Default)]
pub struct AttachmentTable {
    entries: Mutex<HashMap<AttachmentId, OwnedFd>>,
    next_id: AtomicU64,
}

impl AttachmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under a fresh id.
    pub fn insert(&self, fd: OwnedFd) -> AttachmentId {
        let id = AttachmentId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.lock().insert(id, fd);
        id
    }

    /// Transfer ownership of the descriptor to the caller.
    pub fn take(&self, id: AttachmentId) -> Option<OwnedFd> {
        self.entries.lock().remove(&id)
    }

    /// Close the descriptor if still present.
    pub fn release(&self, id: AttachmentId) -> bool {
        let fd = self.entries.lock().remove(&id);
        // Close outside the lock.
        fd.is_some()
    }

    /// Close every pending descriptor.
    pub fn clear(&self) -> usize {
        let drained: Vec<OwnedFd> = self.entries.lock().drain().map(|(_, fd)| fd).collect();
        if !drained.is_empty() {
            log::debug!("[indi-blob] closing {} unclaimed attachments", drained.len());
        }
        drained.len()
    }

    pub fn contains(&self, id: AttachmentId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    /// A descriptor plus a witness telling whether it has been closed.
    pub(crate) fn witness_fd() -> (OwnedFd, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        (OwnedFd::from(a), b)
    }

    /// True once the peer of `witness` has been closed.
    pub(crate) fn is_closed(witness: &mut UnixStream) -> bool {
        witness.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 1];
        matches!(witness.read(&mut buf), Ok(0))
    }

    #[test]
    fn test_ids_are_unique() {
        let table = AttachmentTable::new();
        let (a, _pa) = witness_fd();
        let (b, _pb) = witness_fd();
        let ia = table.insert(a);
        let ib = table.insert(b);
        assert_ne!(ia, ib);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_take_transfers_ownership() {
        let table = AttachmentTable::new();
        let (fd, mut witness) = witness_fd();
        let id = table.insert(fd);

        let taken = table.take(id).unwrap();
        assert!(!table.contains(id));
        assert!(table.take(id).is_none());
        assert!(!is_closed(&mut witness));

        drop(taken);
        assert!(is_closed(&mut witness));
    }

    #[test]
    fn test_release_and_clear_close() {
        let table = AttachmentTable::new();
        let (a, mut pa) = witness_fd();
        let (b, mut pb) = witness_fd();
        let ia = table.insert(a);
        table.insert(b);

        assert!(table.release(ia));
        assert!(!table.release(ia));
        assert!(is_closed(&mut pa));
        assert!(!is_closed(&mut pb));

        assert_eq!(table.clear(), 1);
        assert!(is_closed(&mut pb));
        assert!(table.is_empty());
    }
}
