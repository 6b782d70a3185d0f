// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pairs `attached="true"` BLOB members with received descriptors.

use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use super::{AttachmentId, AttachmentTable};
use crate::error::DispatchError;
use crate::protocol::XmlElement;

/// FIFO of descriptors received alongside the byte stream.
///
/// The server sends one descriptor per attached member, in document order,
/// with the `sendmsg` that carries the document, so a plain queue is enough
/// to pair them up.
#[derive(Debug, Default)]
pub struct BlobCorrelator {
    queue: VecDeque<OwnedFd>,
}

impl BlobCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue descriptors from one transport read.
    pub fn push_fds(&mut self, fds: impl IntoIterator<Item = OwnedFd>) {
        self.queue.extend(fds);
    }

    /// Descriptors not yet claimed by a document.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Close every queued descriptor.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Rewrite every attached member of `doc` to reference a table entry.
    ///
    /// `direct` decides, per (device, property), whether the consumer may map
    /// the payload read-only. When fewer descriptors are queued than the
    /// document needs, nothing is attached, the descriptors popped for this
    /// document are closed, and the document must be rejected.
    pub fn correlate(
        &mut self,
        doc: &mut XmlElement,
        table: &Arc<AttachmentTable>,
        direct: impl Fn(&str, &str) -> bool,
    ) -> Result<CorrelationGuard, DispatchError> {
        let mut guard = CorrelationGuard {
            ids: Vec::new(),
            table: Arc::clone(table),
        };

        let mut expected = 0usize;
        doc.walk(&mut |e| {
            if is_attached(e) {
                expected += 1;
            }
        });
        if expected == 0 {
            return Ok(guard);
        }

        let available = self.queue.len();
        let take = expected.min(available);
        let mut fds: VecDeque<OwnedFd> = self.queue.drain(..take).collect();
        if take < expected {
            log::warn!(
                "[indi-blob] <{}> needs {} descriptors, {} queued",
                doc.tag(),
                expected,
                available
            );
            // Popped descriptors belong to this document; dropping closes them.
            drop(fds);
            return Err(DispatchError::MissingAttachment {
                expected,
                available,
            });
        }

        let is_direct = direct(
            doc.attribute("device").unwrap_or_default(),
            doc.attribute("name").unwrap_or_default(),
        );
        doc.walk_mut(&mut |e| {
            if !is_attached(e) {
                return;
            }
            if let Some(fd) = fds.pop_front() {
                let id = table.insert(fd);
                guard.ids.push(id);
                e.remove_attribute("attached");
                e.remove_attribute("enclen");
                e.set_attribute("attached-data-id", id.to_string());
                if is_direct {
                    e.set_attribute("attachment-direct", "true");
                }
            }
        });
        Ok(guard)
    }
}

fn is_attached(e: &XmlElement) -> bool {
    e.tag() == "oneBLOB" && e.attribute("attached") == Some("true")
}

/// Attachments created for one document.
///
/// Dropping the guard releases them (closing the descriptors); a successful
/// dispatch calls [`commit`](Self::commit) to hand them over to the table's
/// consumers instead.
#[derive(Debug)]
#[must_use = "dropping the guard releases the attachments"]
pub struct CorrelationGuard {
    ids: Vec<AttachmentId>,
    table: Arc<AttachmentTable>,
}

impl CorrelationGuard {
    pub fn ids(&self) -> &[AttachmentId] {
        &self.ids
    }

    /// Keep the attachments in the table.
    pub fn commit(mut self) -> Vec<AttachmentId> {
        std::mem::take(&mut self.ids)
    }
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.table.release(id);
        }
    }
}
