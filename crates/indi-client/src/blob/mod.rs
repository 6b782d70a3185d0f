// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary payload handling.
//!
//! # Inline vs attached
//!
//! Over TCP every BLOB travels inline as base64 text. Over the server's local
//! UNIX socket the payload can instead be passed as a file descriptor in the
//! ancillary data of the same `sendmsg` that carries the XML, with the
//! element marked `attached="true"`:
//!
//! ```text
//!   recvmsg ──► bytes ──► StreamParser ──► document ─┐
//!          └──► fds ───► BlobCorrelator (FIFO) ──────┴─► rewrite attached-data-id
//!                                                       │
//!                          AttachmentTable ◄────────────┘  (id → fd)
//!                               │
//!                    Client::attach_blob(id) ──► BlobBuffer (mmap)
//! ```
//!
//! Every descriptor is held by an [`OwnedFd`](std::os::fd::OwnedFd) from the
//! moment it leaves `recvmsg`, so it is closed exactly once whichever path it
//! takes.

mod correlator;
mod mapped;
pub(crate) mod table;

pub use correlator::{BlobCorrelator, CorrelationGuard};
pub use mapped::BlobBuffer;
pub use table::AttachmentTable;

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use base64::Engine;

use crate::error::DispatchError;
use crate::property::{BlobData, BlobValue};
use crate::protocol::XmlElement;

/// Upper bound on the buffer reserved for a zlib payload, as a multiple of
/// its compressed length.
const MAX_INFLATE_RATIO: usize = 64;

/// Opaque handle for an out-of-band payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(u64);

impl AttachmentId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttachmentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Decode one `oneBLOB` member of a `setBLOBVector`.
///
/// Returns `Ok(None)` for a zero-size member, which only announces a state
/// change and leaves the stored payload alone.
pub(crate) fn decode_member(member: &XmlElement) -> Result<Option<BlobValue>, DispatchError> {
    let name = member.attribute("name").unwrap_or_default();
    let (Some(format), Some(size)) = (member.attribute("format"), member.attribute("size")) else {
        return Err(DispatchError::Invalid(format!(
            "oneBLOB {} missing format or size",
            name
        )));
    };
    let size: usize = size
        .trim()
        .parse()
        .map_err(|_| DispatchError::Invalid(format!("oneBLOB {} has bad size '{}'", name, size)))?;
    if size == 0 {
        return Ok(None);
    }

    if let Some(id) = member.attribute("attached-data-id") {
        let id = id
            .parse()
            .map_err(|_| DispatchError::Invalid(format!("oneBLOB {} has bad attachment id", name)))?;
        let direct = member.attribute("attachment-direct") == Some("true");
        return Ok(Some(BlobValue {
            format: format.to_string(),
            size,
            data: BlobData::Attached { id, direct },
        }));
    }
    if member.attribute("attached") == Some("true") {
        return Err(DispatchError::Invalid(format!(
            "oneBLOB {} attached without a descriptor",
            name
        )));
    }

    let encoded: Vec<u8> = member
        .text()
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&encoded)
        .map_err(|e| DispatchError::Invalid(format!("oneBLOB {} bad base64: {}", name, e)))?;

    let (format, data) = match format.strip_suffix(".z") {
        Some(plain) => {
            // `size` is untrusted.
            let reserve = size.min(decoded.len().saturating_mul(MAX_INFLATE_RATIO));
            let mut inflated = Vec::with_capacity(reserve);
            flate2::read::ZlibDecoder::new(decoded.as_slice())
                .read_to_end(&mut inflated)
                .map_err(|e| DispatchError::Invalid(format!("oneBLOB {} inflate: {}", name, e)))?;
            (plain.to_string(), inflated)
        }
        None => (format.to_string(), decoded),
    };
    if data.len() != size {
        log::debug!(
            "[indi-blob] {} declared {} bytes, decoded {}",
            name,
            size,
            data.len()
        );
    }

    Ok(Some(BlobValue {
        format,
        size: data.len(),
        data: BlobData::Inline(data),
    }))
}
