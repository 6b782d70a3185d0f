// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the INDI client engine.
//!
//! Three layers report failures:
//!
//! - [`XmlError`]: framing failures from the stream parser. Unrecoverable for
//!   the connection that produced them.
//! - [`DispatchError`]: per-document failures from the dispatcher. Logged and
//!   skipped, the session keeps running.
//! - [`Error`]: failures surfaced to API callers (connect, send, attach).

use std::fmt;
use std::io;

use crate::blob::AttachmentId;

/// Result alias for client API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed XML on the inbound stream.
///
/// `offset` is the absolute byte position, counted from the last parser reset,
/// at which the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    pub message: String,
    pub offset: usize,
}

impl XmlError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XML error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for XmlError {}

/// Errors surfaced by the public client API.
#[derive(Debug)]
pub enum Error {
    /// I/O error on the transport.
    Io(io::Error),

    /// Could not reach the server.
    Connect { endpoint: String, source: io::Error },

    /// Operation did not complete in time.
    Timeout,

    /// `connect` called while connected or connecting.
    AlreadyConnected,

    /// Operation needs a live connection.
    NotConnected,

    /// Invalid configuration.
    Config(&'static str),

    /// Malformed XML on the stream.
    Xml(XmlError),

    /// Device is not in the registry.
    DeviceNotFound(String),

    /// Property is not defined on the device.
    PropertyNotFound { device: String, property: String },

    /// Element is not part of the property.
    ElementNotFound {
        device: String,
        property: String,
        element: String,
    },

    /// Property exists but has a different kind than requested.
    KindMismatch {
        device: String,
        property: String,
        expected: &'static str,
    },

    /// Attachment id unknown or already taken.
    AttachmentNotFound(AttachmentId),

    /// BLOB payload could not be decoded or mapped.
    Blob(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Connect { endpoint, source } => {
                write!(f, "Failed to connect to {}: {}", endpoint, source)
            }
            Self::Timeout => write!(f, "Operation timed out"),
            Self::AlreadyConnected => write!(f, "Already connected"),
            Self::NotConnected => write!(f, "Not connected to server"),
            Self::Config(s) => write!(f, "Configuration error: {}", s),
            Self::Xml(e) => write!(f, "{}", e),
            Self::DeviceNotFound(d) => write!(f, "Device {} not found", d),
            Self::PropertyNotFound { device, property } => {
                write!(f, "Property {}.{} not found", device, property)
            }
            Self::ElementNotFound {
                device,
                property,
                element,
            } => write!(f, "Element {}.{}.{} not found", device, property, element),
            Self::KindMismatch {
                device,
                property,
                expected,
            } => write!(f, "Property {}.{} is not a {} vector", device, property, expected),
            Self::AttachmentNotFound(id) => write!(f, "Attachment {} not found", id),
            Self::Blob(s) => write!(f, "BLOB error: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Connect { source: e, .. } => Some(e),
            Self::Xml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<XmlError> for Error {
    fn from(e: XmlError) -> Self {
        Self::Xml(e)
    }
}

/// Result codes reported by the dispatcher.
pub mod codes {
    /// Document applied.
    pub const OK: i32 = 0;
    /// Device is unknown.
    pub const DEVICE_NOT_FOUND: i32 = -1;
    /// Property is unknown or its definition is malformed.
    pub const PROPERTY_INVALID: i32 = -2;
    /// Duplicate request, harmless.
    pub const PROPERTY_DUPLICATED: i32 = -3;
    /// Anything else.
    pub const DISPATCH_ERROR: i32 = -4;
}

/// Why a single inbound document was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `getProperties` echoed back by the server.
    Duplicate,

    /// Document names a device that was never defined.
    DeviceNotFound(String),

    /// Update or delete of an undefined property.
    PropertyNotFound { device: String, property: String },

    /// Document is well-formed XML but not a valid protocol message.
    Invalid(String),

    /// Document declares more attached BLOBs than fds were received.
    MissingAttachment { expected: usize, available: usize },

    /// Tag not understood by the client.
    UnknownTag(String),
}

impl DispatchError {
    /// Integer code as reported on the wire-level API.
    pub fn code(&self) -> i32 {
        match self {
            Self::Duplicate => codes::PROPERTY_DUPLICATED,
            Self::DeviceNotFound(_) => codes::DEVICE_NOT_FOUND,
            Self::PropertyNotFound { .. } | Self::Invalid(_) => codes::PROPERTY_INVALID,
            Self::MissingAttachment { .. } | Self::UnknownTag(_) => codes::DISPATCH_ERROR,
        }
    }

    /// Benign conditions are not worth a warning.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate request"),
            Self::DeviceNotFound(d) => write!(f, "device {} not found", d),
            Self::PropertyNotFound { device, property } => {
                write!(f, "property {}.{} not defined", device, property)
            }
            Self::Invalid(s) => write!(f, "invalid document: {}", s),
            Self::MissingAttachment {
                expected,
                available,
            } => write!(
                f,
                "document declares {} attached BLOBs but only {} fds are queued",
                expected, available
            ),
            Self::UnknownTag(t) => write!(f, "unknown tag <{}>", t),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_codes() {
        assert_eq!(DispatchError::Duplicate.code(), codes::PROPERTY_DUPLICATED);
        assert_eq!(
            DispatchError::DeviceNotFound("Foc".into()).code(),
            codes::DEVICE_NOT_FOUND
        );
        assert_eq!(
            DispatchError::UnknownTag("foo".into()).code(),
            codes::DISPATCH_ERROR
        );
        assert!(DispatchError::Duplicate.is_benign());
        assert!(!DispatchError::Invalid("x".into()).is_benign());
    }

    #[test]
    fn test_error_display() {
        let err = Error::PropertyNotFound {
            device: "Foc".into(),
            property: "ABS".into(),
        };
        assert_eq!(err.to_string(), "Property Foc.ABS not found");

        let xml = XmlError::new("unexpected '>'", 42);
        assert_eq!(xml.to_string(), "XML error at byte 42: unexpected '>'");
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
    }
}
