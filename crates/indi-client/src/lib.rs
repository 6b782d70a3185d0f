// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # indi-client - INDI protocol client engine
//!
//! Talks to an INDI server: a process that multiplexes many remote
//! instruments (cameras, focusers, mounts, weather stations) over one XML
//! stream. The client keeps a live registry of every device and property the
//! server defines, applies updates as they arrive, and sends new values back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use indi_client::{Client, ClientConfig, ClientListener, Property, Result};
//!
//! struct Watcher;
//!
//! impl ClientListener for Watcher {
//!     fn on_update_property(&self, p: &Property) {
//!         println!("{}.{} -> {}", p.device, p.name, p.state);
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let client = Client::new(ClientConfig::from_env())?.with_listener(Arc::new(Watcher));
//!     client.watch_device("Focuser Simulator");
//!     client.connect()?;
//!     client.connect_device("Focuser Simulator")?;
//!     client.send_new_number("Focuser Simulator", "ABS_FOCUS_POSITION", "FOCUS_ABSOLUTE_POSITION", 1000.0)?;
//!     client.wait_disconnected(std::time::Duration::from_secs(60));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                     Client (public API, any thread)                 |
//! |   connect / disconnect | send_new_* | watch_* | attach_blob         |
//! +---------------------------------------------------------------------+
//! |                 Receive thread (one per connection)                 |
//! |   mio::Poll -> recvmsg -> StreamParser -> BlobCorrelator ->         |
//! |   dispatcher -> Registry -> ClientListener callbacks                |
//! +---------------------------------------------------------------------+
//! |                          Transport                                  |
//! |   TCP | UNIX socket (SCM_RIGHTS descriptor passing for BLOBs)       |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`client`] - Connection manager and callbacks (start here)
//! - [`registry`] - Devices, watch list
//! - [`property`] - Typed property vectors and elements
//! - [`protocol`] - Stream parser and outbound commands
//! - [`blob`] - Inline and out-of-band binary payloads
//! - [`transport`] - Sockets and descriptor passing

/// Inline and attached BLOB payloads.
pub mod blob;
/// Connection manager, dispatcher and listener trait.
pub mod client;
/// Client configuration.
pub mod config;
/// Error types.
pub mod error;
/// Typed property vectors.
pub mod property;
/// Wire format: stream parser and outbound commands.
pub mod protocol;
/// Device registry and watch list.
pub mod registry;
/// Server sockets.
pub mod transport;

pub use blob::{AttachmentId, BlobBuffer};
pub use client::{Client, ClientListener, ConnectionState, NullListener};
pub use config::{ClientConfig, Endpoint};
pub use error::{DispatchError, Error, Result, XmlError};
pub use property::{
    BlobData, BlobValue, Element, ElementValue, NumberValue, Permission, Property, PropertyKind,
    PropertyState, SwitchRule, SwitchState,
};
pub use protocol::{BlobMode, OutboundBlob, StreamParser, XmlElement};
pub use registry::Device;
pub use transport::ServerStream;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
