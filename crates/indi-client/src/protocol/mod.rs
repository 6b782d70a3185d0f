// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! INDI wire format: inbound stream parsing and outbound command builders.

pub mod commands;
mod element;
mod parser;

pub use commands::{BlobMode, OutboundBlob, PROTOCOL_VERSION};
pub use element::{escape_attribute, escape_text, XmlElement};
pub use parser::StreamParser;
