// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound client commands.

use std::fmt;
use std::str::FromStr;

use base64::Engine;

use crate::property::{BlobData, ElementValue, Property, PropertyKind, SwitchRule, SwitchState};
use crate::protocol::XmlElement;

/// Protocol version announced in `getProperties`.
pub const PROTOCOL_VERSION: &str = "1.7";

/// Whether the server should send BLOBs to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlobMode {
    /// No BLOBs.
    Never,
    /// BLOBs interleaved with everything else.
    #[default]
    Also,
    /// BLOBs only; all other traffic for the device is suppressed.
    Only,
}

impl BlobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "Never",
            Self::Also => "Also",
            Self::Only => "Only",
        }
    }
}

impl fmt::Display for BlobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Never" | "never" => Ok(Self::Never),
            "Also" | "also" => Ok(Self::Also),
            "Only" | "only" => Ok(Self::Only),
            other => Err(format!("unknown BLOB mode '{}'", other)),
        }
    }
}

/// Query definitions: all, one device, or one property.
pub fn get_properties(device: Option<&str>, property: Option<&str>) -> XmlElement {
    let mut e = XmlElement::new("getProperties").with_attribute("version", PROTOCOL_VERSION);
    if let Some(device) = device.filter(|d| !d.is_empty()) {
        e.set_attribute("device", device);
        if let Some(property) = property.filter(|p| !p.is_empty()) {
            e.set_attribute("name", property);
        }
    }
    e
}

pub fn enable_blob(device: &str, property: Option<&str>, mode: BlobMode) -> XmlElement {
    let mut e = XmlElement::new("enableBLOB").with_attribute("device", device);
    if let Some(property) = property {
        e.set_attribute("name", property);
    }
    e.with_text(mode.as_str())
}

pub fn ping_request(uid: &str) -> XmlElement {
    XmlElement::new("pingRequest").with_attribute("uid", uid)
}

pub fn ping_reply(uid: &str) -> XmlElement {
    XmlElement::new("pingReply").with_attribute("uid", uid)
}

/// One payload for [`new_blob_vector`].
#[derive(Debug, Clone, Copy)]
pub struct OutboundBlob<'a> {
    pub name: &'a str,
    pub format: &'a str,
    pub data: &'a [u8],
}

fn one_blob(name: &str, format: &str, data: &[u8]) -> XmlElement {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    XmlElement::new("oneBLOB")
        .with_attribute("name", name)
        .with_attribute("size", data.len().to_string())
        .with_attribute("enclen", encoded.len().to_string())
        .with_attribute("format", format)
        .with_text(encoded)
}

/// `newBLOBVector` with inline base64 payloads.
pub fn new_blob_vector(
    device: &str,
    property: &str,
    blobs: &[OutboundBlob<'_>],
    timestamp: Option<&str>,
) -> XmlElement {
    let mut e = XmlElement::new("newBLOBVector")
        .with_attribute("device", device)
        .with_attribute("name", property);
    if let Some(ts) = timestamp {
        e.set_attribute("timestamp", ts);
    }
    blobs
        .iter()
        .fold(e, |e, b| e.with_child(one_blob(b.name, b.format, b.data)))
}

/// `new*Vector` carrying the current element values of `property`.
///
/// For a OneOfMany switch only the element that is On is sent.
pub fn new_vector(property: &Property) -> XmlElement {
    let doc = XmlElement::new(property.kind.vector_tag("new"))
        .with_attribute("device", property.device.as_str())
        .with_attribute("name", property.name.as_str());

    let only_on = property.kind == PropertyKind::Switch
        && property.rule == Some(SwitchRule::OneOfMany)
        && property
            .elements
            .iter()
            .any(|e| e.as_switch() == Some(SwitchState::On));

    property
        .elements
        .iter()
        .filter(|e| !only_on || e.as_switch() == Some(SwitchState::On))
        .fold(doc, |doc, element| {
            let child = match &element.value {
                ElementValue::Blob(blob) => match &blob.data {
                    BlobData::Inline(bytes) => one_blob(&element.name, &blob.format, bytes),
                    _ => one_blob(&element.name, &blob.format, &[]),
                },
                _ => XmlElement::new(property.kind.member_tag())
                    .with_attribute("name", element.name.as_str())
                    .with_text(element.value_str().unwrap_or_default()),
            };
            doc.with_child(child)
        })
}
