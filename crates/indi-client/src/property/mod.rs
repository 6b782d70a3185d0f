// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed property model.
//!
//! A [`Property`] is one vector of the five INDI kinds. Its elements carry a
//! kind-specific [`ElementValue`]; scalar payloads (text, numbers) stay as the
//! strings received on the wire.

mod element;
mod vector;

pub use element::{parse_sexagesimal, BlobData, BlobValue, Element, ElementValue, NumberValue};
pub use vector::{Property, UpdateSummary};

use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;

/// The five vector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Text,
    Number,
    Switch,
    Light,
    Blob,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 5] = [
        PropertyKind::Text,
        PropertyKind::Number,
        PropertyKind::Switch,
        PropertyKind::Light,
        PropertyKind::Blob,
    ];

    /// Wire name fragment (`Number` in `defNumberVector`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Number => "Number",
            Self::Switch => "Switch",
            Self::Light => "Light",
            Self::Blob => "BLOB",
        }
    }

    /// Vector tag for a verb: `vector_tag("set")` is `setNumberVector`.
    pub fn vector_tag(self, verb: &str) -> String {
        format!("{}{}Vector", verb, self.as_str())
    }

    /// Child tag inside a definition (`defNumber`).
    pub fn definition_tag(self) -> &'static str {
        match self {
            Self::Text => "defText",
            Self::Number => "defNumber",
            Self::Switch => "defSwitch",
            Self::Light => "defLight",
            Self::Blob => "defBLOB",
        }
    }

    /// Child tag inside set/new vectors (`oneNumber`).
    pub fn member_tag(self) -> &'static str {
        match self {
            Self::Text => "oneText",
            Self::Number => "oneNumber",
            Self::Switch => "oneSwitch",
            Self::Light => "oneLight",
            Self::Blob => "oneBLOB",
        }
    }

    /// Split `defNumberVector` into (`"def"`, `Number`).
    pub fn from_vector_tag(tag: &str) -> Option<(&str, PropertyKind)> {
        let stem = tag.strip_suffix("Vector")?;
        Self::ALL.iter().find_map(|&kind| {
            stem.strip_suffix(kind.as_str())
                .filter(|verb| !verb.is_empty())
                .map(|verb| (verb, kind))
        })
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector state, also the value of a light element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

impl PropertyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Ok => "Ok",
            Self::Busy => "Busy",
            Self::Alert => "Alert",
        }
    }
}

impl FromStr for PropertyState {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Idle" => Ok(Self::Idle),
            "Ok" => Ok(Self::Ok),
            "Busy" => Ok(Self::Busy),
            "Alert" => Ok(Self::Alert),
            other => Err(DispatchError::Invalid(format!("bogus state '{}'", other))),
        }
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client access rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::WriteOnly => "wo",
            Self::ReadWrite => "rw",
        }
    }

    /// True when the client may send new values.
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl FromStr for Permission {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ro" => Ok(Self::ReadOnly),
            "wo" => Ok(Self::WriteOnly),
            "rw" => Ok(Self::ReadWrite),
            other => Err(DispatchError::Invalid(format!("bogus perm '{}'", other))),
        }
    }
}

/// Switch vector behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl SwitchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneOfMany => "OneOfMany",
            Self::AtMostOne => "AtMostOne",
            Self::AnyOfMany => "AnyOfMany",
        }
    }
}

impl FromStr for SwitchRule {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OneOfMany" => Ok(Self::OneOfMany),
            "AtMostOne" => Ok(Self::AtMostOne),
            "AnyOfMany" => Ok(Self::AnyOfMany),
            other => Err(DispatchError::Invalid(format!("bogus rule '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Off => "Off",
        }
    }
}

impl FromStr for SwitchState {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "On" => Ok(Self::On),
            "Off" => Ok(Self::Off),
            other => Err(DispatchError::Invalid(format!("bogus switch state '{}'", other))),
        }
    }
}
