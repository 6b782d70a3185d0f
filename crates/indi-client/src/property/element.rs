// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::blob::AttachmentId;
use crate::property::{PropertyKind, PropertyState, SwitchState};

/// Number element payload. All fields are kept as received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberValue {
    pub value: String,
    pub format: String,
    pub min: String,
    pub max: String,
    pub step: String,
}

impl NumberValue {
    /// Numeric value, accepting sexagesimal notation.
    pub fn as_f64(&self) -> Option<f64> {
        parse_sexagesimal(&self.value)
    }

    pub fn min_f64(&self) -> Option<f64> {
        parse_sexagesimal(&self.min)
    }

    pub fn max_f64(&self) -> Option<f64> {
        parse_sexagesimal(&self.max)
    }

    pub fn step_f64(&self) -> Option<f64> {
        parse_sexagesimal(&self.step)
    }
}

/// Where a BLOB's bytes live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BlobData {
    /// Defined but never received.
    #[default]
    Empty,
    /// Decoded from base64 in the document.
    Inline(Vec<u8>),
    /// Passed out-of-band; redeem with `Client::attach_blob`.
    Attached { id: AttachmentId, direct: bool },
}

/// BLOB element payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobValue {
    /// File-type suffix such as `.fits`
    pub format: String,
    /// Decoded payload length
    pub size: usize,
    pub data: BlobData,
}

impl BlobValue {
    /// Attachment id, for out-of-band payloads.
    pub fn attachment(&self) -> Option<AttachmentId> {
        match self.data {
            BlobData::Attached { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Inline bytes, for payloads decoded from the document.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            BlobData::Inline(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Text(String),
    Number(NumberValue),
    Switch(SwitchState),
    Light(PropertyState),
    Blob(BlobValue),
}

impl ElementValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Text(_) => PropertyKind::Text,
            Self::Number(_) => PropertyKind::Number,
            Self::Switch(_) => PropertyKind::Switch,
            Self::Light(_) => PropertyKind::Light,
            Self::Blob(_) => PropertyKind::Blob,
        }
    }
}

/// Named member of a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub label: String,
    pub value: ElementValue,
}

impl Element {
    pub fn new(name: impl Into<String>, value: ElementValue) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            value,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Wire representation of a scalar value. BLOBs have none.
    pub fn value_str(&self) -> Option<&str> {
        match &self.value {
            ElementValue::Text(s) => Some(s),
            ElementValue::Number(n) => Some(&n.value),
            ElementValue::Switch(s) => Some(s.as_str()),
            ElementValue::Light(l) => Some(l.as_str()),
            ElementValue::Blob(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            ElementValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&NumberValue> {
        match &self.value {
            ElementValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<SwitchState> {
        match self.value {
            ElementValue::Switch(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<PropertyState> {
        match self.value {
            ElementValue::Light(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&BlobValue> {
        match &self.value {
            ElementValue::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// Parse a plain or sexagesimal (`d:m:s`, `d m s`, `d;m;s`) number.
pub fn parse_sexagesimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let parts: Vec<&str> = s
        .split(|c: char| c == ':' || c == ';' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let negative = parts[0].starts_with('-');
    let mut value = 0.0;
    let mut scale = 1.0;
    for part in &parts {
        let v: f64 = part.parse().ok()?;
        value += v.abs() / scale;
        scale *= 60.0;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sexagesimal() {
        assert_eq!(parse_sexagesimal("1000"), Some(1000.0));
        assert_eq!(parse_sexagesimal(" 12:30 "), Some(12.5));
        assert_eq!(parse_sexagesimal("-10:30:00"), Some(-10.5));
        assert_eq!(parse_sexagesimal("2 15 0"), Some(2.25));
        assert_eq!(parse_sexagesimal(""), None);
        assert_eq!(parse_sexagesimal("abc"), None);
    }

    #[test]
    fn test_element_accessors() {
        let e = Element::new("CONNECT", ElementValue::Switch(SwitchState::On));
        assert_eq!(e.label, "CONNECT");
        assert_eq!(e.as_switch(), Some(SwitchState::On));
        assert_eq!(e.value_str(), Some("On"));
        assert!(e.as_number().is_none());

        let b = Element::new("CCD1", ElementValue::Blob(BlobValue::default()));
        assert_eq!(b.value_str(), None);
        assert_eq!(b.value.kind(), PropertyKind::Blob);
    }
}
