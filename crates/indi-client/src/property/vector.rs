// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::blob::{self, AttachmentId};
use crate::error::DispatchError;
use crate::property::{
    BlobValue, Element, ElementValue, NumberValue, Permission, PropertyKind, PropertyState,
    SwitchRule, SwitchState,
};
use crate::protocol::XmlElement;

/// One property vector of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub device: String,
    pub name: String,
    pub kind: PropertyKind,
    pub label: String,
    pub group: String,
    pub permission: Permission,
    pub state: PropertyState,
    /// Worst-case seconds the device needs to apply a change
    pub timeout: f64,
    pub timestamp: Option<String>,
    /// Present on switch vectors only
    pub rule: Option<SwitchRule>,
    pub elements: Vec<Element>,
}

/// What a `set*` document changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// BLOB elements that received a new payload, in document order
    pub blobs: Vec<String>,
    /// Attachments no longer referenced by the property
    pub released: Vec<AttachmentId>,
}

fn required<'a>(doc: &'a XmlElement, attr: &str) -> Result<&'a str, DispatchError> {
    match doc.attribute(attr) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DispatchError::Invalid(format!(
            "<{}> missing '{}' attribute",
            doc.tag(),
            attr
        ))),
    }
}

impl Property {
    /// Empty property of the given kind.
    pub fn new(device: impl Into<String>, name: impl Into<String>, kind: PropertyKind) -> Self {
        let name = name.into();
        Self {
            device: device.into(),
            label: name.clone(),
            name,
            kind,
            group: String::new(),
            permission: if kind == PropertyKind::Light {
                Permission::ReadOnly
            } else {
                Permission::ReadWrite
            },
            state: PropertyState::Idle,
            timeout: 0.0,
            timestamp: None,
            rule: (kind == PropertyKind::Switch).then_some(SwitchRule::AnyOfMany),
            elements: Vec::new(),
        }
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.name == name)
    }

    /// Attachments referenced by BLOB elements.
    pub fn attachments(&self) -> Vec<AttachmentId> {
        self.elements
            .iter()
            .filter_map(|e| e.as_blob().and_then(BlobValue::attachment))
            .collect()
    }

    /// Build a property from a `def*Vector` document.
    pub fn from_definition(doc: &XmlElement, kind: PropertyKind) -> Result<Self, DispatchError> {
        let device = required(doc, "device")?;
        let name = required(doc, "name")?;
        let mut property = Self::new(device, name, kind);

        if let Some(label) = doc.attribute("label").filter(|l| !l.is_empty()) {
            property.label = label.to_string();
        }
        if let Some(group) = doc.attribute("group") {
            property.group = group.to_string();
        }
        if let Some(state) = doc.attribute("state") {
            property.state = state.parse()?;
        }
        if kind != PropertyKind::Light {
            if let Some(perm) = doc.attribute("perm") {
                property.permission = perm.parse()?;
            }
        }
        if let Some(timeout) = doc.attribute("timeout") {
            property.timeout = timeout.trim().parse().unwrap_or(0.0);
        }
        property.timestamp = doc.attribute("timestamp").map(str::to_string);
        if kind == PropertyKind::Switch {
            if let Some(rule) = doc.attribute("rule") {
                property.rule = Some(rule.parse()?);
            }
        }

        for child in doc.children() {
            if child.tag() != kind.definition_tag() {
                continue;
            }
            let element_name = required(child, "name")?;
            let text = child.text().trim();
            let value = match kind {
                PropertyKind::Text => ElementValue::Text(text.to_string()),
                PropertyKind::Number => ElementValue::Number(NumberValue {
                    value: text.to_string(),
                    format: child.attribute("format").unwrap_or("%g").to_string(),
                    min: child.attribute("min").unwrap_or("0").trim().to_string(),
                    max: child.attribute("max").unwrap_or("0").trim().to_string(),
                    step: child.attribute("step").unwrap_or("0").trim().to_string(),
                }),
                PropertyKind::Switch => ElementValue::Switch(text.parse::<SwitchState>()?),
                PropertyKind::Light => ElementValue::Light(text.parse::<PropertyState>()?),
                PropertyKind::Blob => ElementValue::Blob(BlobValue {
                    format: child.attribute("format").unwrap_or_default().to_string(),
                    ..BlobValue::default()
                }),
            };
            let mut element = Element::new(element_name, value);
            if let Some(label) = child.attribute("label").filter(|l| !l.is_empty()) {
                element.label = label.to_string();
            }
            if property.element(element_name).is_some() {
                log::warn!(
                    "[indi-property] {}.{} defines element {} twice",
                    device,
                    name,
                    element_name
                );
                continue;
            }
            property.elements.push(element);
        }

        if property.elements.is_empty() {
            return Err(DispatchError::Invalid(format!(
                "{}.{} has no valid {} members",
                device,
                name,
                kind.definition_tag()
            )));
        }
        Ok(property)
    }

    /// Apply a `set*Vector` document in place.
    ///
    /// The document is validated completely before anything changes, so a
    /// bad member leaves the property untouched. Members naming unknown
    /// elements are skipped.
    pub fn apply_update(&mut self, doc: &XmlElement) -> Result<UpdateSummary, DispatchError> {
        let state = doc
            .attribute("state")
            .map(str::parse::<PropertyState>)
            .transpose()?;
        let timeout = doc
            .attribute("timeout")
            .and_then(|t| t.trim().parse::<f64>().ok());

        let mut staged: Vec<(usize, ElementValue)> = Vec::new();
        for child in doc.children() {
            if child.tag() != self.kind.member_tag() {
                continue;
            }
            let element_name = required(child, "name")?;
            let Some(index) = self.elements.iter().position(|e| e.name == element_name) else {
                log::debug!(
                    "[indi-property] {}.{} has no element {}",
                    self.device,
                    self.name,
                    element_name
                );
                continue;
            };

            let text = child.text().trim();
            let value = match (&self.elements[index].value, self.kind) {
                (_, PropertyKind::Text) => ElementValue::Text(text.to_string()),
                (ElementValue::Number(current), PropertyKind::Number) => {
                    let mut number = current.clone();
                    number.value = text.to_string();
                    if let Some(min) = child.attribute("min") {
                        number.min = min.trim().to_string();
                    }
                    if let Some(max) = child.attribute("max") {
                        number.max = max.trim().to_string();
                    }
                    ElementValue::Number(number)
                }
                (_, PropertyKind::Switch) => ElementValue::Switch(text.parse()?),
                (_, PropertyKind::Light) => ElementValue::Light(text.parse()?),
                (_, PropertyKind::Blob) => match blob::decode_member(child)? {
                    Some(value) => ElementValue::Blob(value),
                    None => continue,
                },
                (_, PropertyKind::Number) => {
                    return Err(DispatchError::Invalid(format!(
                        "{}.{}.{} is not a number element",
                        self.device, self.name, element_name
                    )))
                }
            };
            staged.push((index, value));
        }

        let mut summary = UpdateSummary::default();
        if let Some(state) = state {
            self.state = state;
        }
        if let Some(timeout) = timeout {
            self.timeout = timeout;
        }
        if let Some(ts) = doc.attribute("timestamp") {
            self.timestamp = Some(ts.to_string());
        }
        for (index, value) in staged {
            let element = &mut self.elements[index];
            if let ElementValue::Blob(blob) = &value {
                if let Some(old) = element.as_blob().and_then(BlobValue::attachment) {
                    if blob.attachment() != Some(old) {
                        summary.released.push(old);
                    }
                }
                summary.blobs.push(element.name.clone());
            }
            element.value = value;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StreamParser;

    fn doc(xml: &str) -> XmlElement {
        StreamParser::new().parse(xml.as_bytes()).unwrap().remove(0)
    }

    #[test]
    fn test_define_number() {
        let d = doc(r#"<defNumberVector device="Foc" name="ABS" label="Absolute" group="Main"
                state="Idle" perm="rw" timeout="60">
                <defNumber name="POS" format="%6.0f" min="0" max="100000" step="10">0</defNumber>
            </defNumberVector>"#);
        let p = Property::from_definition(&d, PropertyKind::Number).unwrap();

        assert_eq!(p.device, "Foc");
        assert_eq!(p.label, "Absolute");
        assert_eq!(p.permission, Permission::ReadWrite);
        assert_eq!(p.timeout, 60.0);
        let pos = p.element("POS").unwrap().as_number().unwrap();
        assert_eq!(pos.value, "0");
        assert_eq!(pos.max_f64(), Some(100000.0));
        assert_eq!(pos.format, "%6.0f");
    }

    #[test]
    fn test_define_switch_rule() {
        let d = doc(r#"<defSwitchVector device="CCD" name="CONNECTION" perm="rw" rule="OneOfMany" state="Ok">
                <defSwitch name="CONNECT">On</defSwitch>
                <defSwitch name="DISCONNECT">Off</defSwitch>
            </defSwitchVector>"#);
        let p = Property::from_definition(&d, PropertyKind::Switch).unwrap();
        assert_eq!(p.rule, Some(SwitchRule::OneOfMany));
        assert_eq!(p.elements.len(), 2);
        assert_eq!(p.element("CONNECT").unwrap().as_switch(), Some(SwitchState::On));
    }

    #[test]
    fn test_define_rejects_bad_input() {
        let no_name = doc(r#"<defTextVector device="D"><defText name="T">x</defText></defTextVector>"#);
        assert!(Property::from_definition(&no_name, PropertyKind::Text).is_err());

        let empty = doc(r#"<defTextVector device="D" name="P"></defTextVector>"#);
        assert!(Property::from_definition(&empty, PropertyKind::Text).is_err());

        let bad_state =
            doc(r#"<defTextVector device="D" name="P" state="Weird"><defText name="T"/></defTextVector>"#);
        assert!(Property::from_definition(&bad_state, PropertyKind::Text).is_err());
    }

    #[test]
    fn test_update_values_and_limits() {
        let d = doc(r#"<defNumberVector device="Foc" name="ABS"><defNumber name="POS" min="0" max="10">0</defNumber></defNumberVector>"#);
        let mut p = Property::from_definition(&d, PropertyKind::Number).unwrap();

        let s = doc(r#"<setNumberVector device="Foc" name="ABS" state="Busy" timeout="5">
                <oneNumber name="POS" max="2000">1000</oneNumber>
                <oneNumber name="UNKNOWN">1</oneNumber>
            </setNumberVector>"#);
        let summary = p.apply_update(&s).unwrap();

        assert!(summary.blobs.is_empty());
        assert_eq!(p.state, PropertyState::Busy);
        assert_eq!(p.timeout, 5.0);
        let pos = p.element("POS").unwrap().as_number().unwrap();
        assert_eq!(pos.value, "1000");
        assert_eq!(pos.max, "2000");
        assert_eq!(pos.min, "0");
        assert_eq!(p.elements.len(), 1);
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let d = doc(r#"<defSwitchVector device="D" name="S" rule="AnyOfMany">
                <defSwitch name="A">Off</defSwitch><defSwitch name="B">Off</defSwitch>
            </defSwitchVector>"#);
        let mut p = Property::from_definition(&d, PropertyKind::Switch).unwrap();

        let s = doc(r#"<setSwitchVector device="D" name="S" state="Ok">
                <oneSwitch name="A">On</oneSwitch><oneSwitch name="B">Maybe</oneSwitch>
            </setSwitchVector>"#);
        assert!(p.apply_update(&s).is_err());
        assert_eq!(p.state, PropertyState::Idle);
        assert_eq!(p.element("A").unwrap().as_switch(), Some(SwitchState::Off));
    }
}
