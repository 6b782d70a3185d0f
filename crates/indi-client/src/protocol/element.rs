// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owned XML element tree.
//!
//! Parsed documents outlive the parser buffer they came from (they are
//! correlated, rewritten, then dispatched), so the borrowed `roxmltree`
//! tree is copied into this small owned form. The same type builds outbound
//! commands; its `Display` impl writes escaped XML.

use std::borrow::Cow;
use std::fmt;

/// One XML element with attributes, direct text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create an empty element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style text setter.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attribute value, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert or overwrite an attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let idx = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(idx).1)
    }

    /// Concatenated direct text content (untrimmed).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [XmlElement] {
        &mut self.children
    }

    /// Visit this element and every descendant in document order.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut XmlElement)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Visit this element and every descendant in document order.
    pub fn walk(&self, f: &mut impl FnMut(&XmlElement)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Copy a `roxmltree` element (and its subtree) into owned form.
    pub(crate) fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut element = Self::new(node.tag_name().name());
        element.attributes = node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();

        for child in node.children() {
            if child.is_element() {
                element.children.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.text.push_str(text);
                }
            }
        }
        element
    }
}

/// Escape text content.
pub fn escape_text(s: &str) -> Cow<'_, str> {
    escape(s, false)
}

/// Escape an attribute value (single or double quoted).
pub fn escape_attribute(s: &str) -> Cow<'_, str> {
    escape(s, true)
}

fn escape(s: &str, quotes: bool) -> Cow<'_, str> {
    let needs = |c: char| matches!(c, '&' | '<' | '>') || (quotes && matches!(c, '\'' | '"'));
    if !s.chars().any(needs) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' if quotes => out.push_str("&apos;"),
            '"' if quotes => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (k, v) in &self.attributes {
            write!(f, " {}='{}'", k, escape_attribute(v))?;
        }
        if self.text.is_empty() && self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        if self.children.is_empty() {
            f.write_str(&escape_text(&self.text))?;
        } else {
            f.write_str("\n")?;
            for child in &self.children {
                writeln!(f, "  {}", child)?;
            }
        }
        write!(f, "</{}>", self.tag)
    }
}
