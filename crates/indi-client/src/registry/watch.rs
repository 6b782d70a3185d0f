// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side subscription filter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::Device;

/// Called once when a watched device first appears.
pub type DeviceCallback = Arc<dyn Fn(&Device) + Send + Sync>;

#[derive(Default, Clone)]
struct WatchEntry {
    /// Empty means every property
    properties: BTreeSet<String>,
    on_device: Option<DeviceCallback>,
}

/// One `getProperties` query derived from the watch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub device: Option<String>,
    pub property: Option<String>,
}

/// Devices and properties the application wants.
///
/// An empty list accepts everything.
#[derive(Default, Clone)]
pub struct WatchList {
    entries: BTreeMap<String, WatchEntry>,
}

impl fmt::Debug for WatchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, &v.properties)))
            .finish()
    }
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Watch every property of `device`.
    ///
    /// Existing property restrictions on the device are kept; a callback
    /// replaces any previous one.
    pub fn watch_device(&mut self, device: &str, callback: Option<DeviceCallback>) {
        let entry = self.entries.entry(device.to_string()).or_default();
        if callback.is_some() {
            entry.on_device = callback;
        }
    }

    /// Watch one property of `device`.
    pub fn watch_property(&mut self, device: &str, property: &str) {
        self.entries
            .entry(device.to_string())
            .or_default()
            .properties
            .insert(property.to_string());
    }

    pub fn accepts_device(&self, device: &str) -> bool {
        self.entries.is_empty() || self.entries.contains_key(device)
    }

    pub fn accepts(&self, device: &str, property: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        match self.entries.get(device) {
            Some(entry) => entry.properties.is_empty() || entry.properties.contains(property),
            None => false,
        }
    }

    pub(crate) fn device_callback(&self, device: &str) -> Option<DeviceCallback> {
        self.entries.get(device).and_then(|e| e.on_device.clone())
    }

    /// Queries announcing this watch list to the server.
    pub fn interest(&self) -> Vec<Interest> {
        if self.entries.is_empty() {
            return vec![Interest {
                device: None,
                property: None,
            }];
        }
        let mut out = Vec::new();
        for (device, entry) in &self.entries {
            if entry.properties.is_empty() {
                out.push(Interest {
                    device: Some(device.clone()),
                    property: None,
                });
            } else {
                out.extend(entry.properties.iter().map(|p| Interest {
                    device: Some(device.clone()),
                    property: Some(p.clone()),
                }));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_accepts_all() {
        let w = WatchList::new();
        assert!(w.accepts_device("Anything"));
        assert!(w.accepts("Anything", "ANY"));
        assert_eq!(
            w.interest(),
            vec![Interest {
                device: None,
                property: None
            }]
        );
    }

    #[test]
    fn test_device_and_property_filter() {
        let mut w = WatchList::new();
        w.watch_device("Foc", None);
        w.watch_property("CCD", "CCD1");
        w.watch_property("CCD", "EXPOSURE");

        assert!(w.accepts("Foc", "ABS"));
        assert!(!w.accepts_device("Other"));
        assert!(w.accepts("CCD", "CCD1"));
        assert!(!w.accepts("CCD", "TEMPERATURE"));

        let q = w.interest();
        assert_eq!(q.len(), 3);
        assert_eq!(q[0].device.as_deref(), Some("CCD"));
        assert_eq!(q[0].property.as_deref(), Some("CCD1"));
        assert_eq!(q[2].device.as_deref(), Some("Foc"));
        assert_eq!(q[2].property, None);
    }

    #[test]
    fn test_callback_kept() {
        let mut w = WatchList::new();
        w.watch_device("Foc", Some(Arc::new(|_| {})));
        w.watch_device("Foc", None);
        assert!(w.device_callback("Foc").is_some());
        assert!(w.device_callback("CCD").is_none());
    }
}
