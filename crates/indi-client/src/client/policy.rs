// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-device and per-property BLOB handling.

use crate::protocol::BlobMode;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    device: String,
    property: Option<String>,
}

impl Scope {
    fn new(device: &str, property: Option<&str>) -> Self {
        Self {
            device: device.to_string(),
            property: property.map(str::to_string),
        }
    }

    fn is(&self, device: &str, property: Option<&str>) -> bool {
        self.device == device && self.property.as_deref() == property
    }
}

/// BLOB modes and direct-access grants.
///
/// A property-level entry wins over the device-level one.
#[derive(Debug, Default)]
pub(crate) struct BlobPolicies {
    modes: Vec<(Scope, BlobMode)>,
    direct: Vec<Scope>,
}

impl BlobPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `mode`; returns whether it differs from what was in effect.
    pub fn set_mode(&mut self, device: &str, property: Option<&str>, mode: BlobMode) -> bool {
        let previous = self.mode(device, property);
        match self.modes.iter_mut().find(|(s, _)| s.is(device, property)) {
            Some((_, m)) => *m = mode,
            None => self.modes.push((Scope::new(device, property), mode)),
        }
        previous != mode
    }

    pub fn mode(&self, device: &str, property: Option<&str>) -> BlobMode {
        let exact = property.and_then(|_| self.lookup(device, property));
        exact
            .or_else(|| self.lookup(device, None))
            .unwrap_or_default()
    }

    fn lookup(&self, device: &str, property: Option<&str>) -> Option<BlobMode> {
        self.modes
            .iter()
            .find(|(s, _)| s.is(device, property))
            .map(|(_, m)| *m)
    }

    /// Modes that differ from the server default, device-level entries
    /// first so property overrides are applied after them.
    pub fn recorded(&self) -> Vec<(String, Option<String>, BlobMode)> {
        let devices = self
            .modes
            .iter()
            .filter(|(s, m)| s.property.is_none() && *m != BlobMode::default());
        let properties = self
            .modes
            .iter()
            .filter(|(s, m)| s.property.is_some() && *m != self.mode(&s.device, None));
        devices
            .chain(properties)
            .map(|(s, m)| (s.device.clone(), s.property.clone(), *m))
            .collect()
    }

    pub fn allow_direct(&mut self, device: &str, property: Option<&str>) {
        if !self.direct.iter().any(|s| s.is(device, property)) {
            self.direct.push(Scope::new(device, property));
        }
    }

    pub fn is_direct(&self, device: &str, property: &str) -> bool {
        self.direct
            .iter()
            .any(|s| s.device == device && s.property.as_deref().map_or(true, |p| p == property))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_also() {
        let p = BlobPolicies::new();
        assert_eq!(p.mode("CCD", None), BlobMode::Also);
        assert_eq!(p.mode("CCD", Some("CCD1")), BlobMode::Also);
    }

    #[test]
    fn test_property_overrides_device() {
        let mut p = BlobPolicies::new();
        assert!(p.set_mode("CCD", None, BlobMode::Never));
        assert!(p.set_mode("CCD", Some("CCD1"), BlobMode::Only));

        assert_eq!(p.mode("CCD", None), BlobMode::Never);
        assert_eq!(p.mode("CCD", Some("CCD1")), BlobMode::Only);
        assert_eq!(p.mode("CCD", Some("CCD2")), BlobMode::Never);
        assert_eq!(p.mode("Foc", None), BlobMode::Also);
    }

    #[test]
    fn test_set_mode_reports_change() {
        let mut p = BlobPolicies::new();
        assert!(!p.set_mode("CCD", None, BlobMode::Also));
        assert!(p.set_mode("CCD", None, BlobMode::Only));
        assert!(!p.set_mode("CCD", None, BlobMode::Only));
    }

    #[test]
    fn test_recorded_skips_defaults() {
        let mut p = BlobPolicies::new();
        p.set_mode("CCD", Some("CCD1"), BlobMode::Only);
        p.set_mode("CCD", None, BlobMode::Never);
        p.set_mode("Foc", None, BlobMode::Also);
        p.set_mode("Guide", Some("IMG"), BlobMode::Also);

        assert_eq!(
            p.recorded(),
            vec![
                ("CCD".to_string(), None, BlobMode::Never),
                ("CCD".to_string(), Some("CCD1".to_string()), BlobMode::Only),
            ]
        );

        p.set_mode("CCD", None, BlobMode::Also);
        p.set_mode("CCD", Some("CCD1"), BlobMode::Also);
        assert!(p.recorded().is_empty());
    }

    #[test]
    fn test_direct() {
        let mut p = BlobPolicies::new();
        p.allow_direct("CCD", Some("CCD1"));
        assert!(p.is_direct("CCD", "CCD1"));
        assert!(!p.is_direct("CCD", "CCD2"));

        p.allow_direct("Guide", None);
        assert!(p.is_direct("Guide", "ANY"));
        assert!(!p.is_direct("Foc", "ABS"));
    }
}
