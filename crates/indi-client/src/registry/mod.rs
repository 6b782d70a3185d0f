// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device/property registry.
//!
//! Plain data with no locking of its own; the client keeps it behind a
//! single mutex and never calls out to application code while holding it.
//! Devices and their properties keep insertion order.

mod watch;

pub use watch::{DeviceCallback, Interest, WatchList};

use crate::blob::AttachmentId;
use crate::error::DispatchError;
use crate::property::{Property, UpdateSummary};
use crate::protocol::XmlElement;

/// A remote instrument and its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    name: String,
    properties: Vec<Property>,
    messages: Vec<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in definition order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Device messages, oldest first, as `"<timestamp>: <text>"`.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    pub(crate) fn push_message(&mut self, message: String) {
        self.messages.push(message);
    }

    fn attachments(&self) -> Vec<AttachmentId> {
        self.properties.iter().flat_map(Property::attachments).collect()
    }
}

/// Result of a successful define.
#[derive(Debug)]
pub struct Defined {
    /// Device did not exist before
    pub new_device: bool,
    /// Property that was replaced by a re-definition
    pub replaced: Option<Property>,
}

/// What a delete removed.
#[derive(Debug)]
pub enum Removed {
    Property(Property),
    Device(Device),
}

impl Removed {
    /// Attachments referenced by the removed data.
    pub fn attachments(&self) -> Vec<AttachmentId> {
        match self {
            Self::Property(p) => p.attachments(),
            Self::Device(d) => d.attachments(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    devices: Vec<Device>,
    watch: WatchList,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self) -> &WatchList {
        &self.watch
    }

    pub fn watch_mut(&mut self) -> &mut WatchList {
        &mut self.watch
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.name == name)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn property(&self, device: &str, name: &str) -> Option<&Property> {
        self.device(device).and_then(|d| d.property(name))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Insert or replace a property, creating its device if needed.
    ///
    /// Returns `None` when the watch list filters the property out; nothing
    /// is created in that case.
    pub fn define(&mut self, property: Property) -> Option<Defined> {
        if !self.watch.accepts(&property.device, &property.name) {
            log::trace!(
                "[indi-registry] {}.{} not watched",
                property.device,
                property.name
            );
            return None;
        }

        let new_device = self.device(&property.device).is_none();
        if new_device {
            log::debug!("[indi-registry] new device {}", property.device);
            self.devices.push(Device::new(property.device.clone()));
        }
        let device = self.device_mut(&property.device)?;

        let replaced = match device.property_mut(&property.name) {
            Some(slot) => Some(std::mem::replace(slot, property)),
            None => {
                device.properties.push(property);
                None
            }
        };
        Some(Defined {
            new_device,
            replaced,
        })
    }

    /// Apply a `set*Vector` document to an existing property.
    pub fn update(
        &mut self,
        device: &str,
        name: &str,
        doc: &XmlElement,
    ) -> Result<UpdateSummary, DispatchError> {
        let not_found = || DispatchError::PropertyNotFound {
            device: device.to_string(),
            property: name.to_string(),
        };
        let property = self
            .device_mut(device)
            .and_then(|d| d.property_mut(name))
            .ok_or_else(not_found)?;
        property.apply_update(doc)
    }

    /// Remove one property, or the whole device when `name` is `None`.
    ///
    /// Removing a device's last property leaves the device in place.
    pub fn delete(&mut self, device: &str, name: Option<&str>) -> Result<Removed, DispatchError> {
        let Some(index) = self.devices.iter().position(|d| d.name == device) else {
            return Err(DispatchError::DeviceNotFound(device.to_string()));
        };

        match name {
            None => {
                log::debug!("[indi-registry] removing device {}", device);
                Ok(Removed::Device(self.devices.remove(index)))
            }
            Some(name) => {
                let props = &mut self.devices[index].properties;
                match props.iter().position(|p| p.name == name) {
                    Some(i) => Ok(Removed::Property(props.remove(i))),
                    None => Err(DispatchError::PropertyNotFound {
                        device: device.to_string(),
                        property: name.to_string(),
                    }),
                }
            }
        }
    }

    /// Append to a known device's message log. False if the device is unknown.
    pub fn push_message(&mut self, device: &str, message: String) -> bool {
        match self.device_mut(device) {
            Some(d) => {
                d.push_message(message);
                true
            }
            None => false,
        }
    }

    /// Drop every device, returning the attachments they referenced.
    pub fn clear(&mut self) -> Vec<AttachmentId> {
        let ids = self.devices.iter().flat_map(Device::attachments).collect();
        self.devices.clear();
        ids
    }
}
