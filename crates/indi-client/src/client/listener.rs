// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application callbacks.

use crate::property::{Element, Property};
use crate::registry::{Device, DeviceCallback};

/// Receives registry changes and connection events.
///
/// Every callback runs on the receive thread with no client lock held, so
/// implementations may call back into [`Client`](super::Client). Snapshots
/// passed in reflect the registry right after the change was applied.
/// All methods default to doing nothing.
pub trait ClientListener: Send + Sync {
    /// A device was seen for the first time.
    fn on_new_device(&self, _device: &Device) {}

    /// A device was deleted along with all its properties.
    fn on_remove_device(&self, _device: &Device) {}

    /// A property was defined (or re-defined).
    fn on_new_property(&self, _property: &Property) {}

    fn on_remove_property(&self, _property: &Property) {}

    /// A `set` document was applied.
    fn on_update_property(&self, _property: &Property) {}

    /// A BLOB element received a new payload. Fired before the matching
    /// [`on_update_property`](Self::on_update_property).
    fn on_new_blob(&self, _property: &Property, _element: &Element) {}

    /// `device` is `None` for server-wide messages.
    fn on_message(&self, _device: Option<&str>, _message: &str) {}

    fn on_ping_reply(&self, _uid: &str) {}

    fn on_server_connected(&self) {}

    /// Called exactly once per connection. `exit_code` is 0 (or the code
    /// passed to [`disconnect_with_code`](super::Client::disconnect_with_code))
    /// on request and -1 when the server went away.
    fn on_server_disconnected(&self, _exit_code: i32) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl ClientListener for NullListener {}

/// A queued callback, fired once locks are released.
pub(crate) enum Notification {
    /// Per-device callback registered with the watch list
    Watched(DeviceCallback, Device),
    NewDevice(Device),
    RemoveDevice(Device),
    NewProperty(Property),
    RemoveProperty(Property),
    UpdateProperty(Property),
    NewBlob(Property, String),
    Message(Option<String>, String),
    PingReply(String),
}

impl Notification {
    pub fn deliver(&self, listener: &dyn ClientListener) {
        match self {
            Self::Watched(callback, d) => callback(d),
            Self::NewDevice(d) => listener.on_new_device(d),
            Self::RemoveDevice(d) => listener.on_remove_device(d),
            Self::NewProperty(p) => listener.on_new_property(p),
            Self::RemoveProperty(p) => listener.on_remove_property(p),
            Self::UpdateProperty(p) => listener.on_update_property(p),
            Self::NewBlob(p, element) => {
                if let Some(e) = p.element(element) {
                    listener.on_new_blob(p, e);
                }
            }
            Self::Message(device, text) => listener.on_message(device.as_deref(), text),
            Self::PingReply(uid) => listener.on_ping_reply(uid),
        }
    }
}
