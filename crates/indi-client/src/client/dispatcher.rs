// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routes parsed documents to the registry and the listener.
//!
//! Every document goes through the BLOB correlator first, whatever its tag,
//! so descriptors stay paired with the documents that announced them. The
//! attachments are only kept once the document has been applied.

use crate::blob::{AttachmentId, BlobCorrelator};
use crate::error::DispatchError;
use crate::property::{Property, PropertyKind};
use crate::protocol::{commands, BlobMode, XmlElement};
use crate::registry::Removed;

use super::listener::Notification;
use super::Shared;

/// Timestamp format used when a message carries none.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn dispatch(
    shared: &Shared,
    correlator: &mut BlobCorrelator,
    mut doc: XmlElement,
) -> Result<(), DispatchError> {
    if shared.config.verbose {
        log::trace!("[indi-client] <- {}", doc);
    }

    let guard = {
        let policies = shared.policies.lock();
        correlator.correlate(&mut doc, &shared.attachments, |d, p| policies.is_direct(d, p))?
    };

    let tag = doc.tag();
    match tag {
        "getProperties" => return Err(DispatchError::Duplicate),
        "enableBLOB" => return Ok(()),
        "pingRequest" => {
            let uid = doc.attribute("uid").unwrap_or_default();
            if let Err(e) = shared.send_command(&commands::ping_reply(uid)) {
                log::warn!("[indi-client] pingReply not sent: {}", e);
            }
            return Ok(());
        }
        "pingReply" => {
            let uid = doc.attribute("uid").unwrap_or_default().to_string();
            shared.notify(vec![Notification::PingReply(uid)]);
            return Ok(());
        }
        "message" => return handle_message(shared, &doc),
        "delProperty" => return handle_delete(shared, &doc),
        _ => {}
    }

    let Some((verb, kind)) = PropertyKind::from_vector_tag(tag) else {
        return Err(DispatchError::UnknownTag(tag.to_string()));
    };
    if verb == "new" {
        // Our own command reflected back.
        return Ok(());
    }

    let (device, name) = match (doc.attribute("device"), doc.attribute("name")) {
        (Some(d), Some(n)) if !d.is_empty() && !n.is_empty() => (d.to_string(), n.to_string()),
        _ => {
            return Err(DispatchError::Invalid(format!(
                "<{}> missing device or name",
                tag
            )))
        }
    };

    if kind != PropertyKind::Blob && shared.policies.lock().mode(&device, None) == BlobMode::Only {
        return Ok(());
    }

    let mut notes = Vec::new();
    let mut released = Vec::new();
    match verb {
        "def" => {
            let property = Property::from_definition(&doc, kind)?;
            let mut registry = shared.registry.lock();
            let Some(defined) = registry.define(property) else {
                return Ok(());
            };
            let committed = guard.commit();
            if let Some(old) = defined.replaced {
                released.extend(old.attachments());
            }
            if defined.new_device {
                if let Some(device) = registry.device(&device) {
                    if let Some(callback) = registry.watch().device_callback(device.name()) {
                        notes.push(Notification::Watched(callback, device.clone()));
                    }
                    notes.push(Notification::NewDevice(device.clone()));
                }
            }
            if let Some(p) = registry.property(&device, &name) {
                released.extend(unreferenced(committed, p));
                notes.push(Notification::NewProperty(p.clone()));
            }
            log_message(&mut registry, &doc, &device, &mut notes);
        }
        "set" => {
            let mut registry = shared.registry.lock();
            if !registry.watch().accepts(&device, &name) {
                return Ok(());
            }
            let summary = registry.update(&device, &name, &doc)?;
            let committed = guard.commit();
            released.extend(summary.released);
            if let Some(p) = registry.property(&device, &name) {
                released.extend(unreferenced(committed, p));
                for element in summary.blobs {
                    notes.push(Notification::NewBlob(p.clone(), element));
                }
                notes.push(Notification::UpdateProperty(p.clone()));
            }
            log_message(&mut registry, &doc, &device, &mut notes);
        }
        _ => return Err(DispatchError::UnknownTag(tag.to_string())),
    }

    for id in released {
        shared.attachments.release(id);
    }
    shared.notify(notes);
    Ok(())
}

/// Committed ids the property did not keep (skipped or empty members).
fn unreferenced(committed: Vec<AttachmentId>, property: &Property) -> Vec<AttachmentId> {
    if committed.is_empty() {
        return committed;
    }
    let kept = property.attachments();
    committed.into_iter().filter(|id| !kept.contains(id)).collect()
}

fn stamped(doc: &XmlElement, text: &str) -> String {
    match doc.attribute("timestamp").filter(|t| !t.is_empty()) {
        Some(ts) => format!("{}: {}", ts, text),
        None => format!("{}: {}", chrono::Utc::now().format(TIMESTAMP_FORMAT), text),
    }
}

/// Record the `message` attribute of a def/set/del document.
fn log_message(
    registry: &mut crate::registry::Registry,
    doc: &XmlElement,
    device: &str,
    notes: &mut Vec<Notification>,
) {
    let Some(text) = doc.attribute("message").filter(|m| !m.is_empty()) else {
        return;
    };
    let line = stamped(doc, text);
    if registry.push_message(device, line.clone()) {
        notes.push(Notification::Message(Some(device.to_string()), line));
    }
}

fn handle_message(shared: &Shared, doc: &XmlElement) -> Result<(), DispatchError> {
    let Some(text) = doc.attribute("message") else {
        return Err(DispatchError::Invalid("<message> missing 'message' attribute".into()));
    };
    let line = stamped(doc, text);
    let device = doc.attribute("device").filter(|d| !d.is_empty());

    let routed = match device {
        Some(d) => shared.registry.lock().push_message(d, line.clone()),
        None => false,
    };
    let note = if routed {
        Notification::Message(device.map(str::to_string), line)
    } else {
        Notification::Message(None, line)
    };
    shared.notify(vec![note]);
    Ok(())
}

fn handle_delete(shared: &Shared, doc: &XmlElement) -> Result<(), DispatchError> {
    let device = match doc.attribute("device") {
        Some(d) if !d.is_empty() => d,
        _ => return Err(DispatchError::Invalid("<delProperty> missing 'device'".into())),
    };
    let name = doc.attribute("name").filter(|n| !n.is_empty());

    let mut notes = Vec::new();
    let removed = {
        let mut registry = shared.registry.lock();
        // Logged before removal so a device-wide delete still records it.
        log_message(&mut registry, doc, device, &mut notes);
        registry.delete(device, name)
    };

    let removed = match removed {
        Ok(r) => r,
        Err(DispatchError::PropertyNotFound { .. })
            if shared.policies.lock().mode(device, None) == BlobMode::Only =>
        {
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for id in removed.attachments() {
        shared.attachments.release(id);
    }
    notes.push(match removed {
        Removed::Property(p) => Notification::RemoveProperty(p),
        Removed::Device(d) => Notification::RemoveDevice(d),
    });
    shared.notify(notes);
    Ok(())
}
