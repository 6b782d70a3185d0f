// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection manager and public client API.
//!
//! # Architecture
//!
//! ```text
//! caller threads                         receive thread "indi-client-rx"
//! --------------                         -------------------------------
//! connect() ---- spawn ----------------> mark_connected, on_server_connected
//!    | waits on Session condvar          getProperties (interest)
//!    v                                   loop {
//! send_*() ---> writer lock ---> socket    poll(stream, wake pipe)
//!                                          recvmsg -> parser -> dispatch
//! disconnect() -> Session --- wake ----->  }
//!    | joins                             teardown, on_server_disconnected
//! ```
//!
//! Lock order: registry, then policies, then the attachment table. Listener
//! callbacks run with no lock held.

mod dispatcher;
mod listener;
mod policy;
mod receiver;
mod state;

pub use listener::{ClientListener, NullListener};
pub use state::{ConnectionState, ABNORMAL_EXIT};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::blob::{AttachmentId, AttachmentTable, BlobBuffer};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::property::{
    BlobData, Element, ElementValue, Property, PropertyKind, PropertyState, SwitchRule,
    SwitchState,
};
use crate::protocol::{commands, BlobMode, OutboundBlob, XmlElement};
use crate::registry::{Device, Registry};
use crate::transport::ServerStream;

use listener::Notification;
use policy::BlobPolicies;
use receiver::Receiver;
use state::Session;

/// Name of the standard connection switch every driver exposes.
const CONNECTION_PROPERTY: &str = "CONNECTION";

/// State shared between the API and the receive thread.
pub(crate) struct Shared {
    pub config: ClientConfig,
    pub session: Session,
    pub registry: Mutex<Registry>,
    pub policies: Mutex<BlobPolicies>,
    pub attachments: Arc<AttachmentTable>,
    listener: RwLock<Arc<dyn ClientListener>>,
    writer: Mutex<Option<Arc<ServerStream>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: Session::new(),
            registry: Mutex::new(Registry::new()),
            policies: Mutex::new(BlobPolicies::new()),
            attachments: Arc::new(AttachmentTable::new()),
            listener: RwLock::new(Arc::new(NullListener)),
            writer: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    pub fn listener(&self) -> Arc<dyn ClientListener> {
        Arc::clone(&self.listener.read())
    }

    pub fn set_listener(&self, listener: Arc<dyn ClientListener>) {
        *self.listener.write() = listener;
    }

    pub fn notify(&self, notes: Vec<Notification>) {
        if notes.is_empty() {
            return;
        }
        let listener = self.listener();
        for note in &notes {
            note.deliver(listener.as_ref());
        }
    }

    pub fn set_writer(&self, stream: Option<Arc<ServerStream>>) {
        *self.writer.lock() = stream;
    }

    /// Serialize and send one command.
    ///
    /// The document is rendered before the writer lock is taken; only the
    /// socket write is serialized. A failed write brings the connection down.
    pub fn send_command(&self, command: &XmlElement) -> Result<()> {
        let text = format!("{}\n", command);
        if self.config.verbose {
            log::trace!("[indi-client] -> {}", command);
        }

        let writer = self.writer.lock();
        let Some(stream) = writer.as_ref() else {
            return Err(Error::NotConnected);
        };
        if let Err(e) = stream.send_all(text.as_bytes()) {
            drop(writer);
            log::error!("[indi-client] write failed: {}", e);
            self.session.request_disconnect(ABNORMAL_EXIT);
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

/// INDI client.
///
/// Owns one connection at a time. All methods take `&self` and may be
/// called from any thread, including from inside listener callbacks.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use indi_client::{Client, ClientConfig, ClientListener, Property};
///
/// struct Printer;
///
/// impl ClientListener for Printer {
///     fn on_update_property(&self, p: &Property) {
///         println!("{}.{} is {}", p.device, p.name, p.state);
///     }
/// }
///
/// let client = Client::new(ClientConfig::default())?.with_listener(Arc::new(Printer));
/// client.watch_device("Focuser");
/// client.connect()?;
/// # Ok::<(), indi_client::Error>(())
/// ```
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        Ok(Self {
            shared: Arc::new(Shared::new(config)),
        })
    }

    pub fn with_listener(self, listener: Arc<dyn ClientListener>) -> Self {
        self.set_listener(listener);
        self
    }

    pub fn set_listener(&self, listener: Arc<dyn ClientListener>) {
        self.shared.set_listener(listener);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    // ========================================================================
    // Watch list
    // ========================================================================

    /// Only receive `device` (and any other watched devices).
    ///
    /// Filtering applies immediately; the server is told on the next connect.
    pub fn watch_device(&self, device: &str) {
        self.shared.registry.lock().watch_mut().watch_device(device, None);
    }

    /// Like [`watch_device`](Self::watch_device), calling `on_device` the
    /// first time the device is defined.
    pub fn watch_device_with<F>(&self, device: &str, on_device: F)
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.shared
            .registry
            .lock()
            .watch_mut()
            .watch_device(device, Some(Arc::new(on_device)));
    }

    pub fn watch_property(&self, device: &str, property: &str) {
        self.shared
            .registry
            .lock()
            .watch_mut()
            .watch_property(device, property);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect to the configured endpoint and start the receive thread.
    ///
    /// Returns once the receive thread has taken over the connection.
    pub fn connect(&self) -> Result<()> {
        self.shared.session.begin_connect()?;
        let endpoint = &self.shared.config.endpoint;
        log::debug!("[indi-client] connecting to {}", endpoint);

        let stream = match ServerStream::connect(endpoint, self.shared.config.connect_timeout) {
            Ok(s) => s,
            Err(e) => {
                self.shared.session.abort_connect();
                log::warn!("[indi-client] {}", e);
                return Err(e);
            }
        };
        self.start(stream)
    }

    /// Run a connection over an already established stream.
    pub fn connect_with(&self, stream: impl Into<ServerStream>) -> Result<()> {
        self.shared.session.begin_connect()?;
        self.start(stream.into())
    }

    /// [`connect`](Self::connect) reporting only success.
    pub fn connect_server(&self) -> bool {
        self.connect().is_ok()
    }

    fn start(&self, stream: ServerStream) -> Result<()> {
        self.reap_receiver();

        let receiver = match Receiver::new(Arc::clone(&self.shared), stream) {
            Ok(r) => r,
            Err(e) => {
                self.shared.set_writer(None);
                self.shared.session.abort_connect();
                return Err(Error::Io(e));
            }
        };
        let handle = match receiver.spawn() {
            Ok(h) => h,
            Err(e) => {
                self.shared.set_writer(None);
                self.shared.session.abort_connect();
                return Err(Error::Io(e));
            }
        };
        *self.shared.receiver.lock() = Some(handle);
        self.await_start(self.shared.config.connect_timeout)
    }

    /// Wait for the receive thread to leave `Connecting`; cancel it on timeout.
    fn await_start(&self, timeout: Duration) -> Result<()> {
        let started = self
            .shared
            .session
            .wait_for(timeout, |s| s != ConnectionState::Connecting);
        if !started && self.shared.session.cancel_connect() {
            log::warn!("[indi-client] receive thread did not start within {:?}", timeout);
            self.join_receiver();
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Disconnect with exit code 0. See [`disconnect_with_code`](Self::disconnect_with_code).
    pub fn disconnect(&self) -> bool {
        self.disconnect_with_code(0)
    }

    /// Request disconnection and wait for teardown to finish.
    ///
    /// Returns false when there was no connection to close, including when
    /// another thread's request won. Called from a listener callback, the
    /// request is recorded and teardown happens once the callback returns.
    pub fn disconnect_with_code(&self, code: i32) -> bool {
        if !self.shared.session.request_disconnect(code) {
            return false;
        }
        log::debug!("[indi-client] disconnect requested ({})", code);
        self.join_receiver();
        true
    }

    pub fn is_connected(&self) -> bool {
        self.shared.session.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session.state()
    }

    /// Block until the connection is fully torn down.
    pub fn wait_disconnected(&self, timeout: Duration) -> bool {
        self.shared
            .session
            .wait_for(timeout, |s| s == ConnectionState::Disconnected)
    }

    /// Join the receive thread unless we are on it.
    fn join_receiver(&self) {
        let Some(handle) = self.shared.receiver.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            *self.shared.receiver.lock() = Some(handle);
            return;
        }
        if handle.join().is_err() {
            log::error!("[indi-client] receive thread panicked");
        }
    }

    /// Collect a receive thread left over from a previous connection.
    fn reap_receiver(&self) {
        let finished = self
            .shared
            .receiver
            .lock()
            .as_ref()
            .is_some_and(|h| h.is_finished());
        if finished {
            self.join_receiver();
        }
    }

    // ========================================================================
    // Registry snapshots
    // ========================================================================

    pub fn device(&self, name: &str) -> Option<Device> {
        self.shared.registry.lock().device(name).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.shared.registry.lock().devices().to_vec()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.shared
            .registry
            .lock()
            .devices()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn property(&self, device: &str, name: &str) -> Option<Property> {
        self.shared.registry.lock().property(device, name).cloned()
    }

    // ========================================================================
    // Outbound commands
    // ========================================================================

    /// Ask the server for definitions: everything, one device or one property.
    pub fn send_get_properties(&self, device: Option<&str>, property: Option<&str>) -> Result<()> {
        self.shared
            .send_command(&commands::get_properties(device, property))
    }

    pub fn send_ping_request(&self, uid: &str) -> Result<()> {
        self.shared.send_command(&commands::ping_request(uid))
    }

    pub fn send_ping_reply(&self, uid: &str) -> Result<()> {
        self.shared.send_command(&commands::ping_reply(uid))
    }

    /// Send the element values of `property` as a `new*Vector`.
    pub fn send_new_property(&self, property: &Property) -> Result<()> {
        if property.kind == PropertyKind::Light {
            return Err(Error::KindMismatch {
                device: property.device.clone(),
                property: property.name.clone(),
                expected: "writable",
            });
        }
        self.shared.send_command(&commands::new_vector(property))
    }

    /// Set one text element and send the property.
    pub fn send_new_text(&self, device: &str, property: &str, element: &str, value: &str) -> Result<()> {
        let snapshot = self.modify(device, property, PropertyKind::Text, element, |e, _| {
            e.value = ElementValue::Text(value.to_string());
        })?;
        self.send_new_property(&snapshot)
    }

    /// Set one number element and send the property.
    pub fn send_new_number(&self, device: &str, property: &str, element: &str, value: f64) -> Result<()> {
        let snapshot = self.modify(device, property, PropertyKind::Number, element, |e, _| {
            if let ElementValue::Number(n) = &mut e.value {
                n.value = value.to_string();
            }
        })?;
        self.send_new_property(&snapshot)
    }

    /// Set one switch and send the property.
    ///
    /// Turning a switch On in a OneOfMany or AtMostOne vector turns the
    /// others Off.
    pub fn send_new_switch(&self, device: &str, property: &str, element: &str, state: SwitchState) -> Result<()> {
        let snapshot = self.modify_switch(device, property, element, state)?;
        self.send_new_property(&snapshot)
    }

    /// Upload BLOBs inline.
    pub fn send_new_blob(&self, device: &str, property: &str, blobs: &[OutboundBlob<'_>]) -> Result<()> {
        self.shared
            .send_command(&commands::new_blob_vector(device, property, blobs, None))
    }

    /// Turn the device's `CONNECTION` switch to `CONNECT`.
    ///
    /// Nothing is sent when the device already reports that state.
    pub fn connect_device(&self, device: &str) -> Result<()> {
        self.set_connection(device, "CONNECT")
    }

    pub fn disconnect_device(&self, device: &str) -> Result<()> {
        self.set_connection(device, "DISCONNECT")
    }

    fn set_connection(&self, device: &str, element: &str) -> Result<()> {
        let current = self
            .property(device, CONNECTION_PROPERTY)
            .and_then(|p| p.element(element).and_then(Element::as_switch));
        if current == Some(SwitchState::On) {
            return Ok(());
        }
        self.send_new_switch(device, CONNECTION_PROPERTY, element, SwitchState::On)
    }

    fn modify_switch(&self, device: &str, property: &str, element: &str, state: SwitchState) -> Result<Property> {
        self.modify(device, property, PropertyKind::Switch, element, |_, p| {
            let exclusive = matches!(p.rule, Some(SwitchRule::OneOfMany | SwitchRule::AtMostOne));
            for e in p.elements.iter_mut() {
                if e.name == element {
                    e.value = ElementValue::Switch(state);
                } else if exclusive && state == SwitchState::On {
                    e.value = ElementValue::Switch(SwitchState::Off);
                }
            }
        })
    }

    /// Apply `change` to the registry copy of a property, mark it Busy and
    /// return a snapshot to send.
    ///
    /// `change` receives a scratch element and the property itself; most
    /// callers only touch the element, which is written back by name.
    fn modify(
        &self,
        device: &str,
        property: &str,
        kind: PropertyKind,
        element: &str,
        change: impl FnOnce(&mut Element, &mut Property),
    ) -> Result<Property> {
        let mut registry = self.shared.registry.lock();
        let Some(dev) = registry.device_mut(device) else {
            return Err(Error::DeviceNotFound(device.to_string()));
        };
        let Some(p) = dev.property_mut(property) else {
            return Err(Error::PropertyNotFound {
                device: device.to_string(),
                property: property.to_string(),
            });
        };
        if p.kind != kind {
            return Err(Error::KindMismatch {
                device: device.to_string(),
                property: property.to_string(),
                expected: kind.as_str(),
            });
        }
        let Some(mut scratch) = p.element(element).cloned() else {
            return Err(Error::ElementNotFound {
                device: device.to_string(),
                property: property.to_string(),
                element: element.to_string(),
            });
        };

        let before = scratch.clone();
        change(&mut scratch, p);
        if scratch != before {
            if let Some(slot) = p.element_mut(element) {
                *slot = scratch;
            }
        }
        p.state = PropertyState::Busy;
        Ok(p.clone())
    }

    // ========================================================================
    // BLOBs
    // ========================================================================

    /// Choose whether the server sends BLOBs for a device or one property.
    ///
    /// `enableBLOB` is only sent when the mode actually changes.
    pub fn set_blob_mode(&self, mode: BlobMode, device: &str, property: Option<&str>) -> Result<()> {
        let changed = self.shared.policies.lock().set_mode(device, property, mode);
        if !changed || !self.is_connected() {
            return Ok(());
        }
        self.shared
            .send_command(&commands::enable_blob(device, property, mode))
    }

    pub fn blob_mode(&self, device: &str, property: Option<&str>) -> BlobMode {
        self.shared.policies.lock().mode(device, property)
    }

    /// Accept read-only mappings of the sender's memory for these BLOBs.
    pub fn allow_direct_blob(&self, device: &str, property: Option<&str>) {
        self.shared.policies.lock().allow_direct(device, property);
    }

    /// Redeem an attached BLOB.
    ///
    /// Ownership of the descriptor moves to the returned buffer; the id
    /// cannot be attached twice.
    pub fn attach_blob(&self, id: AttachmentId) -> Result<BlobBuffer> {
        let fd = self
            .shared
            .attachments
            .take(id)
            .ok_or(Error::AttachmentNotFound(id))?;

        let actual = std::fs::File::from(fd.try_clone()?).metadata()?.len() as usize;
        let (len, direct) = match self.find_attachment(id) {
            Some((declared, direct)) if declared > actual => {
                log::warn!(
                    "[indi-blob] attachment {} declares {} bytes, descriptor holds {}",
                    id,
                    declared,
                    actual
                );
                (actual, direct)
            }
            Some(found) => found,
            None => (actual, false),
        };
        BlobBuffer::from_fd(fd, len, direct).map_err(|e| Error::Blob(format!("attachment {}: {}", id, e)))
    }

    /// Declared size and direct flag of the element referencing `id`.
    fn find_attachment(&self, id: AttachmentId) -> Option<(usize, bool)> {
        let registry = self.shared.registry.lock();
        registry
            .devices()
            .iter()
            .flat_map(Device::properties)
            .flat_map(|p| p.elements.iter())
            .filter_map(Element::as_blob)
            .find_map(|b| match b.data {
                BlobData::Attached { id: found, direct } if found == id => Some((b.size, direct)),
                _ => None,
            })
    }

    /// Close an attachment without reading it.
    pub fn release_blob(&self, id: AttachmentId) -> bool {
        self.shared.attachments.release(id)
    }

    /// Attachments received but neither attached nor released yet.
    pub fn pending_attachments(&self) -> usize {
        self.shared.attachments.len()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
        self.join_receiver();
        self.shared.attachments.clear();
    }
}
