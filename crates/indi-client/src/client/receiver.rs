// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receive thread.
//!
//! Waits on the server socket and the wake pipe with `mio::Poll`. Readiness
//! is edge-triggered, so every wakeup drains the socket until `WouldBlock`.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::blob::BlobCorrelator;
use crate::protocol::{commands, StreamParser};
use crate::transport::{ServerStream, WakePipe};

use super::dispatcher;
use super::Shared;

// ============================================================================
// Constants
// ============================================================================

/// Token for the server socket
const STREAM_TOKEN: Token = Token(0);

/// Token for the wake pipe
const WAKE_TOKEN: Token = Token(1);

/// Maximum events to process per poll
const MAX_EVENTS: usize = 8;

pub(crate) struct Receiver {
    shared: Arc<Shared>,
    stream: Arc<ServerStream>,
    wake: Arc<WakePipe>,
    poll: Poll,
    parser: StreamParser,
    correlator: BlobCorrelator,
    buf: Vec<u8>,
    fds: Vec<OwnedFd>,
}

impl Receiver {
    /// Register `stream` and a fresh wake pipe, and publish both.
    pub fn new(shared: Arc<Shared>, stream: ServerStream) -> io::Result<Self> {
        let poll = Poll::new()?;
        let wake = Arc::new(WakePipe::new()?);

        if !stream.supports_fd_passing() {
            log::debug!("[indi-client] TCP connection: attached BLOBs arrive inline only");
        }

        let stream_fd = stream.as_raw_fd();
        let wake_fd = wake.reader_fd();
        poll.registry()
            .register(&mut SourceFd(&stream_fd), STREAM_TOKEN, Interest::READABLE)?;
        poll.registry()
            .register(&mut SourceFd(&wake_fd), WAKE_TOKEN, Interest::READABLE)?;

        let stream = Arc::new(stream);
        shared.set_writer(Some(Arc::clone(&stream)));
        shared.session.set_wake(Arc::clone(&wake));

        let parser = StreamParser::with_max_document_size(shared.config.max_document_size);
        let buf = vec![0u8; shared.config.read_buffer_size];
        Ok(Self {
            shared,
            stream,
            wake,
            poll,
            parser,
            correlator: BlobCorrelator::new(),
            buf,
            fds: Vec::new(),
        })
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("indi-client-rx".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        if !self.shared.session.mark_connected() {
            log::debug!("[indi-client] connect cancelled before start");
            self.shared.session.begin_teardown();
            self.teardown();
            return;
        }
        log::info!("[indi-client] connected to {}", self.shared.config.endpoint);
        self.shared.listener().on_server_connected();
        self.send_interest();

        self.event_loop();

        let code = self.shared.session.begin_teardown();
        self.teardown();
        log::info!("[indi-client] disconnected (exit code {})", code);
        self.shared.listener().on_server_disconnected(code);
    }

    /// Announce the watch list to the server, then the BLOB modes chosen
    /// so far.
    fn send_interest(&self) {
        let interest = self.shared.registry.lock().watch().interest();
        let mut pending: Vec<_> = interest
            .iter()
            .map(|q| commands::get_properties(q.device.as_deref(), q.property.as_deref()))
            .collect();

        let modes = self.shared.policies.lock().recorded();
        pending.extend(
            modes
                .iter()
                .map(|(device, property, mode)| commands::enable_blob(device, property.as_deref(), *mode)),
        );

        for cmd in &pending {
            if self.shared.send_command(cmd).is_err() {
                return;
            }
        }
    }

    fn event_loop(&mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);

        loop {
            if self.shared.session.disconnect_requested() {
                return;
            }

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[indi-client] poll failed: {}", e);
                return;
            }

            for event in events.iter() {
                match event.token() {
                    WAKE_TOKEN => {
                        self.wake.drain();
                    }
                    STREAM_TOKEN => {
                        if !self.read_available() {
                            return;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Drain the socket. False once the connection is finished.
    fn read_available(&mut self) -> bool {
        loop {
            match self.stream.recv(&mut self.buf, &mut self.fds) {
                Ok(0) => {
                    log::info!("[indi-client] server closed the connection");
                    return false;
                }
                Ok(n) => {
                    if !self.fds.is_empty() {
                        log::trace!("[indi-client] {} descriptors received", self.fds.len());
                        self.correlator.push_fds(self.fds.drain(..));
                    }
                    self.parser.feed(&self.buf[..n]);
                    if !self.dispatch_pending() {
                        return false;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("[indi-client] read failed: {}", e);
                    return false;
                }
            }
        }
    }

    /// Dispatch every complete document. False on a framing error or when a
    /// disconnect was requested meanwhile.
    fn dispatch_pending(&mut self) -> bool {
        loop {
            if self.shared.session.disconnect_requested() {
                return false;
            }
            match self.parser.next_document() {
                Ok(Some(doc)) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        dispatcher::dispatch(&self.shared, &mut self.correlator, doc)
                    }));
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.is_benign() => log::debug!("[indi-client] {}", e),
                        Ok(Err(e)) => log::warn!("[indi-client] dispatch error {}: {}", e.code(), e),
                        Err(_) => log::error!("[indi-client] document handler panicked, skipped"),
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    log::error!("[indi-client] stream framing lost: {}", e);
                    return false;
                }
            }
        }
    }

    /// Close the socket and drop all per-connection state.
    fn teardown(&mut self) {
        self.stream.close();
        self.parser.reset();
        self.correlator.clear();

        let devices = {
            let mut registry = self.shared.registry.lock();
            let count = registry.len();
            registry.clear();
            count
        };
        let attachments = self.shared.attachments.clear();
        log::debug!(
            "[indi-client] cleared {} devices, {} attachments",
            devices,
            attachments
        );

        self.shared.set_writer(None);
        self.shared.session.finish_disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use crate::config::ClientConfig;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn shared() -> Arc<Shared> {
        Arc::new(Shared::new(ClientConfig::default()))
    }

    #[test]
    fn test_tokens() {
        assert_eq!(STREAM_TOKEN, Token(0));
        assert_eq!(WAKE_TOKEN, Token(1));
    }

    #[test]
    fn test_runs_until_eof() {
        let shared = shared();
        shared.session.begin_connect().unwrap();
        let (client, mut server) = UnixStream::pair().unwrap();

        let handle = Receiver::new(Arc::clone(&shared), client.into())
            .unwrap()
            .spawn()
            .unwrap();
        assert!(shared
            .session
            .wait_for(Duration::from_secs(5), |s| s == ConnectionState::Connected));

        let mut buf = [0u8; 128];
        let n = server.read(&mut buf).unwrap();
        assert!(buf[..n].starts_with(b"<getProperties version='1.7'/>"));

        drop(server);
        handle.join().unwrap();
        assert_eq!(shared.session.state(), ConnectionState::Disconnected);
        assert!(shared.registry.lock().is_empty());
    }

    #[test]
    fn test_wakes_on_request() {
        let shared = shared();
        shared.session.begin_connect().unwrap();
        let (client, _server) = UnixStream::pair().unwrap();

        let handle = Receiver::new(Arc::clone(&shared), client.into())
            .unwrap()
            .spawn()
            .unwrap();
        assert!(shared
            .session
            .wait_for(Duration::from_secs(5), |s| s == ConnectionState::Connected));

        assert!(shared.session.request_disconnect(0));
        handle.join().unwrap();
        assert_eq!(shared.session.state(), ConnectionState::Disconnected);
    }
}
