// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers: an in-process fake server and a recording listener.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::mem;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use indi_client::{Client, ClientListener, Device, Element, Property};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const DEF_ABS: &str = r#"<defNumberVector device="Foc" name="ABS" state="Idle" perm="rw"><defNumber name="POS" format="%6.0f" min="0" max="60000" step="10">0</defNumber></defNumberVector>"#;
pub const SET_ABS: &str = r#"<setNumberVector device="Foc" name="ABS" state="Busy"><oneNumber name="POS">1000</oneNumber></setNumberVector>"#;
pub const DEF_CCD1: &str = r#"<defBLOBVector device="CCD" name="CCD1" perm="ro"><defBLOB name="IMG"/></defBLOBVector>"#;

/// Server end of a socket pair connected to a client.
pub struct FakeServer {
    pub sock: UnixStream,
}

impl FakeServer {
    /// Connect `client` over a fresh socket pair.
    pub fn attach(client: &Client) -> Self {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        client.connect_with(client_end).unwrap();
        server_end.set_read_timeout(Some(TIMEOUT)).unwrap();
        Self { sock: server_end }
    }

    pub fn send(&self, xml: &str) {
        (&self.sock).write_all(xml.as_bytes()).unwrap();
    }

    /// Send `xml` in one `sendmsg` with `fds` attached as SCM_RIGHTS.
    pub fn send_with_fds(&self, xml: &str, fds: &[&dyn AsFd]) {
        let raw: Vec<libc::c_int> = fds.iter().map(|f| f.as_fd().as_raw_fd()).collect();
        let payload = mem::size_of_val(raw.as_slice()) as u32;
        let mut iov = libc::iovec {
            iov_base: xml.as_ptr() as *mut _,
            iov_len: xml.len(),
        };

        // SAFETY: msg, iov and cmsg_buf outlive the sendmsg call; the control
        // buffer is large enough for one SCM_RIGHTS header plus `raw`.
        unsafe {
            let space = libc::CMSG_SPACE(payload) as usize;
            let mut cmsg_buf = vec![0u64; space.div_ceil(8)];
            let mut msg: libc::msghdr = mem::zeroed();
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
            msg.msg_controllen = space as _;
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(payload) as _;
            std::ptr::copy_nonoverlapping(raw.as_ptr(), libc::CMSG_DATA(cmsg) as *mut libc::c_int, raw.len());
            let sent = libc::sendmsg(self.sock.as_raw_fd(), &msg, 0);
            assert_eq!(sent, xml.len() as isize);
        }
    }

    /// Read commands until `needle` shows up; returns everything read.
    pub fn read_until(&self, needle: &str) -> String {
        let deadline = Instant::now() + TIMEOUT;
        let mut out = String::new();
        let mut buf = [0u8; 4096];
        while !out.contains(needle) {
            assert!(Instant::now() < deadline, "timed out waiting for {:?}, got {:?}", needle, out);
            let n = (&self.sock).read(&mut buf).unwrap();
            assert!(n > 0, "client closed the stream while waiting for {:?}", needle);
            out.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        out
    }
}

/// A descriptor and a witness end that reports when it has been closed.
pub fn witness_pair() -> (UnixStream, UnixStream) {
    UnixStream::pair().unwrap()
}

pub fn is_closed(witness: &UnixStream) -> bool {
    witness.set_nonblocking(true).unwrap();
    let mut buf = [0u8; 1];
    matches!((&*witness).read(&mut buf), Ok(0))
}

/// Poll `cond` until it holds or the timeout elapses.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Listener that records every callback as a line of text.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    changed: Condvar,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }

    /// Wait until an event equal to `event` has been recorded.
    pub fn wait_for(&self, event: &str) -> bool {
        self.wait_matching(|e| e == event)
    }

    pub fn wait_matching(&self, pred: impl Fn(&str) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        let mut events = self.events.lock();
        while !events.iter().any(|e| pred(e)) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return events.iter().any(|e| pred(e));
            }
        }
        true
    }
}

impl ClientListener for Recorder {
    fn on_new_device(&self, device: &Device) {
        self.push(format!("new-device {}", device.name()));
    }
    fn on_remove_device(&self, device: &Device) {
        self.push(format!("remove-device {}", device.name()));
    }
    fn on_new_property(&self, p: &Property) {
        self.push(format!("new-property {}.{}", p.device, p.name));
    }
    fn on_remove_property(&self, p: &Property) {
        self.push(format!("remove-property {}.{}", p.device, p.name));
    }
    fn on_update_property(&self, p: &Property) {
        self.push(format!("update {}.{}", p.device, p.name));
    }
    fn on_new_blob(&self, p: &Property, e: &Element) {
        self.push(format!("blob {}.{}.{}", p.device, p.name, e.name));
    }
    fn on_message(&self, device: Option<&str>, message: &str) {
        self.push(format!("message {} {}", device.unwrap_or("-"), message));
    }
    fn on_ping_reply(&self, uid: &str) {
        self.push(format!("pong {}", uid));
    }
    fn on_server_connected(&self) {
        self.push("connected".to_string());
    }
    fn on_server_disconnected(&self, exit_code: i32) {
        self.push(format!("disconnected {}", exit_code));
    }
}
