// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                      |                                          ^
//!                      +------------- (connect failed) -----------+
//! ```
//!
//! One lock guards the transition only; no I/O happens under it. The
//! `connected` flag mirrors `Connected` for lock-free reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::transport::WakePipe;

/// Exit code reported when the stream ended without a disconnect request.
pub const ABNORMAL_EXIT: i32 = -1;

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    exit_code: i32,
    wake: Option<Arc<WakePipe>>,
    receiver: Option<ThreadId>,
}

#[derive(Debug, Default)]
pub(crate) struct Session {
    inner: Mutex<Inner>,
    changed: Condvar,
    connected: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Disconnected -> Connecting.
    pub fn begin_connect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disconnected {
            return Err(Error::AlreadyConnected);
        }
        inner.state = ConnectionState::Connecting;
        inner.exit_code = 0;
        Ok(())
    }

    /// Connecting -> Disconnected, nothing was started.
    pub fn abort_connect(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
            inner.wake = None;
            self.changed.notify_all();
        }
    }

    /// Install the pipe used to interrupt the receive loop.
    pub fn set_wake(&self, wake: Arc<WakePipe>) {
        self.inner.lock().wake = Some(wake);
    }

    /// Connecting -> Connected. Called on the receive thread.
    ///
    /// False when the connect was cancelled before the thread got here.
    pub fn mark_connected(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.receiver = Some(thread::current().id());
        let ok = inner.state == ConnectionState::Connecting;
        if ok {
            inner.state = ConnectionState::Connected;
            self.connected.store(true, Ordering::Release);
        }
        self.changed.notify_all();
        ok
    }

    /// Connecting -> Disconnecting when the caller gave up waiting.
    pub fn cancel_connect(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connecting {
            return false;
        }
        inner.state = ConnectionState::Disconnecting;
        inner.exit_code = ABNORMAL_EXIT;
        if let Some(wake) = &inner.wake {
            wake.wake();
        }
        self.changed.notify_all();
        true
    }

    /// Connected -> Disconnecting, waking the receive loop.
    ///
    /// Returns false if no connection was up or another caller got there
    /// first; only the winner's `code` is reported.
    pub fn request_disconnect(&self, code: i32) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return false;
        }
        inner.state = ConnectionState::Disconnecting;
        inner.exit_code = code;
        self.connected.store(false, Ordering::Release);
        if let Some(wake) = &inner.wake {
            wake.wake();
        }
        self.changed.notify_all();
        true
    }

    pub fn disconnect_requested(&self) -> bool {
        self.inner.lock().state == ConnectionState::Disconnecting
    }

    /// Enter teardown from the receive loop and return the exit code.
    ///
    /// A loop that ended without a request (EOF, read or framing error)
    /// reports [`ABNORMAL_EXIT`].
    pub fn begin_teardown(&self) -> i32 {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disconnecting {
            inner.state = ConnectionState::Disconnecting;
            inner.exit_code = ABNORMAL_EXIT;
            self.connected.store(false, Ordering::Release);
            self.changed.notify_all();
        }
        inner.exit_code
    }

    /// Disconnecting -> Disconnected, after all state has been cleared.
    pub fn finish_disconnect(&self) {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Disconnected;
        inner.wake = None;
        inner.receiver = None;
        self.connected.store(false, Ordering::Release);
        self.changed.notify_all();
    }

    /// True when called from the receive thread of the current connection.
    pub fn on_receiver_thread(&self) -> bool {
        self.inner.lock().receiver == Some(thread::current().id())
    }

    /// Block until `done` holds for the current state or `timeout` elapses.
    ///
    /// Returns whether the condition was met.
    pub fn wait_for(&self, timeout: Duration, done: impl Fn(ConnectionState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !done(inner.state) {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return done(inner.state);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = Session::new();
        s.begin_connect().unwrap();
        assert_eq!(s.state(), ConnectionState::Connecting);
        assert!(!s.is_connected());

        assert!(s.mark_connected());
        assert!(s.is_connected());
        assert!(s.on_receiver_thread());

        assert!(s.request_disconnect(0));
        assert!(!s.is_connected());
        assert!(s.disconnect_requested());
        assert_eq!(s.begin_teardown(), 0);

        s.finish_disconnect();
        assert_eq!(s.state(), ConnectionState::Disconnected);
        assert!(!s.on_receiver_thread());
    }

    #[test]
    fn test_connect_rejected_while_busy() {
        let s = Session::new();
        s.begin_connect().unwrap();
        assert!(matches!(s.begin_connect(), Err(Error::AlreadyConnected)));
        s.mark_connected();
        assert!(matches!(s.begin_connect(), Err(Error::AlreadyConnected)));
        assert_eq!(s.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_abort_connect() {
        let s = Session::new();
        s.begin_connect().unwrap();
        s.abort_connect();
        assert_eq!(s.state(), ConnectionState::Disconnected);
        s.begin_connect().unwrap();
    }

    #[test]
    fn test_cancelled_connect() {
        let s = Session::new();
        s.begin_connect().unwrap();
        assert!(s.cancel_connect());
        assert!(!s.mark_connected());
        assert!(!s.is_connected());
        assert_eq!(s.begin_teardown(), ABNORMAL_EXIT);
        s.finish_disconnect();
        assert_eq!(s.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_single_disconnect_winner() {
        let s = Session::new();
        s.begin_connect().unwrap();
        s.mark_connected();

        assert!(s.request_disconnect(7));
        assert!(!s.request_disconnect(9));
        assert_eq!(s.begin_teardown(), 7);
    }

    #[test]
    fn test_abnormal_teardown() {
        let s = Session::new();
        s.begin_connect().unwrap();
        s.mark_connected();
        assert_eq!(s.begin_teardown(), ABNORMAL_EXIT);
        assert!(!s.is_connected());
        assert!(!s.request_disconnect(0));
    }

    #[test]
    fn test_request_wakes_pipe() {
        let s = Session::new();
        let wake = Arc::new(WakePipe::new().unwrap());
        s.begin_connect().unwrap();
        s.set_wake(Arc::clone(&wake));
        s.mark_connected();

        assert!(s.request_disconnect(0));
        assert_eq!(wake.drain(), 1);
    }

    #[test]
    fn test_wait_for_other_thread() {
        let s = Arc::new(Session::new());
        s.begin_connect().unwrap();

        let s2 = Arc::clone(&s);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            s2.mark_connected();
        });

        assert!(s.wait_for(Duration::from_secs(5), |st| st != ConnectionState::Connecting));
        assert_eq!(s.state(), ConnectionState::Connected);
        t.join().unwrap();

        assert!(!s.wait_for(Duration::from_millis(10), |st| st == ConnectionState::Disconnected));
    }
}
