// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte stream to the INDI server.
//!
//! One socket, TCP or UNIX, read with `recvmsg` so that descriptors passed
//! as `SCM_RIGHTS` ancillary data come out alongside the bytes. The socket
//! stays in blocking mode for writes; reads use `MSG_DONTWAIT` and are driven
//! by readiness from the receive loop's `mio::Poll`.

use std::io::{self, Read, Write};
use std::mem;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::Endpoint;
use crate::error::{Error, Result};

/// Most descriptors accepted from a single `recvmsg`.
const MAX_FDS_PER_READ: usize = 16;

/// Control buffer length in words (keeps `cmsghdr` aligned).
const CMSG_WORDS: usize = cmsg_space(MAX_FDS_PER_READ) / mem::size_of::<usize>();

/// Connected server socket.
#[derive(Debug)]
pub enum ServerStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ServerStream {
    /// Connect to `endpoint`, giving up after `timeout`.
    ///
    /// Every resolved address is tried in turn; the last failure is reported.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let fail = |source: io::Error| Error::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        match endpoint {
            Endpoint::Tcp { host, port } => {
                let addrs = (host.as_str(), *port).to_socket_addrs().map_err(fail)?;
                let mut last_err =
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
                for addr in addrs {
                    let attempt = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                        .and_then(|socket| {
                            socket.connect_timeout(&addr.into(), timeout)?;
                            socket.set_nodelay(true)?;
                            Ok(socket)
                        });
                    match attempt {
                        Ok(socket) => {
                            log::debug!("[indi-transport] connected to {}", addr);
                            return Ok(Self::Tcp(TcpStream::from(socket)));
                        }
                        Err(e) => {
                            log::debug!("[indi-transport] {} failed: {}", addr, e);
                            last_err = e;
                        }
                    }
                }
                Err(fail(last_err))
            }
            Endpoint::Unix(path) => {
                let addr = SockAddr::unix(path).map_err(fail)?;
                let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(fail)?;
                socket.connect_timeout(&addr, timeout).map_err(fail)?;
                Ok(Self::Unix(UnixStream::from(OwnedFd::from(socket))))
            }
        }
    }

    /// True when the server can pass BLOB descriptors over this stream.
    pub fn supports_fd_passing(&self) -> bool {
        matches!(self, Self::Unix(_))
    }

    /// Read available bytes, appending any received descriptors to `fds`.
    ///
    /// Never blocks: returns `WouldBlock` when nothing is pending and `Ok(0)`
    /// at end of stream.
    pub fn recv(&self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        let mut cmsg_buf = [0usize; CMSG_WORDS];

        // SAFETY:
        // - msghdr is a POD type that can be safely zero-initialized
        // - All fields used by recvmsg are set below
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut _,
            iov_len: buf.len(),
        };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
        msg.msg_controllen = mem::size_of_val(&cmsg_buf) as _;

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        let flags = libc::MSG_DONTWAIT | libc::MSG_CMSG_CLOEXEC;
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        let flags = libc::MSG_DONTWAIT;

        // SAFETY:
        // - the raw fd is owned by self and open for the duration of the call
        // - msg points to a valid msghdr whose iovec covers `buf`
        //   and whose control buffer is `cmsg_buf`, both alive until return
        let ret = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, flags) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        collect_fds(&msg, fds);
        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            log::warn!("[indi-transport] ancillary data truncated, BLOB descriptors lost");
        }
        Ok(ret as usize)
    }

    /// Write the whole buffer (blocking).
    pub fn send_all(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(s) => (&*s).write_all(data),
            Self::Unix(s) => (&*s).write_all(data),
        }
    }

    /// Shut down both directions; wakes any reader.
    pub fn close(&self) {
        let res = match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        };
        if let Err(e) = res {
            if e.kind() != io::ErrorKind::NotConnected {
                log::debug!("[indi-transport] shutdown: {}", e);
            }
        }
    }
}

impl AsRawFd for ServerStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(s) => s.as_raw_fd(),
            Self::Unix(s) => s.as_raw_fd(),
        }
    }
}

impl From<UnixStream> for ServerStream {
    fn from(s: UnixStream) -> Self {
        Self::Unix(s)
    }
}

impl From<TcpStream> for ServerStream {
    fn from(s: TcpStream) -> Self {
        Self::Tcp(s)
    }
}

const fn cmsg_space(fds: usize) -> usize {
    // CMSG_SPACE is not const in libc; round header plus payload up to the
    // platform alignment by hand.
    let align = mem::size_of::<usize>();
    let header = (mem::size_of::<libc::cmsghdr>() + align - 1) & !(align - 1);
    let payload = (fds * mem::size_of::<libc::c_int>() + align - 1) & !(align - 1);
    header + payload
}

/// Take ownership of every `SCM_RIGHTS` descriptor in `msg`.
fn collect_fds(msg: &libc::msghdr, fds: &mut Vec<OwnedFd>) {
    // SAFETY:
    // - msg was populated by a successful recvmsg call
    // - CMSG_FIRSTHDR/CMSG_NXTHDR return NULL or pointers inside msg_control
    // - cmsg is only dereferenced after the null check
    // - each SCM_RIGHTS payload holds (cmsg_len - CMSG_LEN(0)) / sizeof(int)
    //   descriptors freshly installed in this process, so OwnedFd may own them
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg) as *const libc::c_int;
                let len = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                let count = len / mem::size_of::<libc::c_int>();
                for i in 0..count {
                    let fd = std::ptr::read_unaligned(data.add(i));
                    fds.push(OwnedFd::from_raw_fd(fd));
                }
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
}

/// Loopback descriptor pair used to interrupt the receive loop.
///
/// The read end is registered with the loop's poller; any thread may write
/// a byte to the other end to wake it.
#[derive(Debug)]
pub struct WakePipe {
    reader: UnixStream,
    writer: UnixStream,
}

impl WakePipe {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer })
    }

    /// Wake the poller. A full pipe already guarantees a pending wakeup.
    pub fn wake(&self) {
        match (&self.writer).write(&[1]) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => log::warn!("[indi-transport] wake failed: {}", e),
        }
    }

    /// Consume pending wake bytes, returning how many there were.
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; 64];
        let mut total = 0;
        while let Ok(n) = (&self.reader).read(&mut buf) {
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    }

    pub fn reader_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::fd::AsFd;

    /// Send `data` with `fds` attached as SCM_RIGHTS.
    pub(crate) fn send_with_fds(sock: &UnixStream, data: &[u8], fds: &[&dyn AsFd]) {
        let raw: Vec<libc::c_int> = fds.iter().map(|f| f.as_fd().as_raw_fd()).collect();
        let mut cmsg_buf = vec![0usize; cmsg_space(raw.len().max(1)) / mem::size_of::<usize>()];
        let mut iov = libc::iovec {
            iov_base: data.as_ptr() as *mut _,
            iov_len: data.len(),
        };
        unsafe {
            let mut msg: libc::msghdr = mem::zeroed();
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            if !raw.is_empty() {
                msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
                msg.msg_controllen = libc::CMSG_SPACE((raw.len() * mem::size_of::<libc::c_int>()) as u32) as _;
                let cmsg = libc::CMSG_FIRSTHDR(&msg);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len = libc::CMSG_LEN((raw.len() * mem::size_of::<libc::c_int>()) as u32) as _;
                std::ptr::copy_nonoverlapping(
                    raw.as_ptr(),
                    libc::CMSG_DATA(cmsg) as *mut libc::c_int,
                    raw.len(),
                );
            }
            let sent = libc::sendmsg(sock.as_raw_fd(), &msg, 0);
            assert_eq!(sent, data.len() as isize);
        }
    }

    #[test]
    fn test_recv_bytes_and_fds() {
        let (client, server) = UnixStream::pair().unwrap();
        let stream = ServerStream::from(client);
        let payload = tempfile::tempfile().unwrap();

        send_with_fds(&server, b"<a/>", &[&payload, &payload]);

        let mut buf = [0u8; 64];
        let mut fds = Vec::new();
        let n = stream.recv(&mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"<a/>");
        assert_eq!(fds.len(), 2);

        let err = stream.recv(&mut buf, &mut fds).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_recv_eof() {
        let (client, server) = UnixStream::pair().unwrap();
        let stream = ServerStream::from(client);
        drop(server);
        let mut buf = [0u8; 8];
        assert_eq!(stream.recv(&mut buf, &mut Vec::new()).unwrap(), 0);
    }

    #[test]
    fn test_send_all() {
        let (client, mut server) = UnixStream::pair().unwrap();
        let stream = ServerStream::from(client);
        stream.send_all(b"<getProperties version='1.7'/>\n").unwrap();
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).unwrap();
        assert!(buf[..n].starts_with(b"<getProperties"));
    }

    #[test]
    fn test_wake_pipe() {
        let pipe = WakePipe::new().unwrap();
        for _ in 0..10 {
            pipe.wake();
        }
        assert_eq!(pipe.drain(), 10);
        let mut buf = [0u8; 1];
        assert!((&pipe.reader).read(&mut buf).is_err());
    }

    #[test]
    fn test_fd_passing_only_over_unix() {
        let (client, _server) = UnixStream::pair().unwrap();
        assert!(ServerStream::from(client).supports_fd_passing());

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        assert!(!ServerStream::from(tcp).supports_fd_passing());
    }

    #[test]
    fn test_connect_refused() {
        let endpoint = Endpoint::Unix("/nonexistent/indiserver.sock".into());
        let err = ServerStream::connect(&endpoint, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }
}
