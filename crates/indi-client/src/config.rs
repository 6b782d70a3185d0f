// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default INDI server TCP port.
pub const DEFAULT_PORT: u16 = 7624;

/// Default INDI server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default path of the server's local UNIX socket.
pub const DEFAULT_UNIX_SOCKET: &str = "/tmp/indiserver";

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default receive buffer size (one transport read).
pub const DEFAULT_READ_BUFFER: usize = 49_152;

/// Default upper bound for a single top-level document.
pub const DEFAULT_MAX_DOCUMENT: usize = 64 * 1024 * 1024;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Local UNIX stream socket. Required for attached BLOBs.
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Connection settings for [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint (default: `localhost:7624`)
    pub endpoint: Endpoint,

    /// Connect timeout (default: 3s)
    pub connect_timeout: Duration,

    /// Log every inbound document and outbound command at trace level
    pub verbose: bool,

    /// Bytes requested per transport read
    pub read_buffer_size: usize,

    /// Largest accepted top-level document; larger ones are framing errors
    pub max_document_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verbose: false,
            read_buffer_size: DEFAULT_READ_BUFFER,
            max_document_size: DEFAULT_MAX_DOCUMENT,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `INDISERVER` and `INDIPORT`.
    ///
    /// `INDISERVER` is either `host`, `host:port`, or an absolute path to a
    /// UNIX socket.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(server) = std::env::var("INDISERVER") {
            config = config.with_server_spec(&server);
        }
        if let Some(port) = std::env::var("INDIPORT")
            .ok()
            .and_then(|p| p.trim().parse::<u16>().ok())
        {
            if let Endpoint::Tcp { host, .. } = config.endpoint {
                config.endpoint = Endpoint::Tcp { host, port };
            }
        }
        config
    }

    /// Apply a `host[:port]` or `/path` server spec.
    pub fn with_server_spec(mut self, spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() {
            return self;
        }
        if spec.starts_with('/') {
            self.endpoint = Endpoint::Unix(PathBuf::from(spec));
            return self;
        }
        self.endpoint = match spec.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                },
                Err(_) => Endpoint::Tcp {
                    host: spec.to_string(),
                    port: DEFAULT_PORT,
                },
            },
            None => Endpoint::Tcp {
                host: spec.to_string(),
                port: DEFAULT_PORT,
            },
        };
        self
    }

    /// Connect over TCP.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Endpoint::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    /// Connect over a UNIX socket.
    pub fn with_unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.endpoint = Endpoint::Unix(path.into());
        self
    }

    /// Set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable trace logging of protocol traffic.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the maximum document size.
    pub fn with_max_document_size(mut self, size: usize) -> Self {
        self.max_document_size = size;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        match &self.endpoint {
            Endpoint::Tcp { host, port } => {
                if host.is_empty() {
                    return Err("host cannot be empty");
                }
                if *port == 0 {
                    return Err("port cannot be 0");
                }
            }
            Endpoint::Unix(path) => {
                if path.as_os_str().is_empty() {
                    return Err("unix socket path cannot be empty");
                }
            }
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be > 0");
        }
        if self.max_document_size == 0 {
            return Err("max_document_size must be > 0");
        }
        Ok(())
    }
}
