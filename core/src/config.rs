//! Engine configuration.
//!
//! # Design
//! `ConfigBuilder` accumulates optional settings on top of the defaults and
//! `build` hands back an immutable `Config`. The builder performs no
//! validation; the engine checks ranges when it initializes, so a bad value
//! keeps the engine from ever reaching `Ready`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_IO_THREADS: usize = 8;
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// Forward proxy every call is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    /// Proxy URL; IPv6 literals are bracketed.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Frozen engine tunables.
#[derive(Clone)]
pub struct Config {
    timeout: Duration,
    io_threads: usize,
    max_connections: usize,
    proxy: Option<Proxy>,
    default_headers: HashMap<String, String>,
    codec: Option<Arc<dyn Codec>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Bound on the whole call: waiting for a connection, connecting and
    /// the request itself.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Worker count of the I/O reactor and of the completion executor.
    pub fn io_threads(&self) -> usize {
        self.io_threads
    }

    /// Connection cap, applied globally and per host.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    pub fn default_headers(&self) -> &HashMap<String, String> {
        &self.default_headers
    }

    pub fn codec(&self) -> Option<&Arc<dyn Codec>> {
        self.codec.as_ref()
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("timeout", &self.timeout)
            .field("io_threads", &self.io_threads)
            .field("max_connections", &self.max_connections)
            .field("proxy", &self.proxy)
            .field("default_headers", &self.default_headers)
            .field("codec", &self.codec.as_ref().map(|c| c.content_type().to_string()))
            .finish()
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    timeout: Option<Duration>,
    io_threads: Option<usize>,
    max_connections: Option<usize>,
    proxy: Option<Proxy>,
    default_headers: HashMap<String, String>,
    codec: Option<Arc<dyn Codec>>,
}

impl ConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = Some(io_threads);
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some(Proxy {
            host: host.into(),
            port,
        });
        self
    }

    /// Header sent with every request built by the engine.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn build(self) -> Config {
        Config {
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            io_threads: self.io_threads.unwrap_or(DEFAULT_IO_THREADS),
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            proxy: self.proxy,
            default_headers: self.default_headers,
            codec: self.codec,
        }
    }
}
