//! Configuration for CatchDB
//!
//! Every knob the server reads, with defaults matching a stock install.
//! The server binary fills this in from flags and `CATCHDB_*` variables.

use crate::storage::memory::DEFAULT_WRITE_BUFFER_SIZE;
use crate::storage::StoreOptions;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 7777;

/// Default cap on concurrent connections.
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

/// Default per-connection query buffer (64 KB).
pub const DEFAULT_QUERY_BUFFER_SIZE: usize = 64 * 1024;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Addresses to listen on; empty means every interface
    pub bind: Vec<IpAddr>,

    /// TCP port shared by every bind address
    pub port: u16,

    /// Connections beyond this many are closed right after accept
    pub max_clients: usize,

    /// Capacity of each connection's ring buffer. One request block must fit.
    pub query_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the batch log; `None` keeps everything in memory
    ///   {data_dir}/
    ///     ├── catchdb.log     (batch log)
    ///     └── COMPARATOR      (key ordering the log was written with)
    pub data_dir: Option<PathBuf>,

    /// Buffer in front of the batch log file (in bytes)
    pub write_buffer_size: usize,

    /// fsync the log after every batch
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Process Configuration
    // -------------------------------------------------------------------------
    /// Log destination; `None` logs to stderr
    pub log_file: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    /// PID file written at startup and removed at exit
    pub pid_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Vec::new(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            query_buffer_size: DEFAULT_QUERY_BUFFER_SIZE,
            data_dir: None,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            sync_writes: false,
            log_file: None,
            log_level: "info".to_string(),
            pid_file: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Socket addresses to bind, one per configured address.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        if self.bind.is_empty() {
            return vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)];
        }
        self.bind
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.port))
            .collect()
    }

    /// Options for opening the on-disk store.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            write_buffer_size: self.write_buffer_size,
            sync: self.sync_writes,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add an address to listen on
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.config.bind.push(ip);
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_clients(mut self, count: usize) -> Self {
        self.config.max_clients = count;
        self
    }

    /// Set the per-connection query buffer size (in bytes)
    pub fn query_buffer_size(mut self, size: usize) -> Self {
        self.config.query_buffer_size = size;
        self
    }

    /// Persist data under `path`
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(path.into());
        self
    }

    /// Set the batch log write buffer size (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// fsync after every batch
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Log to a file instead of stderr
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    /// Set the fallback log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Write the process id to `path`
    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pid_file = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 7777);
        assert_eq!(config.max_clients, 10_000);
        assert_eq!(config.write_buffer_size, 4 * 1024 * 1024);
        assert!(config.data_dir.is_none());
        assert_eq!(config.listen_addrs(), vec!["0.0.0.0:7777".parse().unwrap()]);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .bind("127.0.0.1".parse().unwrap())
            .bind("::1".parse().unwrap())
            .port(9000)
            .data_dir("/tmp/catchdb")
            .sync_writes(true)
            .build();

        let addrs: Vec<String> = config.listen_addrs().iter().map(|a| a.to_string()).collect();
        assert_eq!(addrs, vec!["127.0.0.1:9000", "[::1]:9000"]);
        assert!(config.store_options().sync);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/catchdb")));
    }
}
