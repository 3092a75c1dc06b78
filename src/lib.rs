//! # CatchDB - A Structured Key-Value Server
//!
//! CatchDB serves four data types over a small length-prefixed protocol:
//! flat keys, hash maps, queues and sorted sets. All of them are laid out
//! as records in one ordered byte store whose comparator understands the
//! key encoding, so every collection is a contiguous, naturally ordered
//! key range.
//!
//! ## Features
//!
//! - **Four data types**: `get`/`set`, `hset`/`hget`, `qpush`/`qpop`, `zset`/`ztopn`, ...
//! - **Atomic updates**: every multi-record change is one write batch
//! - **Single-threaded reactor**: non-blocking sockets on a `mio` poll loop
//! - **Optional durability**: batches go to a checksummed log before memory
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              CatchDB                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Reactor    │───>│  Session    │───>│  Command    │                  │
//! │  │ (Listener)  │    │ (RingBuffer │    │  Handler    │                  │
//! │  └─────────────┘    │  + Frame)   │    └──────┬──────┘                  │
//! │                     └─────────────┘           │ WriteBatch              │
//! │                                               ▼                         │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │                  MemStore                    │    │
//! │                     │   BTreeMap ordered by AggregateComparator    │    │
//! │                     │   + BatchLog (crc32 records, optional)       │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Layout
//!
//! | Type       | Record key                          | Value            |
//! |------------|-------------------------------------|------------------|
//! | flat       | `K key`                             | value            |
//! | hash       | `H len name field`                  | value            |
//! | hash size  | `H len name`                        | count u64        |
//! | queue item | `Q len name seq`                    | value            |
//! | queue meta | `Q len name 0`                      | size/front/back  |
//! | zset       | `ZK len name member`                | score i64        |
//! | zset index | `ZS len name score member`          | empty            |
//! | zset size  | `ZN len name`                       | count u64        |
//!
//! ## Quick Start
//!
//! ```no_run
//! use catchdb::config::Config;
//! use catchdb::server::Server;
//! use catchdb::storage::MemStore;
//!
//! let config = Config::builder().port(7777).build();
//! let mut server = Server::bind(&config, MemStore::new())?;
//! server.run()?;
//! # Ok::<(), catchdb::server::ServerError>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: block framing, replies and the command table
//! - [`storage`]: the ordered store, key encoding and comparator
//! - [`commands`]: the four data types and request dispatch
//! - [`connection`]: ring buffer and per-client session
//! - [`server`]: readiness reactor and accept/read/write handling
//! - [`client`]: async client used by the CLI and tests
//! - [`config`]: server configuration

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::CommandHandler;
pub use config::{Config, ConfigBuilder, DEFAULT_PORT};
pub use connection::ConnectionStats;
pub use protocol::{ParseError, Reply, ReplyStatus};
pub use server::{Server, ServerError, ShutdownHandle};
pub use storage::{MemStore, Store, StoreError};

/// The default host the CLI connects to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of CatchDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
