//! Server Module
//!
//! The CatchDB server is one thread running a readiness loop. There is no
//! locking anywhere: the reactor, every session, the command handler and
//! the store all live on the thread that calls [`Server::run`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Server                            │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────┐  │
//! │  │  Listener   │ → │  Sessions   │ → │ CommandHandler│  │
//! │  │  (TCP)      │   │ (mio poll)  │   │  (→ Store)    │  │
//! │  └─────────────┘   └─────────────┘   └───────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use catchdb::config::Config;
//! use catchdb::server::Server;
//! use catchdb::storage::MemStore;
//!
//! let config = Config::builder().bind("127.0.0.1".parse().unwrap()).build();
//! let mut server = Server::bind(&config, MemStore::new())?;
//! let shutdown = server.shutdown_handle();
//! // hand `shutdown` to a signal handler, then:
//! server.run()?;
//! # Ok::<(), catchdb::server::ServerError>(())
//! ```

pub mod listener;
pub mod reactor;

pub use reactor::{EventHandler, Reactor, ReactorError};

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::ConnectionStats;
use crate::storage::{MemStore, Store};
use listener::Listener;
use mio::Waker;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on one poll; shutdown is also signalled through a waker.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors from starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no address to listen on")]
    NoListeners,

    #[error(transparent)]
    Reactor(#[from] ReactorError),
}

/// Stops a running server from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the server loop to stop after the current pass.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake reactor");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A bound, not yet running, server.
pub struct Server<S: Store = MemStore> {
    reactor: Reactor,
    listener: Listener<S>,
    stats: Arc<ConnectionStats>,
    shutdown: ShutdownHandle,
}

impl<S: Store> Server<S> {
    /// Binds every configured address and registers the listeners.
    pub fn bind(config: &Config, store: S) -> Result<Self, ServerError> {
        let mut listeners = Vec::new();
        for addr in config.listen_addrs() {
            let listener = mio::net::TcpListener::bind(addr)
                .map_err(|source| ServerError::Bind { addr, source })?;
            info!(addr = %listener.local_addr().unwrap_or(addr), "listening");
            listeners.push(listener);
        }
        if listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }

        let mut reactor = Reactor::new(config.max_clients + listeners.len())?;
        let shutdown = ShutdownHandle {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(reactor.waker()?),
        };

        let stats = Arc::new(ConnectionStats::new());
        let mut listener = Listener::new(
            listeners,
            CommandHandler::new(store),
            Arc::clone(&stats),
            config.max_clients,
            config.query_buffer_size,
        );
        listener.register(&mut reactor)?;

        Ok(Self {
            reactor,
            listener,
            stats,
            shutdown,
        })
    }

    /// Addresses actually bound (useful with port 0).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listener.local_addrs()
    }

    /// The first bound address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addrs().into_iter().next()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// The command handler, and through it the store.
    pub fn handler(&self) -> &CommandHandler<S> {
        self.listener.handler()
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.listener.connection_count()
    }

    /// Runs one reactor pass.
    pub fn turn(&mut self, timeout: Option<Duration>) -> usize {
        self.reactor.poll_once(&mut self.listener, timeout)
    }

    /// Serves clients until the shutdown handle fires.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!("server started");
        while !self.shutdown.is_shutdown() {
            self.turn(Some(POLL_TIMEOUT));
        }
        info!(
            commands = self.stats.commands(),
            connections = self.connection_count(),
            "server stopped"
        );
        Ok(())
    }
}
