//! Accept, Read and Write Handlers
//!
//! [`Listener`] owns the listening sockets, the open sessions and the
//! command handler, and reacts to readiness from the [`Reactor`]:
//!
//! ```text
//!   listener readable ──> accept all pending ──> register READ
//!
//!   session readable ──> read ──Complete──> execute ──> READ off, WRITE on
//!                          │
//!                          └─Close/Error──> drop session
//!
//!   session writable ──> write ──Complete──> WRITE off, READ on,
//!                                            handle buffered input
//! ```

use crate::commands::CommandHandler;
use crate::connection::{ConnectionStats, Session, SessionStatus};
use crate::server::reactor::{EventHandler, Reactor, ReactorError};
use crate::storage::Store;
use mio::net::{TcpListener, TcpStream};
use mio::Token;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct Connection {
    session: Session<TcpStream>,
    peer: SocketAddr,
}

/// Event handler for the server's sockets.
pub(crate) struct Listener<S: Store> {
    listeners: Vec<TcpListener>,
    connections: HashMap<Token, Connection>,
    handler: CommandHandler<S>,
    stats: Arc<ConnectionStats>,
    max_clients: usize,
    buffer_size: usize,
    next_token: usize,
}

impl<S: Store> Listener<S> {
    /// Listening sockets take tokens `0..listeners.len()`; sessions follow.
    pub(crate) fn new(
        listeners: Vec<TcpListener>,
        handler: CommandHandler<S>,
        stats: Arc<ConnectionStats>,
        max_clients: usize,
        buffer_size: usize,
    ) -> Self {
        let next_token = listeners.len();
        Self {
            listeners,
            connections: HashMap::new(),
            handler,
            stats,
            max_clients,
            buffer_size,
            next_token,
        }
    }

    /// Registers every listening socket for accept readiness.
    pub(crate) fn register(&mut self, reactor: &mut Reactor) -> Result<(), ReactorError> {
        for (i, listener) in self.listeners.iter_mut().enumerate() {
            reactor.add_read(listener, Token(i))?;
        }
        Ok(())
    }

    pub(crate) fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    pub(crate) fn handler(&self) -> &CommandHandler<S> {
        &self.handler
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn accept(&mut self, reactor: &mut Reactor, index: usize) {
        loop {
            let (mut stream, peer) = match self.listeners[index].accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return;
                }
            };

            if self.connections.len() >= self.max_clients {
                warn!(client = %peer, max_clients = self.max_clients, "too many clients, closing connection");
                self.stats.connection_rejected();
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                debug!(client = %peer, error = %e, "set_nodelay failed");
            }

            let token = Token(self.next_token);
            self.next_token += 1;
            if let Err(e) = reactor.add_read(&mut stream, token) {
                warn!(client = %peer, error = %e, "cannot register connection");
                continue;
            }

            info!(client = %peer, token = ?token, "accepted connection");
            let session = Session::new(stream, self.buffer_size, Arc::clone(&self.stats));
            self.connections.insert(token, Connection { session, peer });
        }
    }

    fn read_query(&mut self, reactor: &mut Reactor, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.session.read() {
            SessionStatus::Progress => {}
            SessionStatus::Complete => {
                conn.session.execute(&mut self.handler);
                let stream = conn.session.stream_mut();
                let switched = reactor
                    .add_write(stream, token)
                    .and_then(|()| reactor.remove_read(stream, token));
                if let Err(e) = switched {
                    warn!(client = %conn.peer, error = %e, "cannot switch to write interest");
                    self.close(reactor, token);
                }
            }
            SessionStatus::Close => {
                debug!(client = %conn.peer, "client closed connection");
                self.close(reactor, token);
            }
            SessionStatus::Error => {
                warn!(client = %conn.peer, "recv error, closing connection");
                self.close(reactor, token);
            }
        }
    }

    fn write_result(&mut self, reactor: &mut Reactor, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.session.write() {
            SessionStatus::Progress => {}
            SessionStatus::Complete => {
                let stream = conn.session.stream_mut();
                let switched = reactor
                    .add_read(stream, token)
                    .and_then(|()| reactor.remove_write(stream, token));
                if let Err(e) = switched {
                    warn!(client = %conn.peer, error = %e, "cannot switch to read interest");
                    self.close(reactor, token);
                    return;
                }
                // Requests that arrived while the reply was pending are
                // already buffered; no new readiness will announce them.
                self.read_query(reactor, token);
            }
            SessionStatus::Close | SessionStatus::Error => {
                warn!(client = %conn.peer, "send error, closing connection");
                self.close(reactor, token);
            }
        }
    }

    fn close(&mut self, reactor: &mut Reactor, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = reactor.remove(conn.session.stream_mut(), token) {
                debug!(client = %conn.peer, error = %e, "deregister failed");
            }
            info!(client = %conn.peer, "closed connection");
        }
    }
}

impl<S: Store> EventHandler for Listener<S> {
    fn on_readable(&mut self, reactor: &mut Reactor, token: Token) {
        if token.0 < self.listeners.len() {
            self.accept(reactor, token.0);
        } else {
            self.read_query(reactor, token);
        }
    }

    fn on_writable(&mut self, reactor: &mut Reactor, token: Token) {
        self.write_result(reactor, token);
    }
}
