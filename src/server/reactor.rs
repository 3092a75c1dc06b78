//! Readiness Reactor
//!
//! A thin layer over [`mio::Poll`] that tracks read and write interest
//! separately for every registered token and dispatches readiness to an
//! [`EventHandler`].
//!
//! ## Dispatch Rule
//!
//! ```text
//!   for each ready token:
//!       readable && wants read   -> on_readable()
//!       writable && wants write  -> on_writable()   (only if on_readable
//!                                                    did not fire)
//! ```
//!
//! A token that just finished reading and switched to write interest is
//! therefore never written in the same pass on stale readiness.

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Token reserved for the shutdown waker.
pub const WAKE_TOKEN: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 1024;

/// Errors from registering with the reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("reactor is full ({0} registrations)")]
    Capacity(usize),
}

/// Receives readiness callbacks.
///
/// Handlers get the reactor back so they can change interest or
/// deregister while handling an event.
pub trait EventHandler {
    fn on_readable(&mut self, reactor: &mut Reactor, token: Token);
    fn on_writable(&mut self, reactor: &mut Reactor, token: Token);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Registration {
    read: bool,
    write: bool,
}

impl Registration {
    fn interest(self) -> Option<Interest> {
        match (self.read, self.write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
}

/// Single-threaded readiness loop.
pub struct Reactor {
    poll: Poll,
    events: Events,
    registrations: HashMap<Token, Registration>,
    capacity: usize,
    ready: Vec<Ready>,
}

impl Reactor {
    /// Creates a reactor accepting at most `capacity` registrations.
    pub fn new(capacity: usize) -> Result<Self, ReactorError> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            registrations: HashMap::new(),
            capacity,
            ready: Vec::new(),
        })
    }

    /// Creates a waker that interrupts a blocked [`poll_once`](Self::poll_once).
    pub fn waker(&self) -> Result<Waker, ReactorError> {
        Ok(Waker::new(self.poll.registry(), WAKE_TOKEN)?)
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn wants_read(&self, token: Token) -> bool {
        self.registrations.get(&token).is_some_and(|r| r.read)
    }

    pub fn wants_write(&self, token: Token) -> bool {
        self.registrations.get(&token).is_some_and(|r| r.write)
    }

    pub fn add_read<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
    ) -> Result<(), ReactorError> {
        self.update(source, token, |r| r.read = true)
    }

    pub fn add_write<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
    ) -> Result<(), ReactorError> {
        self.update(source, token, |r| r.write = true)
    }

    pub fn remove_read<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
    ) -> Result<(), ReactorError> {
        self.update(source, token, |r| r.read = false)
    }

    pub fn remove_write<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
    ) -> Result<(), ReactorError> {
        self.update(source, token, |r| r.write = false)
    }

    /// Drops all interest in `token`.
    pub fn remove<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
    ) -> Result<(), ReactorError> {
        self.update(source, token, |r| *r = Registration::default())
    }

    fn update<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        change: impl FnOnce(&mut Registration),
    ) -> Result<(), ReactorError> {
        let before = self.registrations.get(&token).copied();
        if before.is_none() && self.registrations.len() >= self.capacity {
            return Err(ReactorError::Capacity(self.capacity));
        }

        let before = before.unwrap_or_default();
        let mut after = before;
        change(&mut after);
        if after == before {
            return Ok(());
        }

        let registry = self.poll.registry();
        match (before.interest(), after.interest()) {
            (None, Some(interest)) => registry.register(source, token, interest)?,
            (Some(_), Some(interest)) => registry.reregister(source, token, interest)?,
            (Some(_), None) => registry.deregister(source)?,
            (None, None) => {}
        }

        if after.interest().is_some() {
            self.registrations.insert(token, after);
        } else {
            self.registrations.remove(&token);
        }
        Ok(())
    }

    /// Waits for readiness once and dispatches every ready token.
    ///
    /// Returns the number of ready tokens. A failed wait counts as a pass
    /// with no events.
    pub fn poll_once<H: EventHandler>(&mut self, handler: &mut H, timeout: Option<Duration>) -> usize {
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() != io::ErrorKind::Interrupted {
                warn!(error = %e, "poll failed");
            }
            return 0;
        }

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        ready.extend(
            self.events
                .iter()
                .filter(|event| event.token() != WAKE_TOKEN)
                .map(|event| Ready {
                    token: event.token(),
                    readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                    writable: event.is_writable() || event.is_write_closed(),
                }),
        );

        for event in &ready {
            let mut fired = false;
            if event.readable && self.wants_read(event.token) {
                trace!(token = ?event.token, "readable");
                handler.on_readable(self, event.token);
                fired = true;
            }
            if event.writable && !fired && self.wants_write(event.token) {
                trace!(token = ?event.token, "writable");
                handler.on_writable(self, event.token);
            }
        }

        let count = ready.len();
        self.ready = ready;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::{TcpListener, TcpStream};
    use std::io::Write;

    #[derive(Default)]
    struct Recorder {
        fired: Vec<(&'static str, Token)>,
    }

    impl EventHandler for Recorder {
        fn on_readable(&mut self, _: &mut Reactor, token: Token) {
            self.fired.push(("read", token));
        }

        fn on_writable(&mut self, _: &mut Reactor, token: Token) {
            self.fired.push(("write", token));
        }
    }

    fn poll_until_fired(reactor: &mut Reactor, recorder: &mut Recorder) {
        for _ in 0..50 {
            reactor.poll_once(recorder, Some(Duration::from_millis(20)));
            if !recorder.fired.is_empty() {
                return;
            }
        }
    }

    /// Returns a connected (server side, client side) pair.
    fn connected_pair() -> (TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), client)
    }

    #[test]
    fn test_listener_readable_on_connect() {
        let mut reactor = Reactor::new(4).unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        reactor.add_read(&mut listener, Token(0)).unwrap();

        let _client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut recorder = Recorder::default();
        poll_until_fired(&mut reactor, &mut recorder);

        assert_eq!(recorder.fired, vec![("read", Token(0))]);
    }

    #[test]
    fn test_read_suppresses_write_in_same_pass() {
        let mut reactor = Reactor::new(4).unwrap();
        let (mut server, mut client) = connected_pair();
        client.write_all(b"ping").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        reactor.add_read(&mut server, Token(1)).unwrap();
        reactor.add_write(&mut server, Token(1)).unwrap();
        let mut recorder = Recorder::default();
        poll_until_fired(&mut reactor, &mut recorder);

        assert_eq!(recorder.fired, vec![("read", Token(1))]);
    }

    #[test]
    fn test_write_interest_alone() {
        let mut reactor = Reactor::new(4).unwrap();
        let (mut server, _client) = connected_pair();

        reactor.add_write(&mut server, Token(7)).unwrap();
        let mut recorder = Recorder::default();
        poll_until_fired(&mut reactor, &mut recorder);

        assert_eq!(recorder.fired, vec![("write", Token(7))]);
    }

    #[test]
    fn test_interest_bookkeeping() {
        let mut reactor = Reactor::new(1).unwrap();
        let (mut server, _client) = connected_pair();
        let (mut other, _other_client) = connected_pair();

        reactor.add_read(&mut server, Token(1)).unwrap();
        reactor.add_write(&mut server, Token(1)).unwrap();
        reactor.remove_read(&mut server, Token(1)).unwrap();
        assert!(!reactor.wants_read(Token(1)));
        assert!(reactor.wants_write(Token(1)));
        assert_eq!(reactor.len(), 1);

        assert!(matches!(
            reactor.add_read(&mut other, Token(2)),
            Err(ReactorError::Capacity(1))
        ));

        reactor.remove(&mut server, Token(1)).unwrap();
        assert!(reactor.is_empty());
        reactor.add_read(&mut other, Token(2)).unwrap();
    }

    #[test]
    fn test_waker_is_not_dispatched() {
        let mut reactor = Reactor::new(4).unwrap();
        let waker = reactor.waker().unwrap();
        waker.wake().unwrap();

        let mut recorder = Recorder::default();
        let ready = reactor.poll_once(&mut recorder, Some(Duration::from_millis(100)));
        assert_eq!(ready, 0);
        assert!(recorder.fired.is_empty());
    }
}
