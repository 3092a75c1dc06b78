//! Client Session
//!
//! One [`Session`] per accepted connection. It owns the socket, the inbound
//! ring buffer, the request being parsed and the outbound reply bytes.
//!
//! ## Lifecycle
//!
//! ```text
//!          readable                      writable
//!   ┌──────────────────┐         ┌──────────────────────┐
//!   │ read()           │         │ write()              │
//!   │  socket -> ring  │         │  out[cursor..] ->    │
//!   │  ring -> Frame   │         │  socket              │
//!   └───────┬──────────┘         └──────────┬───────────┘
//!           │ Complete                      │ Complete
//!           ▼                               │
//!   ┌──────────────────┐                    │
//!   │ execute()        │────────────────────┘
//!   │  Frame -> Reply  │   (read again once the reply drained)
//!   └──────────────────┘
//! ```
//!
//! Requests are handled one at a time: the next request is not parsed
//! until the previous reply has been written out. Bytes that arrive early
//! stay in the ring buffer.

use crate::commands::CommandHandler;
use crate::connection::buffer::RingBuffer;
use crate::connection::stats::ConnectionStats;
use crate::protocol::{Frame, FrameState};
use crate::storage::Store;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of one I/O step on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing more to do until the socket is ready again
    Progress,
    /// A full request was parsed, or the full reply was written
    Complete,
    /// The peer closed the connection
    Close,
    /// Transport or framing failure; the connection must be dropped
    Error,
}

/// How a fill pass over the socket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Full,
    Drained,
    Closed,
    Failed,
}

/// Per-connection state.
pub struct Session<T> {
    stream: T,
    input: RingBuffer,
    frame: Frame,
    output: BytesMut,
    /// Bytes of `output` already sent
    written: usize,
    stats: Arc<ConnectionStats>,
}

impl<T: Read + Write> Session<T> {
    /// Wraps an accepted stream. `buffer_size` bounds one request block.
    pub fn new(stream: T, buffer_size: usize, stats: Arc<ConnectionStats>) -> Self {
        stats.connection_opened();
        Self {
            stream,
            input: RingBuffer::new(buffer_size),
            frame: Frame::new(),
            output: BytesMut::new(),
            written: 0,
            stats,
        }
    }

    /// The underlying stream, for (de)registration with the reactor.
    pub fn stream_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Returns true while reply bytes are waiting to be sent.
    pub fn has_pending_output(&self) -> bool {
        self.written < self.output.len()
    }

    /// Drains the socket into the ring buffer, parsing as it goes.
    ///
    /// Readiness is edge-triggered, so this keeps filling and parsing until
    /// the socket would block, the peer closes, or the request completes. A
    /// request larger than the buffer is fine as long as each block fits.
    pub fn read(&mut self) -> SessionStatus {
        loop {
            let fill = self.fill();
            if fill == Fill::Failed {
                return SessionStatus::Error;
            }

            match self.parse_buffered() {
                SessionStatus::Progress => {}
                status => return status,
            }

            match fill {
                Fill::Closed => return SessionStatus::Close,
                Fill::Drained => return SessionStatus::Progress,
                // Parsing freed space; more may be waiting on the socket
                Fill::Full | Fill::Failed => {}
            }
        }
    }

    /// Reads until the buffer is full or the socket has nothing more.
    fn fill(&mut self) -> Fill {
        while !self.input.is_full() {
            match self.input.read_from(&mut self.stream) {
                Ok(0) => return Fill::Closed,
                Ok(n) => {
                    trace!(bytes = n, "read");
                    self.stats.bytes_read(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Fill::Drained,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "recv failed");
                    return Fill::Failed;
                }
            }
        }
        Fill::Full
    }

    fn parse_buffered(&mut self) -> SessionStatus {
        if self.frame.is_complete() {
            return SessionStatus::Complete;
        }
        if self.input.is_empty() {
            return SessionStatus::Progress;
        }

        match self.frame.parse(self.input.data()) {
            Ok(consumed) => self.input.advance_read(consumed),
            Err(e) => {
                warn!(error = %e, "malformed request");
                return SessionStatus::Error;
            }
        }

        match self.frame.state() {
            FrameState::Complete => SessionStatus::Complete,
            // Nothing consumed from a full buffer: the next block cannot fit
            FrameState::Partial if self.input.is_full() => {
                warn!(
                    capacity = self.input.capacity(),
                    "request block does not fit in the query buffer"
                );
                SessionStatus::Error
            }
            FrameState::Partial => SessionStatus::Progress,
            FrameState::Error => SessionStatus::Error,
        }
    }

    /// Executes the parsed request and queues its reply.
    pub fn execute<S: Store>(&mut self, handler: &mut CommandHandler<S>) {
        let blocks = self.frame.take_blocks();
        let reply = handler.execute(&blocks);
        reply.serialize_into(&mut self.output);
        self.stats.command_processed();
    }

    /// Sends queued reply bytes from the current cursor.
    pub fn write(&mut self) -> SessionStatus {
        while self.has_pending_output() {
            match self.stream.write(&self.output[self.written..]) {
                Ok(0) => return SessionStatus::Close,
                Ok(n) => {
                    trace!(bytes = n, "wrote");
                    self.written += n;
                    self.stats.bytes_written(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return SessionStatus::Progress
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "send failed");
                    return SessionStatus::Error;
                }
            }
        }

        self.output.clear();
        self.written = 0;
        SessionStatus::Complete
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}
