//! Reply Types and Framing
//!
//! Replies use the same block framing as requests. The first block is a
//! status word from a fixed table, followed by zero or more result blocks
//! and a terminating empty line:
//!
//! | Status         | Meaning                                      |
//! |----------------|----------------------------------------------|
//! | `ok`           | Success, result blocks follow                |
//! | `not_found`    | The key, field, member or item is absent     |
//! | `error`        | Server-side failure                          |
//! | `fail`         | The operation was refused                    |
//! | `client_error` | Bad command, arguments or index              |
//!
//! ## Example
//!
//! ```text
//! get foo  =>  "2\nok\n3\nbar\n\n"
//! get nope =>  "9\nnot_found\n\n"
//! ```

use crate::protocol::parser::{parse_request, ParseError};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Status word leading every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStatus {
    Ok,
    NotFound,
    Error,
    Fail,
    ClientError,
}

impl ReplyStatus {
    /// The status word as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "ok",
            ReplyStatus::NotFound => "not_found",
            ReplyStatus::Error => "error",
            ReplyStatus::Fail => "fail",
            ReplyStatus::ClientError => "client_error",
        }
    }

    /// Parses a status word.
    pub fn from_bytes(word: &[u8]) -> Option<Self> {
        match word {
            b"ok" => Some(ReplyStatus::Ok),
            b"not_found" => Some(ReplyStatus::NotFound),
            b"error" => Some(ReplyStatus::Error),
            b"fail" => Some(ReplyStatus::Fail),
            b"client_error" => Some(ReplyStatus::ClientError),
            _ => None,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply: one status plus result blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub blocks: Vec<Bytes>,
}

impl Reply {
    /// Creates a reply with the given status and result blocks.
    pub fn new(status: ReplyStatus, blocks: Vec<Bytes>) -> Self {
        Self { status, blocks }
    }

    /// `ok` with result blocks.
    pub fn ok(blocks: Vec<Bytes>) -> Self {
        Self::new(ReplyStatus::Ok, blocks)
    }

    /// `not_found` with no blocks.
    pub fn not_found() -> Self {
        Self::new(ReplyStatus::NotFound, Vec::new())
    }

    /// `error` with no blocks; the cause stays in the server log.
    pub fn error() -> Self {
        Self::new(ReplyStatus::Error, Vec::new())
    }

    /// `error` with a message block.
    pub fn error_message(msg: impl Into<Bytes>) -> Self {
        Self::new(ReplyStatus::Error, vec![msg.into()])
    }

    /// `client_error` with a message block.
    pub fn client_error(msg: impl Into<Bytes>) -> Self {
        Self::new(ReplyStatus::ClientError, vec![msg.into()])
    }

    /// Returns true for an `ok` reply.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// The first result block, if any.
    pub fn first(&self) -> Option<&Bytes> {
        self.blocks.first()
    }

    /// Serializes the reply into a new buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        write_block(buf, self.status.as_str().as_bytes());
        for block in &self.blocks {
            write_block(buf, block);
        }
        buf.put_u8(b'\n');
    }

    /// Exact number of bytes [`serialize_into`](Self::serialize_into) writes.
    pub fn encoded_len(&self) -> usize {
        block_len(self.status.as_str().len())
            + self.blocks.iter().map(|b| block_len(b.len())).sum::<usize>()
            + 1
    }

    /// Decodes a reply from the blocks of one parsed frame.
    pub fn from_blocks(mut blocks: Vec<Bytes>) -> Result<Self, ParseError> {
        if blocks.is_empty() {
            return Err(ParseError::InvalidReply("missing status".into()));
        }
        let word = blocks.remove(0);
        let status = ReplyStatus::from_bytes(&word).ok_or_else(|| {
            ParseError::InvalidReply(format!(
                "unknown status {:?}",
                String::from_utf8_lossy(&word)
            ))
        })?;
        Ok(Self::new(status, blocks))
    }

    /// Parses one complete reply from `data`.
    ///
    /// Returns `Ok(None)` if more bytes are needed.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>, ParseError> {
        match parse_request(data)? {
            Some((blocks, consumed)) => Ok(Some((Self::from_blocks(blocks)?, consumed))),
            None => Ok(None),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        for block in &self.blocks {
            write!(f, " {:?}", String::from_utf8_lossy(block))?;
        }
        Ok(())
    }
}

fn block_len(len: usize) -> usize {
    decimal_len(len) + 1 + len + 1
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Appends one `len\nbytes\n` block.
pub fn write_block(buf: &mut BytesMut, data: &[u8]) {
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(data);
    buf.put_u8(b'\n');
}

/// Encodes a request from its blocks, terminator included.
pub fn encode_request<B: AsRef<[u8]>>(blocks: &[B]) -> BytesMut {
    let mut buf = BytesMut::new();
    for block in blocks {
        write_block(&mut buf, block.as_ref());
    }
    buf.put_u8(b'\n');
    buf
}
