//! Incremental Request Parser
//!
//! A request is a sequence of length-prefixed blocks closed by an empty line:
//!
//! ```text
//! 3\n
//! set\n
//! 3\n
//! foo\n
//! 3\n
//! bar\n
//! \n
//! ```
//!
//! `\r\n` is accepted wherever `\n` is. Block 0 is the command name, the
//! rest are arguments. Block bodies are binary-safe.
//!
//! ## How the Parser Works
//!
//! A [`Frame`] accumulates one request across any number of reads. Each call
//! to [`Frame::parse`] is handed the bytes not yet consumed and returns:
//!
//! - `Ok(consumed)` with the frame still `Partial` - every fully parsed block
//!   was taken, the caller should drop `consumed` bytes and call again once
//!   more data has arrived
//! - `Ok(consumed)` with the frame `Complete` - the terminating empty line was
//!   seen; bytes after `consumed` belong to the next request
//! - `Err(ParseError)` - the framing is broken and the frame is now in the
//!   `Error` state for good; the connection must be closed

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a request frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A size line did not consist of ASCII digits
    #[error("invalid block size line: {0:?}")]
    InvalidSize(String),

    /// A size line does not fit in `usize`
    #[error("block size overflows")]
    SizeOverflow,

    /// A block body was not followed by `\n` or `\r\n`
    #[error("invalid block terminator: {0:#04x}")]
    InvalidTerminator(u8),

    /// A reply frame did not start with a known status word
    #[error("invalid reply: {0}")]
    InvalidReply(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parsing progress of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// More bytes are needed
    Partial,
    /// The terminating empty line was seen
    Complete,
    /// The framing was malformed
    Error,
}

/// One request being assembled from a byte stream.
#[derive(Debug, Clone)]
pub struct Frame {
    state: FrameState,
    blocks: Vec<Bytes>,
    error: Option<ParseError>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Creates an empty, partial frame.
    pub fn new() -> Self {
        Self {
            state: FrameState::Partial,
            blocks: Vec::new(),
            error: None,
        }
    }

    /// Current parsing state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Returns true once the terminating empty line was parsed.
    pub fn is_complete(&self) -> bool {
        self.state == FrameState::Complete
    }

    /// Blocks parsed so far.
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Takes the parsed blocks and resets the frame for the next request.
    pub fn take_blocks(&mut self) -> Vec<Bytes> {
        let blocks = std::mem::take(&mut self.blocks);
        self.reset();
        blocks
    }

    /// Drops all state, returning to an empty partial frame.
    pub fn reset(&mut self) {
        self.state = FrameState::Partial;
        self.blocks.clear();
        self.error = None;
    }

    /// Feeds unconsumed bytes to the frame.
    ///
    /// # Returns
    ///
    /// The number of bytes of `data` that were consumed. Nothing past the
    /// last complete block is consumed while the frame stays partial.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult<usize> {
        match self.state {
            FrameState::Complete => return Ok(0),
            FrameState::Error => {
                return Err(self
                    .error
                    .clone()
                    .unwrap_or_else(|| ParseError::InvalidSize(String::new())));
            }
            FrameState::Partial => {}
        }

        match self.parse_blocks(data) {
            Ok(consumed) => Ok(consumed),
            Err(e) => {
                self.state = FrameState::Error;
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn parse_blocks(&mut self, data: &[u8]) -> ParseResult<usize> {
        let mut pos = 0;

        loop {
            let Some(nl) = find_newline(&data[pos..]) else {
                return Ok(pos);
            };
            let line = strip_cr(&data[pos..pos + nl]);

            if line.is_empty() {
                self.state = FrameState::Complete;
                return Ok(pos + nl + 1);
            }

            let size = parse_size(line)?;
            let body = pos + nl + 1;
            let Some(body_end) = body.checked_add(size) else {
                return Err(ParseError::SizeOverflow);
            };

            // Body plus at least one terminator byte.
            if data.len() <= body_end {
                return Ok(pos);
            }

            let next = match data[body_end] {
                b'\n' => body_end + 1,
                b'\r' => match data.get(body_end + 1) {
                    None => return Ok(pos),
                    Some(b'\n') => body_end + 2,
                    Some(&other) => return Err(ParseError::InvalidTerminator(other)),
                },
                other => return Err(ParseError::InvalidTerminator(other)),
            };

            self.blocks.push(Bytes::copy_from_slice(&data[body..body_end]));
            pos = next;
        }
    }
}

/// Parses one complete request from `data`.
///
/// # Returns
///
/// - `Ok(Some((blocks, consumed)))` - a full request was parsed
/// - `Ok(None)` - incomplete data, need more bytes
/// - `Err(e)` - malformed framing
pub fn parse_request(data: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    let mut frame = Frame::new();
    let consumed = frame.parse(data)?;
    if frame.is_complete() {
        Ok(Some((frame.take_blocks(), consumed)))
    } else {
        Ok(None)
    }
}

/// Finds the position of the next `\n`.
#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_size(line: &[u8]) -> ParseResult<usize> {
    if !line.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidSize(
            String::from_utf8_lossy(line).into_owned(),
        ));
    }
    line.iter().try_fold(0usize, |acc, &digit| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(usize::from(digit - b'0')))
            .ok_or(ParseError::SizeOverflow)
    })
}
