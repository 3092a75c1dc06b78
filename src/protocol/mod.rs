//! Wire Protocol Implementation
//!
//! This module implements the size-prefixed block protocol CatchDB speaks.
//!
//! ## Overview
//!
//! Every message, request or reply, is a list of blocks. A block is its
//! decimal length on one line followed by that many bytes and a newline; an
//! empty line closes the message. Requests start with the command name,
//! replies with a status word.
//!
//! ## Modules
//!
//! - `parser`: Incremental [`Frame`] parser for inbound data
//! - `types`: [`Reply`] and [`ReplyStatus`], plus request/reply encoding
//! - `command`: The static command table
//!
//! ## Example
//!
//! ```
//! use catchdb::protocol::{encode_request, parse_request, Reply};
//! use bytes::Bytes;
//!
//! let wire = encode_request(&["get", "name"]);
//! let (blocks, consumed) = parse_request(&wire).unwrap().unwrap();
//! assert_eq!(blocks, vec!["get", "name"]);
//! assert_eq!(consumed, wire.len());
//!
//! let reply = Reply::ok(vec![Bytes::from("Ariz")]);
//! assert_eq!(&reply.serialize()[..], b"2\nok\n4\nAriz\n\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use command::{lookup, Access, Category, Command, CommandSpec};
pub use parser::{parse_request, Frame, FrameState, ParseError, ParseResult};
pub use types::{encode_request, Reply, ReplyStatus};
