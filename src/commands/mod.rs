//! Command Handler Module
//!
//! This module implements the data types CatchDB serves and the dispatch
//! from parsed requests to them.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame parser   │  (protocol module)
//! └────────┬────────┘
//!          │ blocks
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Lookup       │   COMMAND_TABLE -> category, arity
//! │  - Validate     │
//! │  - Dispatch     │   kv / hash / queue / zset
//! └────────┬────────┘
//!          │ WriteBatch
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Flat
//! - `get`, `set`, `setnx`, `getset`, `del`, `exists`
//! - `incr`, `decr`, `keys`, `getall`, `multi_set`
//!
//! ### Hash
//! - `hsize`, `hget`, `hset`, `hmod`, `hdel`, `hexists`
//! - `hincr`, `hdecr`, `hkeys`, `hvals`, `hgetall`, `hclear`, `multi_hset`
//!
//! ### Queue
//! - `qsize`, `qfront`, `qback`, `qget`, `qslice`, `qlist`, `qclear`
//! - `qpush[_front|_back]`, `qpop[_front|_back]`, `multi_qpush[_front|_back]`
//!
//! ### Sorted Set
//! - `zsize`, `zget`, `zset`, `zmod`, `zdel`, `zexists`
//! - `zincr`, `zdecr`, `ztopn`, `zgetall`, `zclear`, `multi_zset`

pub mod handler;
pub mod hash;
pub mod kv;
pub mod queue;
pub mod zset;

// Re-export the main command handler
pub use handler::CommandHandler;
pub use hash::HashMapCollection;
pub use queue::Queue;
pub use zset::SortedSet;

use crate::storage::{EncodingError, StoreError};
use bytes::Bytes;
use thiserror::Error;

/// Outcome of a failed command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The store failed; the cause is logged, not sent
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The key, field, member or item does not exist
    #[error("not found")]
    NotFound,

    /// The queue has no items
    #[error("empty")]
    Empty,

    /// An argument had the wrong shape
    #[error("{0}")]
    InvalidParameter(String),

    /// An index fell outside the collection
    #[error("Out of range")]
    OutOfRange,

    /// The command is known but not served
    #[error("not implemented")]
    NotImplemented,
}

impl From<EncodingError> for CommandError {
    fn from(e: EncodingError) -> Self {
        CommandError::InvalidParameter(e.to_string())
    }
}

/// Result type for command execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Returns the `index`-th argument.
pub(crate) fn arg(args: &[Bytes], index: usize) -> CommandResult<&Bytes> {
    args.get(index)
        .ok_or_else(|| CommandError::InvalidParameter("missing argument".into()))
}

/// Parses a decimal `i64` argument.
pub(crate) fn parse_int(arg: &[u8], what: &str) -> CommandResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CommandError::InvalidParameter(format!("{} should be an integer", what)))
}

/// Renders an integer as a result block.
pub(crate) fn int_block(n: impl ToString) -> Bytes {
    Bytes::from(n.to_string())
}

/// Renders a boolean as `yes` / `no`.
pub(crate) fn bool_block(b: bool) -> Bytes {
    Bytes::from_static(if b { b"yes" } else { b"no" })
}

/// A store record that failed to decode.
pub(crate) fn corrupt(what: &str) -> CommandError {
    CommandError::Store(StoreError::Corruption(what.to_string()))
}

/// Splits `k1 v1 k2 v2 ...` into pairs, later duplicates winning.
pub(crate) fn pairs(args: &[Bytes]) -> CommandResult<std::collections::BTreeMap<&[u8], &Bytes>> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::InvalidParameter(
            "arguments insufficient to make up k-v pairs".into(),
        ));
    }
    Ok(args
        .chunks_exact(2)
        .map(|pair| (pair[0].as_ref(), &pair[1]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(b"-42", "score").unwrap(), -42);
        let err = parse_int(b"4x", "score").unwrap_err();
        assert_eq!(err.to_string(), "score should be an integer");
    }

    #[test]
    fn test_pairs_dedupe() {
        let args: Vec<Bytes> = ["a", "1", "b", "2", "a", "3"]
            .iter()
            .map(|s| Bytes::from(*s))
            .collect();
        let map = pairs(&args).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&b"a"[..]], "3");
    }

    #[test]
    fn test_pairs_rejects_odd() {
        let args = vec![Bytes::from("a")];
        assert!(matches!(pairs(&args), Err(CommandError::InvalidParameter(_))));
        assert!(matches!(pairs(&[]), Err(CommandError::InvalidParameter(_))));
    }

    #[test]
    fn test_name_too_long_is_client_error() {
        let err: CommandError = EncodingError::NameTooLong(70000).into();
        assert!(matches!(err, CommandError::InvalidParameter(_)));
    }
}
