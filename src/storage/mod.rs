//! Storage Module
//!
//! This module provides the ordered byte store that every CatchDB data type
//! is layered on, plus the key layout and range scanning helpers built on it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Collections (commands)                     │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ get / write(batch)           │ seek
//!                ▼                              ▼
//! ┌─────────────────────────────┐   ┌───────────────────────────┐
//! │        trait Store          │<──│      RangeScanner         │
//! └──────────────┬──────────────┘   └───────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MemStore<C: Comparator>                  │
//! │   BTreeMap ordered by AggregateComparator                   │
//! │   optional BatchLog: one CRC-checked record per batch       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Ordered**: keys are kept sorted under the store's comparator
//! - **Atomic batches**: a [`WriteBatch`] applies completely or not at all
//! - **Durable (optional)**: with a data directory, every batch is logged
//!   before it becomes visible
//!
//! ## Example
//!
//! ```
//! use catchdb::storage::{MemStore, Store, WriteBatch};
//!
//! let mut store = MemStore::new();
//! let mut batch = WriteBatch::new();
//! batch.put(b"Kname".to_vec(), b"Ariz".to_vec());
//! batch.put(b"Kcity".to_vec(), b"Pune".to_vec());
//! store.write(batch).unwrap();
//!
//! assert_eq!(store.get(b"Kname").unwrap().as_deref(), Some(&b"Ariz"[..]));
//! ```

pub mod comparator;
pub mod encoding;
pub mod log;
pub mod memory;
pub mod scanner;

// Re-export commonly used types
pub use comparator::{AggregateComparator, BytewiseComparator, Comparator};
pub use encoding::EncodingError;
pub use memory::{MemStore, StoreOptions};
pub use scanner::RangeScanner;

use bytes::Bytes;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors reported by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data failed validation
    #[error("corruption: {0}")]
    Corruption(String),
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    /// The key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// An ordered list of puts and deletes applied atomically.
///
/// Later operations on the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The queued operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Forward iterator over `(key, value)` pairs, in comparator order.
pub type StoreIter<'a> = Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a>;

/// The ordered byte store interface the collections are written against.
///
/// Writes take `&mut self`: there is exactly one mutator.
pub trait Store {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Applies every operation in `batch`, or none of them.
    fn write(&mut self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Iterates from the first key `>= start`.
    fn seek<'a>(&'a self, start: &[u8]) -> StoreIter<'a>;

    /// The ordering the store keeps its keys in.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Writes a single record.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Removes a single record. Removing a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }
}
