//! In-Memory Ordered Store
//!
//! [`MemStore`] keeps every record in a `BTreeMap` whose key order is
//! delegated to a [`Comparator`]. Opened with a data directory it becomes
//! durable: batches go through a [`BatchLog`] before they are applied, and
//! the log is replayed (then compacted) on the next open.
//!
//! ```text
//!   write(batch) ──> BatchLog::append ──ok──> apply to BTreeMap
//!                          │
//!                         err ──> map untouched, error returned
//! ```

use crate::storage::comparator::{AggregateComparator, Comparator};
use crate::storage::log::BatchLog;
use crate::storage::{BatchOp, Store, StoreError, StoreIter, WriteBatch};
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use tracing::info;

/// File name of the batch log inside the data directory.
pub const LOG_FILE_NAME: &str = "catchdb.log";

/// File recording which comparator the data directory was written with.
pub const COMPARATOR_FILE_NAME: &str = "COMPARATOR";

/// Default size of the batch log write buffer (4 MB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Tuning for a durable [`MemStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Capacity of the buffered log writer
    pub write_buffer_size: usize,
    /// fsync the log after every batch
    pub sync: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            sync: false,
        }
    }
}

/// A raw key ordered by `C` instead of by `Ord for [u8]`.
struct OrderedKey<C> {
    bytes: Vec<u8>,
    _cmp: PhantomData<fn() -> C>,
}

impl<C> OrderedKey<C> {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            _cmp: PhantomData,
        }
    }
}

impl<C: Comparator> Ord for OrderedKey<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        C::compare(&self.bytes, &other.bytes)
    }
}

impl<C: Comparator> PartialOrd for OrderedKey<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: Comparator> PartialEq for OrderedKey<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<C: Comparator> Eq for OrderedKey<C> {}

/// An ordered key-value store held in memory, optionally backed by a log.
pub struct MemStore<C = AggregateComparator> {
    map: BTreeMap<OrderedKey<C>, Bytes>,
    log: Option<BatchLog>,
}

impl MemStore<AggregateComparator> {
    /// Creates an empty, purely in-memory store.
    pub fn new() -> Self {
        Self::with_comparator()
    }
}

impl Default for MemStore<AggregateComparator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Comparator> MemStore<C> {
    /// Creates an empty in-memory store ordered by `C`.
    pub fn with_comparator() -> Self {
        Self {
            map: BTreeMap::new(),
            log: None,
        }
    }

    /// Opens a durable store in `dir`, replaying any existing log.
    ///
    /// The replayed state is written back as a compacted log before the
    /// store accepts new batches.
    pub fn open(dir: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        check_comparator::<C>(dir)?;

        let path = dir.join(LOG_FILE_NAME);
        let mut store = Self::with_comparator();
        let batches = BatchLog::replay(&path)?;
        let replayed = batches.len();
        for batch in batches {
            store.apply(batch);
        }

        BatchLog::rewrite(&path, store.iter())?;
        store.log = Some(BatchLog::open(
            path,
            options.write_buffer_size,
            options.sync,
        )?);

        info!(
            dir = %dir.display(),
            batches = replayed,
            records = store.len(),
            comparator = C::NAME,
            "Store opened"
        );
        Ok(store)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns true if batches are written to a log.
    pub fn is_durable(&self) -> bool {
        self.log.is_some()
    }

    /// Iterates every record in order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.map
            .iter()
            .map(|(k, v)| (k.bytes.as_slice(), v.as_ref()))
    }

    fn apply(&mut self, batch: WriteBatch) {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    self.map.insert(OrderedKey::new(key), Bytes::from(value));
                }
                BatchOp::Delete { key } => {
                    self.map.remove(&OrderedKey::new(key));
                }
            }
        }
    }
}

/// Refuses to open a directory written under a different ordering.
fn check_comparator<C: Comparator>(dir: &Path) -> Result<(), StoreError> {
    let path = dir.join(COMPARATOR_FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(name) if name.trim() == C::NAME => Ok(()),
        Ok(name) => Err(StoreError::Corruption(format!(
            "comparator mismatch: store uses {}, opened with {}",
            name.trim(),
            C::NAME
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::write(&path, C::NAME)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

impl<C: Comparator> Store for MemStore<C> {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self.map.get(&OrderedKey::new(key.to_vec())).cloned())
    }

    fn write(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(log) = self.log.as_mut() {
            log.append(&batch)?;
        }
        self.apply(batch);
        Ok(())
    }

    fn seek<'a>(&'a self, start: &[u8]) -> StoreIter<'a> {
        Box::new(
            self.map
                .range(OrderedKey::new(start.to_vec())..)
                .map(|(k, v)| (k.bytes.as_slice(), v.as_ref())),
        )
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        C::compare(a, b)
    }
}

impl<C: Comparator> fmt::Debug for MemStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemStore")
            .field("comparator", &C::NAME)
            .field("records", &self.map.len())
            .field("durable", &self.log.is_some())
            .finish()
    }
}
