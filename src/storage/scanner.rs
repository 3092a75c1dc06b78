//! Prefix-Bounded Range Scans
//!
//! [`RangeScanner`] walks the store forward from a start key and yields
//! records while they:
//!
//! 1. begin with the scanner's prefix,
//! 2. are not the excluded key (typically a size record sharing the prefix),
//! 3. compare `<=` the optional end key under the store's ordering,
//!
//! stopping once `limit` records were produced (`0` means no limit).
//! Keys are returned with the shared prefix stripped.

use crate::storage::Store;
use bytes::Bytes;
use std::cmp::Ordering;

/// A cursor over one key prefix of a [`Store`].
pub struct RangeScanner<'a, S: Store + ?Sized> {
    store: &'a S,
    prefix: &'a [u8],
    exclude: Option<&'a [u8]>,
}

impl<'a, S: Store + ?Sized> RangeScanner<'a, S> {
    /// Scans keys beginning with `prefix`.
    pub fn new(store: &'a S, prefix: &'a [u8]) -> Self {
        Self {
            store,
            prefix,
            exclude: None,
        }
    }

    /// Skips the record stored under exactly `key`.
    pub fn exclude(mut self, key: &'a [u8]) -> Self {
        self.exclude = Some(key);
        self
    }

    /// Collects `(key suffix, value)` pairs.
    ///
    /// `start` should sort at or after the prefix; scanning begins at the
    /// first key `>= start`.
    pub fn range(&self, start: &[u8], end: Option<&[u8]>, limit: usize) -> Vec<(Bytes, Bytes)> {
        let mut out = Vec::new();
        self.walk(start, end, limit, |key, value| {
            out.push((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
        });
        out
    }

    /// Collects key suffixes only.
    pub fn keys(&self, start: &[u8], end: Option<&[u8]>, limit: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        self.walk(start, end, limit, |key, _| out.push(Bytes::copy_from_slice(key)));
        out
    }

    /// Collects values only.
    pub fn values(&self, start: &[u8], end: Option<&[u8]>, limit: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        self.walk(start, end, limit, |_, value| {
            out.push(Bytes::copy_from_slice(value))
        });
        out
    }

    /// Calls `visit` with every full key in range.
    pub fn for_each_key(&self, mut visit: impl FnMut(&[u8])) {
        self.walk_full(self.prefix, None, 0, |key, _| visit(key));
    }

    fn walk(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        mut visit: impl FnMut(&[u8], &[u8]),
    ) {
        let skip = self.prefix.len();
        self.walk_full(start, end, limit, |key, value| visit(&key[skip..], value));
    }

    fn walk_full(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        mut visit: impl FnMut(&[u8], &[u8]),
    ) {
        let mut produced = 0;
        for (key, value) in self.store.seek(start) {
            if !key.starts_with(self.prefix) {
                break;
            }
            if self.exclude == Some(key) {
                continue;
            }
            if let Some(end) = end {
                if self.store.compare(key, end) == Ordering::Greater {
                    break;
                }
            }

            visit(key, value);
            produced += 1;
            if limit != 0 && produced >= limit {
                break;
            }
        }
    }
}
