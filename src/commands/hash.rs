//! Hash Map Collection
//!
//! A hash map named `n` stores each field as `H len(n) n field -> value`.
//! The bare template `H len(n) n` holds the field count as a u64 and exists
//! only while the map is non-empty.
//!
//! The count is cached after the first read. Every mutation writes the
//! field records and the count record in one batch, and the cache is only
//! updated after that batch succeeds.

use crate::commands::{
    arg, bool_block, corrupt, int_block, pairs, parse_int, CommandError, CommandResult,
};
use crate::protocol::command::HashCommand;
use crate::storage::encoding::{name_template, read_u64_le, with_suffix, HASH_TAG};
use crate::storage::{RangeScanner, Store, WriteBatch};
use bytes::Bytes;

/// One named hash map.
#[derive(Debug, Clone)]
pub struct HashMapCollection {
    template: Vec<u8>,
    size: Option<u64>,
}

impl HashMapCollection {
    /// Creates the handle for hash `name`. Nothing is read yet.
    pub fn new(name: &[u8]) -> CommandResult<Self> {
        Ok(Self {
            template: name_template(HASH_TAG, name)?,
            size: None,
        })
    }

    /// The bare template is the count record, so a field must be non-empty.
    fn field_key(&self, field: &[u8]) -> CommandResult<Vec<u8>> {
        if field.is_empty() {
            return Err(CommandError::InvalidParameter("empty field".into()));
        }
        Ok(with_suffix(&self.template, field))
    }

    fn scanner<'a, S: Store + ?Sized>(&'a self, store: &'a S) -> RangeScanner<'a, S> {
        RangeScanner::new(store, &self.template).exclude(&self.template)
    }

    /// Queues the count record for `size`, removing it at zero.
    fn write_size(&self, batch: &mut WriteBatch, size: u64) {
        if size == 0 {
            batch.delete(self.template.clone());
        } else {
            batch.put(self.template.clone(), size.to_le_bytes().to_vec());
        }
    }

    /// Number of fields.
    pub fn size<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = match store.get(&self.template)? {
            Some(raw) => read_u64_le(&raw).ok_or_else(|| corrupt("hash size record"))?,
            None => 0,
        };
        self.size = Some(size);
        Ok(size)
    }

    /// Reads a field.
    pub fn get<S: Store + ?Sized>(&self, store: &S, field: &[u8]) -> CommandResult<Bytes> {
        store
            .get(&self.field_key(field)?)?
            .ok_or(CommandError::NotFound)
    }

    /// Returns true if the field exists.
    pub fn exists<S: Store + ?Sized>(&self, store: &S, field: &[u8]) -> CommandResult<bool> {
        Ok(store.get(&self.field_key(field)?)?.is_some())
    }

    /// Writes a field. Returns true if the field is new.
    pub fn set<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        field: &[u8],
        value: &[u8],
    ) -> CommandResult<bool> {
        let key = self.field_key(field)?;
        let is_new = store.get(&key)?.is_none();

        let mut batch = WriteBatch::new();
        batch.put(key, value);
        let size = if is_new {
            let size = self.size(store)? + 1;
            self.write_size(&mut batch, size);
            Some(size)
        } else {
            None
        };

        store.write(batch)?;
        if size.is_some() {
            self.size = size;
        }
        Ok(is_new)
    }

    /// Overwrites an existing field without touching the count.
    pub fn modify<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        field: &[u8],
        value: &[u8],
    ) -> CommandResult<()> {
        let key = self.field_key(field)?;
        if store.get(&key)?.is_none() {
            return Err(CommandError::NotFound);
        }
        store.put(&key, value)?;
        Ok(())
    }

    /// Removes a field.
    pub fn delete<S: Store + ?Sized>(&mut self, store: &mut S, field: &[u8]) -> CommandResult<()> {
        let key = self.field_key(field)?;
        if store.get(&key)?.is_none() {
            return Err(CommandError::NotFound);
        }

        let size = self.size(store)?.saturating_sub(1);
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_size(&mut batch, size);

        store.write(batch)?;
        self.size = Some(size);
        Ok(())
    }

    /// Adds `delta` to an integer field, creating it at 0 if absent.
    pub fn incr<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        field: &[u8],
        delta: i64,
    ) -> CommandResult<i64> {
        let key = self.field_key(field)?;
        let current = store.get(&key)?;
        let is_new = current.is_none();
        let value = match current {
            Some(raw) => parse_int(&raw, "value")?,
            None => 0,
        };
        let value = value.checked_add(delta).ok_or_else(|| {
            CommandError::InvalidParameter("increment or decrement would overflow".into())
        })?;

        let mut batch = WriteBatch::new();
        batch.put(key, value.to_string());
        let size = if is_new {
            let size = self.size(store)? + 1;
            self.write_size(&mut batch, size);
            Some(size)
        } else {
            None
        };

        store.write(batch)?;
        if size.is_some() {
            self.size = size;
        }
        Ok(value)
    }

    /// Removes every field and the count record. Returns the number removed.
    pub fn clear<S: Store + ?Sized>(&mut self, store: &mut S) -> CommandResult<u64> {
        let mut batch = WriteBatch::new();
        let mut removed = 0;
        self.scanner(store).for_each_key(|key| {
            batch.delete(key);
            removed += 1;
        });
        // The template itself is excluded from the scan.
        batch.delete(self.template.clone());

        store.write(batch)?;
        self.size = Some(0);
        Ok(removed)
    }

    /// Field names in order.
    pub fn keys<S: Store + ?Sized>(&self, store: &S) -> Vec<Bytes> {
        self.scanner(store).keys(&self.template, None, 0)
    }

    /// Field values in field order.
    pub fn values<S: Store + ?Sized>(&self, store: &S) -> Vec<Bytes> {
        self.scanner(store).values(&self.template, None, 0)
    }

    /// Field/value pairs in field order.
    pub fn get_all<S: Store + ?Sized>(&self, store: &S) -> Vec<(Bytes, Bytes)> {
        self.scanner(store).range(&self.template, None, 0)
    }

    /// Writes `f1 v1 f2 v2 ...` in one batch. Returns the number of new fields.
    pub fn multi_set<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        args: &[Bytes],
    ) -> CommandResult<u64> {
        let pairs = pairs(args)?;
        let mut batch = WriteBatch::new();
        let mut added = 0;
        for (field, value) in &pairs {
            let key = self.field_key(field)?;
            if store.get(&key)?.is_none() {
                added += 1;
            }
            batch.put(key, value.to_vec());
        }

        let size = self.size(store)? + added;
        if added > 0 {
            self.write_size(&mut batch, size);
        }

        store.write(batch)?;
        self.size = Some(size);
        Ok(added)
    }
}

/// Executes a hash command. `args` excludes the command and hash name.
pub fn process<S: Store + ?Sized>(
    hash: &mut HashMapCollection,
    store: &mut S,
    cmd: HashCommand,
    args: &[Bytes],
) -> CommandResult<Vec<Bytes>> {
    match cmd {
        HashCommand::Size => Ok(vec![int_block(hash.size(store)?)]),
        HashCommand::Get => Ok(vec![hash.get(store, arg(args, 0)?)?]),
        HashCommand::Exists => Ok(vec![bool_block(hash.exists(store, arg(args, 0)?)?)]),
        HashCommand::Set => {
            let is_new = hash.set(store, arg(args, 0)?, arg(args, 1)?)?;
            Ok(vec![int_block(u8::from(is_new))])
        }
        HashCommand::Mod => {
            hash.modify(store, arg(args, 0)?, arg(args, 1)?)?;
            Ok(vec![])
        }
        HashCommand::Del => {
            hash.delete(store, arg(args, 0)?)?;
            Ok(vec![])
        }
        HashCommand::Incr | HashCommand::Decr => {
            let mut delta = parse_int(arg(args, 1)?, "delta")?;
            if cmd == HashCommand::Decr {
                delta = delta.checked_neg().ok_or_else(|| {
                    CommandError::InvalidParameter("increment or decrement would overflow".into())
                })?;
            }
            Ok(vec![int_block(hash.incr(store, arg(args, 0)?, delta)?)])
        }
        HashCommand::Clear => Ok(vec![int_block(hash.clear(store)?)]),
        HashCommand::Keys => Ok(hash.keys(store)),
        HashCommand::Vals => Ok(hash.values(store)),
        HashCommand::GetAll => Ok(hash
            .get_all(store)
            .into_iter()
            .flat_map(|(k, v)| [k, v])
            .collect()),
        HashCommand::MultiSet => Ok(vec![int_block(hash.multi_set(store, args)?)]),
        HashCommand::Scan | HashCommand::RScan | HashCommand::List => {
            Err(CommandError::NotImplemented)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStore;

    fn setup() -> (MemStore, HashMapCollection) {
        (MemStore::new(), HashMapCollection::new(b"h").unwrap())
    }

    #[test]
    fn test_set_counts_only_new_fields() {
        let (mut store, mut h) = setup();
        assert!(h.set(&mut store, b"f", b"v").unwrap());
        assert_eq!(h.size(&store).unwrap(), 1);

        // Same field, same value: count unchanged.
        assert!(!h.set(&mut store, b"f", b"v").unwrap());
        assert_eq!(h.size(&store).unwrap(), 1);

        h.set(&mut store, b"g", b"w").unwrap();
        assert_eq!(h.size(&store).unwrap(), 2);
        assert_eq!(h.get(&store, b"g").unwrap(), "w");
    }

    #[test]
    fn test_size_record_persists() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"a", b"1").unwrap();
        h.set(&mut store, b"b", b"2").unwrap();

        // A fresh handle reloads the count from storage.
        let mut fresh = HashMapCollection::new(b"h").unwrap();
        assert_eq!(fresh.size(&store).unwrap(), 2);
    }

    #[test]
    fn test_delete_removes_size_record_at_zero() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"f", b"v").unwrap();
        h.delete(&mut store, b"f").unwrap();

        assert_eq!(h.size(&store).unwrap(), 0);
        assert_eq!(store.get(&h.template).unwrap(), None);
        assert!(store.is_empty());
        assert!(matches!(h.delete(&mut store, b"f"), Err(CommandError::NotFound)));
    }

    #[test]
    fn test_delete_rewrites_size_record() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"a", b"1").unwrap();
        h.set(&mut store, b"b", b"2").unwrap();
        h.delete(&mut store, b"a").unwrap();

        let raw = store.get(&h.template).unwrap().unwrap();
        assert_eq!(read_u64_le(&raw), Some(1));
    }

    #[test]
    fn test_modify_requires_existing_field() {
        let (mut store, mut h) = setup();
        assert!(matches!(
            h.modify(&mut store, b"f", b"v"),
            Err(CommandError::NotFound)
        ));

        h.set(&mut store, b"f", b"v").unwrap();
        h.modify(&mut store, b"f", b"w").unwrap();
        assert_eq!(h.get(&store, b"f").unwrap(), "w");
        assert_eq!(h.size(&store).unwrap(), 1);
    }

    #[test]
    fn test_incr_counts_new_field() {
        let (mut store, mut h) = setup();
        assert_eq!(h.incr(&mut store, b"n", 3).unwrap(), 3);
        assert_eq!(h.incr(&mut store, b"n", -1).unwrap(), 2);
        assert_eq!(h.size(&store).unwrap(), 1);
    }

    #[test]
    fn test_listing_in_field_order() {
        let (mut store, mut h) = setup();
        for (f, v) in [("bb", "2"), ("a", "1"), ("c", "3")] {
            h.set(&mut store, f.as_bytes(), v.as_bytes()).unwrap();
        }
        // A neighbouring hash must not leak into the listing.
        let mut other = HashMapCollection::new(b"i").unwrap();
        other.set(&mut store, b"x", b"9").unwrap();

        assert_eq!(h.keys(&store), vec!["a", "c", "bb"]);
        assert_eq!(h.values(&store), vec!["1", "3", "2"]);
        assert_eq!(h.get_all(&store).len(), 3);
    }

    #[test]
    fn test_clear() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"a", b"1").unwrap();
        h.set(&mut store, b"b", b"2").unwrap();

        assert_eq!(h.clear(&mut store).unwrap(), 2);
        assert_eq!(h.size(&store).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_multi_set() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"a", b"0").unwrap();
        let args: Vec<Bytes> = ["a", "1", "b", "2", "b", "3"]
            .iter()
            .map(|s| Bytes::from(*s))
            .collect();

        assert_eq!(h.multi_set(&mut store, &args).unwrap(), 1);
        assert_eq!(h.size(&store).unwrap(), 2);
        assert_eq!(h.get(&store, b"b").unwrap(), "3");
    }

    #[test]
    fn test_empty_field_rejected() {
        let (mut store, mut h) = setup();
        h.set(&mut store, b"a", b"1").unwrap();

        let rejected = |r: CommandResult<_>| matches!(r, Err(CommandError::InvalidParameter(_)));
        assert!(rejected(h.set(&mut store, b"", b"v").map(|_| ())));
        assert!(rejected(h.modify(&mut store, b"", b"v")));
        assert!(rejected(h.incr(&mut store, b"", 1).map(|_| ())));
        assert!(rejected(h.delete(&mut store, b"")));
        assert!(rejected(h.get(&store, b"").map(|_| ())));
        assert!(rejected(h.exists(&store, b"").map(|_| ())));
        let args = vec![Bytes::from("b"), Bytes::from("2"), Bytes::new(), Bytes::from("v")];
        assert!(rejected(h.multi_set(&mut store, &args).map(|_| ())));

        // The count record is untouched and still decodes
        let mut fresh = HashMapCollection::new(b"h").unwrap();
        assert_eq!(fresh.size(&store).unwrap(), 1);
        assert_eq!(h.keys(&store), vec!["a"]);
    }

    #[test]
    fn test_process_set_reports_insert() {
        let (mut store, mut h) = setup();
        let args = vec![Bytes::from("f"), Bytes::from("v")];
        assert_eq!(
            process(&mut h, &mut store, HashCommand::Set, &args).unwrap(),
            vec!["1"]
        );
        assert_eq!(
            process(&mut h, &mut store, HashCommand::Set, &args).unwrap(),
            vec!["0"]
        );
        assert_eq!(
            process(&mut h, &mut store, HashCommand::Size, &[]).unwrap(),
            vec!["1"]
        );
    }
}
