//! Sorted Set Collection
//!
//! A sorted set named `n` is kept in three record families:
//!
//! ```text
//!   ZN len(n) n                  -> count:u64le    (absent when empty)
//!   ZK len(n) n member           -> score:i64le    (member lookup)
//!   ZS len(n) n score:i64 member -> ""             (ordered by score, then member)
//! ```
//!
//! Every member has exactly one `ZK` record and one `ZS` record carrying the
//! same score. Changing a score rewrites both in one batch and drops the
//! stale `ZS` record.

use crate::commands::{
    arg, bool_block, corrupt, int_block, pairs, parse_int, CommandError, CommandResult,
};
use crate::protocol::command::ZSetCommand;
use crate::storage::encoding::{
    read_i64_le, read_u64_le, with_suffix, zset_score_key, zset_template, ZSET_KEY, ZSET_SCORE,
    ZSET_SIZE,
};
use crate::storage::{RangeScanner, Store, WriteBatch};
use bytes::Bytes;

/// One named sorted set.
#[derive(Debug, Clone)]
pub struct SortedSet {
    size_key: Vec<u8>,
    key_template: Vec<u8>,
    score_template: Vec<u8>,
    size: Option<u64>,
}

impl SortedSet {
    /// Creates the handle for sorted set `name`. Nothing is read yet.
    pub fn new(name: &[u8]) -> CommandResult<Self> {
        Ok(Self {
            size_key: zset_template(ZSET_SIZE, name)?,
            key_template: zset_template(ZSET_KEY, name)?,
            score_template: zset_template(ZSET_SCORE, name)?,
            size: None,
        })
    }

    fn member_key(&self, member: &[u8]) -> Vec<u8> {
        with_suffix(&self.key_template, member)
    }

    fn score_key(&self, score: i64, member: &[u8]) -> Vec<u8> {
        zset_score_key(&self.score_template, score, member)
    }

    fn write_size(&self, batch: &mut WriteBatch, size: u64) {
        if size == 0 {
            batch.delete(self.size_key.clone());
        } else {
            batch.put(self.size_key.clone(), size.to_le_bytes().to_vec());
        }
    }

    /// Number of members.
    pub fn size<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = match store.get(&self.size_key)? {
            Some(raw) => read_u64_le(&raw).ok_or_else(|| corrupt("zset size record"))?,
            None => 0,
        };
        self.size = Some(size);
        Ok(size)
    }

    /// Current score of `member`, if present.
    fn score_of<S: Store + ?Sized>(&self, store: &S, member: &[u8]) -> CommandResult<Option<i64>> {
        match store.get(&self.member_key(member))? {
            Some(raw) => read_i64_le(&raw)
                .map(Some)
                .ok_or_else(|| corrupt("zset score record")),
            None => Ok(None),
        }
    }

    /// Score of `member`.
    pub fn get<S: Store + ?Sized>(&self, store: &S, member: &[u8]) -> CommandResult<i64> {
        self.score_of(store, member)?.ok_or(CommandError::NotFound)
    }

    /// Returns true if `member` is present.
    pub fn exists<S: Store + ?Sized>(&self, store: &S, member: &[u8]) -> CommandResult<bool> {
        Ok(store.get(&self.member_key(member))?.is_some())
    }

    /// Queues both index records for `member` at `score`, dropping the
    /// score record for `old` if it differs.
    fn stage(&self, batch: &mut WriteBatch, member: &[u8], old: Option<i64>, score: i64) {
        if let Some(old) = old.filter(|&old| old != score) {
            batch.delete(self.score_key(old, member));
        }
        batch.put(self.member_key(member), score.to_le_bytes().to_vec());
        batch.put(self.score_key(score, member), Vec::new());
    }

    /// Sets the score of `member`. Returns true if the member is new.
    pub fn set<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        member: &[u8],
        score: i64,
    ) -> CommandResult<bool> {
        let old = self.score_of(store, member)?;
        let mut batch = WriteBatch::new();
        self.stage(&mut batch, member, old, score);

        let size = match old {
            None => {
                let size = self.size(store)? + 1;
                self.write_size(&mut batch, size);
                Some(size)
            }
            Some(_) => None,
        };

        store.write(batch)?;
        if size.is_some() {
            self.size = size;
        }
        Ok(old.is_none())
    }

    /// Changes the score of an existing member without touching the count.
    pub fn modify<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        member: &[u8],
        score: i64,
    ) -> CommandResult<()> {
        let old = self.get(store, member)?;
        let mut batch = WriteBatch::new();
        self.stage(&mut batch, member, Some(old), score);
        store.write(batch)?;
        Ok(())
    }

    /// Adds `delta` to the score of `member`, adding it at 0 if absent.
    pub fn incr<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        member: &[u8],
        delta: i64,
    ) -> CommandResult<i64> {
        let old = self.score_of(store, member)?;
        let score = old.unwrap_or(0).checked_add(delta).ok_or_else(|| {
            CommandError::InvalidParameter("increment or decrement would overflow".into())
        })?;
        self.set(store, member, score)?;
        Ok(score)
    }

    /// Removes `member`.
    pub fn delete<S: Store + ?Sized>(&mut self, store: &mut S, member: &[u8]) -> CommandResult<()> {
        let score = self.get(store, member)?;
        let size = self.size(store)?.saturating_sub(1);

        let mut batch = WriteBatch::new();
        batch.delete(self.member_key(member));
        batch.delete(self.score_key(score, member));
        self.write_size(&mut batch, size);

        store.write(batch)?;
        self.size = Some(size);
        Ok(())
    }

    /// Removes every member and the count record. Returns the number removed.
    pub fn clear<S: Store + ?Sized>(&mut self, store: &mut S) -> CommandResult<u64> {
        let mut batch = WriteBatch::new();
        let mut removed = 0;
        for (member, raw) in self.scan_members(store) {
            let score = read_i64_le(&raw).ok_or_else(|| corrupt("zset score record"))?;
            batch.delete(self.member_key(&member));
            batch.delete(self.score_key(score, &member));
            removed += 1;
        }
        batch.delete(self.size_key.clone());

        store.write(batch)?;
        self.size = Some(0);
        Ok(removed)
    }

    fn scan_members<S: Store + ?Sized>(&self, store: &S) -> Vec<(Bytes, Bytes)> {
        RangeScanner::new(store, &self.key_template).range(&self.key_template, None, 0)
    }

    /// The `n` lowest-scored members, ascending by score then member.
    pub fn top_n<S: Store + ?Sized>(&self, store: &S, n: usize) -> CommandResult<Vec<(Bytes, i64)>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        RangeScanner::new(store, &self.score_template)
            .keys(&self.score_template, None, n)
            .into_iter()
            .map(|suffix| {
                let score = read_i64_le(&suffix).ok_or_else(|| corrupt("zset score key"))?;
                Ok((suffix.slice(8..), score))
            })
            .collect()
    }

    /// Every member with its score, in member order.
    pub fn get_all<S: Store + ?Sized>(&self, store: &S) -> CommandResult<Vec<(Bytes, i64)>> {
        self.scan_members(store)
            .into_iter()
            .map(|(member, raw)| {
                let score = read_i64_le(&raw).ok_or_else(|| corrupt("zset score record"))?;
                Ok((member, score))
            })
            .collect()
    }

    /// Sets `m1 s1 m2 s2 ...` in one batch. Returns the number of new members.
    pub fn multi_set<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        args: &[Bytes],
    ) -> CommandResult<u64> {
        let pairs = pairs(args)?;
        let mut batch = WriteBatch::new();
        let mut added = 0;
        for (member, score) in &pairs {
            let score = parse_score(score)?;
            let old = self.score_of(store, member)?;
            if old.is_none() {
                added += 1;
            }
            self.stage(&mut batch, member, old, score);
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

fn parse_score(raw: &[u8]) -> CommandResult<i64> {
    parse_int(raw, "score")
}

fn flatten(entries: Vec<(Bytes, i64)>) -> Vec<Bytes> {
    entries
        .into_iter()
        .flat_map(|(member, score)| [member, int_block(score)])
        .collect()
}

/// Executes a sorted set command. `args` excludes the command and set name.
pub fn process<S: Store + ?Sized>(
    zset: &mut SortedSet,
    store: &mut S,
    cmd: ZSetCommand,
    args: &[Bytes],
) -> CommandResult<Vec<Bytes>> {
    match cmd {
        ZSetCommand::Size => Ok(vec![int_block(zset.size(store)?)]),
        ZSetCommand::Get => Ok(vec![int_block(zset.get(store, arg(args, 0)?)?)]),
        ZSetCommand::Exists => Ok(vec![bool_block(zset.exists(store, arg(args, 0)?)?)]),
        ZSetCommand::Set => {
            let score = parse_score(arg(args, 1)?)?;
            let is_new = zset.set(store, arg(args, 0)?, score)?;
            Ok(vec![int_block(u8::from(is_new))])
        }
        ZSetCommand::Mod => {
            let score = parse_score(arg(args, 1)?)?;
            zset.modify(store, arg(args, 0)?, score)?;
            Ok(vec![])
        }
        ZSetCommand::Del => {
            zset.delete(store, arg(args, 0)?)?;
            Ok(vec![])
        }
        ZSetCommand::Incr | ZSetCommand::Decr => {
            let mut delta = parse_int(arg(args, 1)?, "delta")?;
            if cmd == ZSetCommand::Decr {
                delta = delta.checked_neg().ok_or_else(|| {
                    CommandError::InvalidParameter("increment or decrement would overflow".into())
                })?;
            }
            Ok(vec![int_block(zset.incr(store, arg(args, 0)?, delta)?)])
        }
        ZSetCommand::Clear => Ok(vec![int_block(zset.clear(store)?)]),
        ZSetCommand::TopN => {
            let n = parse_int(arg(args, 0)?, "n")?;
            let n = usize::try_from(n)
                .map_err(|_| CommandError::InvalidParameter("n should not be negative".into()))?;
            Ok(flatten(zset.top_n(store, n)?))
        }
        ZSetCommand::GetAll => Ok(flatten(zset.get_all(store)?)),
        ZSetCommand::MultiSet => Ok(vec![int_block(zset.multi_set(store, args)?)]),
        ZSetCommand::Scan
        | ZSetCommand::RScan
        | ZSetCommand::Keys
        | ZSetCommand::List
        | ZSetCommand::Count
        | ZSetCommand::Sum
        | ZSetCommand::Avg
        | ZSetCommand::RemRangeByRank
        | ZSetCommand::RemRangeByScore
        | ZSetCommand::MultiExists
        | ZSetCommand::MultiSize
        | ZSetCommand::MultiGet
        | ZSetCommand::MultiDel => Err(CommandError::NotImplemented),
    }
}
