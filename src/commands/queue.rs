//! Double-Ended Queue Collection
//!
//! A queue named `n` stores items as `Q len(n) n seq -> value`, where `seq`
//! is drawn from a fixed sequence space and sorted numerically by the store.
//! Sequence 0 is reserved for the meta record:
//!
//! ```text
//!   meta value = [size:u64le][front:u64be][back:u64be]
//!
//!   seq:  0      ...   front   front+1 ... back-1   back   ...   MAX_SEQ
//!         meta          ^      └─── live items ──┘    ^
//!                       one before the oldest         one after the newest
//! ```
//!
//! An empty queue sits in the middle of the space (`front = INIT - 1`,
//! `back = INIT`) so it can grow in both directions. `size` always equals
//! `back - front - 1`; the meta record is removed when the queue empties.

use crate::commands::{arg, corrupt, int_block, parse_int, CommandError, CommandResult};
use crate::protocol::command::QueueCommand;
use crate::storage::encoding::{
    name_template, queue_item_key, read_u64_be, read_u64_le, QUEUE_TAG,
};
use crate::storage::{RangeScanner, Store, WriteBatch};
use bytes::Bytes;

/// Sequence number of the meta record.
pub const META_SEQ: u64 = 0;
/// Lowest item sequence number.
pub const MIN_SEQ: u64 = 1;
/// Highest item sequence number.
pub const MAX_SEQ: u64 = u64::MAX / 2;
/// Where an empty queue's back pointer starts.
pub const INIT_SEQ: u64 = MAX_SEQ / 2;

/// Cached state of the meta record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMeta {
    pub size: u64,
    pub front: u64,
    pub back: u64,
}

impl QueueMeta {
    /// State of a queue with no items.
    pub const EMPTY: QueueMeta = QueueMeta {
        size: 0,
        front: INIT_SEQ - 1,
        back: INIT_SEQ,
    };

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.front.to_be_bytes());
        buf.extend_from_slice(&self.back.to_be_bytes());
        buf
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() != 24 {
            return None;
        }
        let meta = QueueMeta {
            size: read_u64_le(raw)?,
            front: read_u64_be(&raw[8..])?,
            back: read_u64_be(&raw[16..])?,
        };
        // size == back - front - 1
        let span = meta.back.checked_sub(meta.front)?.checked_sub(1)?;
        (span == meta.size).then_some(meta)
    }
}

/// One named queue.
#[derive(Debug, Clone)]
pub struct Queue {
    template: Vec<u8>,
    meta_key: Vec<u8>,
    meta: Option<QueueMeta>,
}

impl Queue {
    /// Creates the handle for queue `name`. Nothing is read yet.
    pub fn new(name: &[u8]) -> CommandResult<Self> {
        let template = name_template(QUEUE_TAG, name)?;
        let meta_key = queue_item_key(&template, META_SEQ);
        Ok(Self {
            template,
            meta_key,
            meta: None,
        })
    }

    fn item_key(&self, seq: u64) -> Vec<u8> {
        queue_item_key(&self.template, seq)
    }

    /// Loads (and caches) the meta record.
    pub fn meta<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<QueueMeta> {
        if let Some(meta) = self.meta {
            return Ok(meta);
        }
        let meta = match store.get(&self.meta_key)? {
            Some(raw) => QueueMeta::decode(&raw).ok_or_else(|| corrupt("queue meta record"))?,
            None => QueueMeta::EMPTY,
        };
        self.meta = Some(meta);
        Ok(meta)
    }

    /// Queues the meta record for `meta`, removing it when empty.
    fn write_meta(&self, batch: &mut WriteBatch, meta: &QueueMeta) {
        if meta.size == 0 {
            batch.delete(self.meta_key.clone());
        } else {
            batch.put(self.meta_key.clone(), meta.encode());
        }
    }

    fn read_item<S: Store + ?Sized>(&self, store: &S, seq: u64) -> CommandResult<Bytes> {
        store
            .get(&self.item_key(seq))?
            .ok_or_else(|| corrupt("queue item missing inside live range"))
    }

    /// Number of items.
    pub fn size<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<u64> {
        Ok(self.meta(store)?.size)
    }

    /// The oldest item.
    pub fn front<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<Bytes> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Err(CommandError::NotFound);
        }
        self.read_item(store, meta.front + 1)
    }

    /// The newest item.
    pub fn back<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<Bytes> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Err(CommandError::NotFound);
        }
        self.read_item(store, meta.back - 1)
    }

    /// Maps a possibly negative index onto `[0, size)`.
    fn resolve(meta: &QueueMeta, index: i64) -> CommandResult<u64> {
        let size = i128::from(meta.size);
        let index = i128::from(index);
        let index = if index < 0 { size + index } else { index };
        if index < 0 || index >= size {
            return Err(CommandError::OutOfRange);
        }
        Ok(index as u64)
    }

    /// The item at `index`; negative indices count from the back.
    pub fn get<S: Store + ?Sized>(&mut self, store: &S, index: i64) -> CommandResult<Bytes> {
        let meta = self.meta(store)?;
        let index = Self::resolve(&meta, index)?;
        self.read_item(store, meta.front + 1 + index)
    }

    /// Up to `count` items starting at `start`.
    pub fn slice<S: Store + ?Sized>(
        &mut self,
        store: &S,
        start: i64,
        count: i64,
    ) -> CommandResult<Vec<Bytes>> {
        if count < 0 {
            return Err(CommandError::InvalidParameter(
                "count should not be negative".into(),
            ));
        }
        let meta = self.meta(store)?;
        let start = Self::resolve(&meta, start)?;
        let count = (count as u64).min(meta.size - start);
        if count == 0 {
            return Ok(Vec::new());
        }

        let first = self.item_key(meta.front + 1 + start);
        Ok(RangeScanner::new(store, &self.template)
            .exclude(&self.meta_key)
            .values(&first, None, count as usize))
    }

    /// Every item, front to back.
    pub fn list<S: Store + ?Sized>(&mut self, store: &S) -> CommandResult<Vec<Bytes>> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Ok(Vec::new());
        }
        let first = self.item_key(meta.front + 1);
        Ok(RangeScanner::new(store, &self.template)
            .exclude(&self.meta_key)
            .values(&first, None, 0))
    }

    /// Pushes `values` at the front, one after another, so the last value
    /// ends up frontmost. Returns the new size.
    pub fn push_front<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        values: &[Bytes],
    ) -> CommandResult<u64> {
        let mut meta = self.meta(store)?;
        let n = values.len() as u64;
        // The lowest new item, front - n + 1, must stay >= MIN_SEQ.
        if meta.front < n.saturating_add(MIN_SEQ - 1) {
            return Err(CommandError::OutOfRange);
        }

        let mut batch = WriteBatch::new();
        for value in values {
            batch.put(self.item_key(meta.front), value.to_vec());
            meta.front -= 1;
        }
        meta.size += n;
        self.write_meta(&mut batch, &meta);

        store.write(batch)?;
        self.meta = Some(meta);
        Ok(meta.size)
    }

    /// Pushes `values` at the back in order. Returns the new size.
    pub fn push_back<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        values: &[Bytes],
    ) -> CommandResult<u64> {
        let mut meta = self.meta(store)?;
        let n = values.len() as u64;
        // The highest new item, back + n - 1, must stay <= MAX_SEQ.
        let last = meta.back.checked_add(n.saturating_sub(1));
        if last.map_or(true, |last| last > MAX_SEQ) {
            return Err(CommandError::OutOfRange);
        }

        let mut batch = WriteBatch::new();
        for value in values {
            batch.put(self.item_key(meta.back), value.to_vec());
            meta.back += 1;
        }
        meta.size += n;
        self.write_meta(&mut batch, &meta);

        store.write(batch)?;
        self.meta = Some(meta);
        Ok(meta.size)
    }

    /// Removes and returns the oldest item.
    pub fn pop_front<S: Store + ?Sized>(&mut self, store: &mut S) -> CommandResult<Bytes> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Err(CommandError::Empty);
        }
        let seq = meta.front + 1;
        let next = QueueMeta {
            size: meta.size - 1,
            front: seq,
            back: meta.back,
        };
        self.pop(store, seq, next)
    }

    /// Removes and returns the newest item.
    pub fn pop_back<S: Store + ?Sized>(&mut self, store: &mut S) -> CommandResult<Bytes> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Err(CommandError::Empty);
        }
        let seq = meta.back - 1;
        let next = QueueMeta {
            size: meta.size - 1,
            front: meta.front,
            back: seq,
        };
        self.pop(store, seq, next)
    }

    fn pop<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        seq: u64,
        next: QueueMeta,
    ) -> CommandResult<Bytes> {
        let value = self.read_item(store, seq)?;
        let next = if next.size == 0 { QueueMeta::EMPTY } else { next };

        let mut batch = WriteBatch::new();
        batch.delete(self.item_key(seq));
        self.write_meta(&mut batch, &next);

        store.write(batch)?;
        self.meta = Some(next);
        Ok(value)
    }

    /// Removes every item and the meta record. Returns the number removed.
    pub fn clear<S: Store + ?Sized>(&mut self, store: &mut S) -> CommandResult<u64> {
        let meta = self.meta(store)?;
        if meta.size == 0 {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for seq in meta.front + 1..meta.back {
            batch.delete(self.item_key(seq));
        }
        batch.delete(self.meta_key.clone());

        store.write(batch)?;
        self.meta = Some(QueueMeta::EMPTY);
        Ok(meta.size)
    }
}

/// Executes a queue command. `args` excludes the command and queue name.
pub fn process<S: Store + ?Sized>(
    queue: &mut Queue,
    store: &mut S,
    cmd: QueueCommand,
    args: &[Bytes],
) -> CommandResult<Vec<Bytes>> {
    match cmd {
        QueueCommand::Size => Ok(vec![int_block(queue.size(store)?)]),
        QueueCommand::Front => Ok(vec![queue.front(store)?]),
        QueueCommand::Back => Ok(vec![queue.back(store)?]),
        QueueCommand::Get => {
            let index = parse_int(arg(args, 0)?, "index")?;
            Ok(vec![queue.get(store, index)?])
        }
        QueueCommand::Slice => {
            let start = parse_int(arg(args, 0)?, "start")?;
            let count = parse_int(arg(args, 1)?, "count")?;
            queue.slice(store, start, count)
        }
        QueueCommand::List => queue.list(store),
        QueueCommand::PushFront => {
            let value = std::slice::from_ref(arg(args, 0)?);
            Ok(vec![int_block(queue.push_front(store, value)?)])
        }
        QueueCommand::PushBack => {
            let value = std::slice::from_ref(arg(args, 0)?);
            Ok(vec![int_block(queue.push_back(store, value)?)])
        }
        QueueCommand::MultiPushFront => {
            require_values(args)?;
            Ok(vec![int_block(queue.push_front(store, args)?)])
        }
        QueueCommand::MultiPushBack => {
            require_values(args)?;
            Ok(vec![int_block(queue.push_back(store, args)?)])
        }
        QueueCommand::PopFront => Ok(vec![queue.pop_front(store)?]),
        QueueCommand::PopBack => Ok(vec![queue.pop_back(store)?]),
        QueueCommand::Clear => Ok(vec![int_block(queue.clear(store)?)]),
        QueueCommand::Range => Err(CommandError::NotImplemented),
    }
}

fn require_values(args: &[Bytes]) -> CommandResult<()> {
    if args.is_empty() {
        return Err(CommandError::InvalidParameter("no values to push".into()));
    }
    Ok(())
}
