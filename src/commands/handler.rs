//! Request Dispatch
//!
//! The [`CommandHandler`] owns the store and every collection handle that
//! has been touched so far. A request goes through three steps:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  lookup()   │───>│  dispatch() │───>│  render()   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │   name, arity        kv / hash /        CommandResult       │
//! │                      queue / zset        -> Reply           │
//! │                            │                                │
//! │                            ▼                                │
//! │                          Store                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collection handles are cached per name so their counters are read from
//! the store at most once. Every session on the server goes through the
//! same handler, so all of them see the same counters.

use crate::commands::hash::{self, HashMapCollection};
use crate::commands::queue::{self, Queue};
use crate::commands::zset::{self, SortedSet};
use crate::commands::{arg, kv, CommandError, CommandResult};
use crate::protocol::{lookup, Command, Reply};
use crate::storage::{MemStore, Store};
use bytes::Bytes;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, error};

/// Executes requests against a store.
pub struct CommandHandler<S: Store = MemStore> {
    store: S,
    hashes: HashMap<Bytes, HashMapCollection>,
    queues: HashMap<Bytes, Queue>,
    zsets: HashMap<Bytes, SortedSet>,
}

impl<S: Store> CommandHandler<S> {
    /// Creates a handler serving `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            hashes: HashMap::new(),
            queues: HashMap::new(),
            zsets: HashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying store.
    ///
    /// Writing collection records directly bypasses the cached counters.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Executes one request. `blocks[0]` is the command name.
    ///
    /// Always produces exactly one reply.
    pub fn execute(&mut self, blocks: &[Bytes]) -> Reply {
        let Some(name) = blocks.first() else {
            return Reply::client_error("Unknown command");
        };

        let Some(spec) = lookup(name) else {
            debug!(command = %String::from_utf8_lossy(name), "unknown command");
            return Reply::client_error("Unknown command");
        };

        if !spec.accepts(blocks.len()) {
            debug!(command = spec.name, blocks = blocks.len(), "wrong number of arguments");
            return Reply::client_error("Wrong number of arguments");
        }

        let reply = render(self.dispatch(spec.command, &blocks[1..]));
        debug!(command = spec.name, status = %reply.status, "executed");
        reply
    }

    fn dispatch(&mut self, command: Command, args: &[Bytes]) -> CommandResult<Vec<Bytes>> {
        match command {
            Command::Flat(cmd) => kv::process(&mut self.store, cmd, args),
            Command::Hash(cmd) => {
                let hash = cached(&mut self.hashes, arg(args, 0)?, HashMapCollection::new)?;
                hash::process(hash, &mut self.store, cmd, &args[1..])
            }
            Command::Queue(cmd) => {
                let queue = cached(&mut self.queues, arg(args, 0)?, Queue::new)?;
                queue::process(queue, &mut self.store, cmd, &args[1..])
            }
            Command::ZSet(cmd) => {
                let zset = cached(&mut self.zsets, arg(args, 0)?, SortedSet::new)?;
                zset::process(zset, &mut self.store, cmd, &args[1..])
            }
        }
    }
}

/// Returns the cached handle for `name`, creating it on first use.
fn cached<'c, T>(
    cache: &'c mut HashMap<Bytes, T>,
    name: &Bytes,
    create: impl FnOnce(&[u8]) -> CommandResult<T>,
) -> CommandResult<&'c mut T> {
    match cache.entry(name.clone()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => Ok(entry.insert(create(&name[..])?)),
    }
}

/// Maps a command outcome to its wire reply.
fn render(result: CommandResult<Vec<Bytes>>) -> Reply {
    match result {
        Ok(blocks) => Reply::ok(blocks),
        Err(CommandError::NotFound | CommandError::Empty) => Reply::not_found(),
        Err(CommandError::InvalidParameter(msg)) => Reply::client_error(msg),
        Err(e @ CommandError::OutOfRange) => Reply::client_error(e.to_string()),
        Err(e @ CommandError::NotImplemented) => Reply::error_message(e.to_string()),
        Err(CommandError::Store(e)) => {
            error!(error = %e, "store failure");
            Reply::error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyStatus;
    use crate::storage::{StoreError, StoreIter, WriteBatch};
    use std::cmp::Ordering;
    use std::io;

    /// A store whose writes can be made to fail.
    struct FailingStore {
        inner: MemStore,
        fail_writes: bool,
    }

    impl Store for FailingStore {
        fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
            self.inner.get(key)
        }

        fn write(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Io(io::Error::other("injected failure")));
            }
            self.inner.write(batch)
        }

        fn seek<'a>(&'a self, start: &[u8]) -> StoreIter<'a> {
            self.inner.seek(start)
        }

        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            self.inner.compare(a, b)
        }
    }

    fn create_handler() -> CommandHandler {
        CommandHandler::new(MemStore::new())
    }

    fn create_failing_handler() -> CommandHandler<FailingStore> {
        CommandHandler::new(FailingStore {
            inner: MemStore::new(),
            fail_writes: false,
        })
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn run<S: Store>(handler: &mut CommandHandler<S>, args: &[&str]) -> Reply {
        handler.execute(&make_command(args))
    }

    fn ok(blocks: &[&str]) -> Reply {
        Reply::ok(blocks.iter().map(|s| Bytes::from(s.to_string())).collect())
    }

    #[test]
    fn test_set_get() {
        let mut handler = create_handler();

        assert_eq!(run(&mut handler, &["set", "foo", "bar"]), ok(&[]));
        assert_eq!(run(&mut handler, &["get", "foo"]), ok(&["bar"]));
        assert_eq!(run(&mut handler, &["get", "nope"]), Reply::not_found());
    }

    #[test]
    fn test_queue_scenario() {
        let mut handler = create_handler();

        assert_eq!(run(&mut handler, &["qpush_back", "q", "x"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["qpush_back", "q", "y"]), ok(&["2"]));
        assert_eq!(run(&mut handler, &["qfront", "q"]), ok(&["x"]));
        assert_eq!(run(&mut handler, &["qpop_front", "q"]), ok(&["x"]));
        assert_eq!(run(&mut handler, &["qfront", "q"]), ok(&["y"]));

        run(&mut handler, &["qpop", "q"]);
        assert_eq!(run(&mut handler, &["qpop", "q"]), Reply::not_found());
        assert_eq!(run(&mut handler, &["qsize", "q"]), ok(&["0"]));
    }

    #[test]
    fn test_zset_scenario() {
        let mut handler = create_handler();

        assert_eq!(run(&mut handler, &["zset", "z", "alice", "10"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["zset", "z", "bob", "5"]), ok(&["1"]));
        assert_eq!(
            run(&mut handler, &["ztopn", "z", "2"]),
            ok(&["bob", "5", "alice", "10"])
        );
    }

    #[test]
    fn test_hash_scenario() {
        let mut handler = create_handler();

        assert_eq!(run(&mut handler, &["hset", "h", "f", "v"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["hset", "h", "f", "v"]), ok(&["0"]));
        assert_eq!(run(&mut handler, &["hsize", "h"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["hdel", "h", "f"]), ok(&[]));
        assert_eq!(run(&mut handler, &["hsize", "h"]), ok(&["0"]));
        assert!(handler.store().is_empty());
    }

    #[test]
    fn test_collections_are_independent() {
        let mut handler = create_handler();

        run(&mut handler, &["hset", "ab", "f", "1"]);
        run(&mut handler, &["hset", "cd", "f", "2"]);
        run(&mut handler, &["hset", "cd", "g", "3"]);

        assert_eq!(run(&mut handler, &["hgetall", "ab"]), ok(&["f", "1"]));
        assert_eq!(run(&mut handler, &["hsize", "cd"]), ok(&["2"]));
        assert_eq!(run(&mut handler, &["keys"]), ok(&[]));
    }

    #[test]
    fn test_unknown_command() {
        let mut handler = create_handler();

        let reply = run(&mut handler, &["flushall"]);
        assert_eq!(reply, Reply::client_error("Unknown command"));

        let reply = handler.execute(&[]);
        assert_eq!(reply.status, ReplyStatus::ClientError);
    }

    #[test]
    fn test_wrong_arity() {
        let mut handler = create_handler();

        let reply = run(&mut handler, &["get"]);
        assert_eq!(reply, Reply::client_error("Wrong number of arguments"));

        let reply = run(&mut handler, &["set", "k", "v", "extra"]);
        assert_eq!(reply.status, ReplyStatus::ClientError);

        // multi_* only has a minimum
        let reply = run(&mut handler, &["multi_set", "a", "1", "b", "2"]);
        assert_eq!(reply, ok(&["2"]));
        let reply = run(&mut handler, &["multi_set", "a"]);
        assert_eq!(reply.status, ReplyStatus::ClientError);
    }

    #[test]
    fn test_not_implemented() {
        let mut handler = create_handler();

        let reply = run(&mut handler, &["zcount", "z", "0", "10"]);
        assert_eq!(reply, Reply::error_message("not implemented"));

        let reply = run(&mut handler, &["scan", "a", "z", "10"]);
        assert_eq!(reply.status, ReplyStatus::Error);
    }

    #[test]
    fn test_out_of_range_and_bad_argument() {
        let mut handler = create_handler();
        run(&mut handler, &["qpush", "q", "a"]);

        let reply = run(&mut handler, &["qget", "q", "5"]);
        assert_eq!(reply, Reply::client_error("Out of range"));

        let reply = run(&mut handler, &["qget", "q", "x"]);
        assert_eq!(reply.status, ReplyStatus::ClientError);

        let reply = run(&mut handler, &["zset", "z", "m", "ten"]);
        assert_eq!(reply, Reply::client_error("score should be an integer"));
    }

    #[test]
    fn test_multi_qpush_reads_request_values() {
        let mut handler = create_handler();

        assert_eq!(
            run(&mut handler, &["multi_qpush", "q", "a", "b", "c"]),
            ok(&["3"])
        );
        assert_eq!(run(&mut handler, &["qlist", "q"]), ok(&["a", "b", "c"]));
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let mut handler = create_failing_handler();
        run(&mut handler, &["hset", "h", "f", "v"]);
        run(&mut handler, &["qpush", "q", "a"]);
        run(&mut handler, &["zset", "z", "m", "1"]);
        let before = handler.store().inner.len();

        handler.store_mut().fail_writes = true;
        assert_eq!(run(&mut handler, &["hset", "h", "g", "v"]), Reply::error());
        assert_eq!(run(&mut handler, &["qpush", "q", "b"]), Reply::error());
        assert_eq!(run(&mut handler, &["qpop", "q"]), Reply::error());
        assert_eq!(run(&mut handler, &["zset", "z", "n", "2"]), Reply::error());
        assert_eq!(run(&mut handler, &["zdel", "z", "m"]), Reply::error());
        assert_eq!(handler.store().inner.len(), before);

        handler.store_mut().fail_writes = false;
        assert_eq!(run(&mut handler, &["hsize", "h"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["qsize", "q"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["qfront", "q"]), ok(&["a"]));
        assert_eq!(run(&mut handler, &["zsize", "z"]), ok(&["1"]));
        assert_eq!(run(&mut handler, &["hget", "h", "g"]), Reply::not_found());
    }
}
