//! Command Table
//!
//! Static registry mapping every command name to the data type it acts on,
//! the exact number of request blocks it takes (command name included), and
//! whether it reads or writes.
//!
//! `multi_*` commands take a variable number of arguments; for them the
//! block count is a minimum rather than an exact requirement.

use std::fmt;

/// The data type a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Flat,
    Hash,
    Queue,
    ZSet,
}

/// Read/write classification of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

/// Flat key/value commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlatCommand {
    Get,
    GetAll,
    Set,
    SetX,
    SetNx,
    GetSet,
    Del,
    Incr,
    Decr,
    Scan,
    RScan,
    Keys,
    Exists,
    MultiSet,
}

/// Hash map commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashCommand {
    Size,
    Get,
    Set,
    Mod,
    Del,
    Incr,
    Decr,
    Clear,
    GetAll,
    Scan,
    RScan,
    Keys,
    Vals,
    List,
    Exists,
    MultiSet,
}

/// Queue commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueCommand {
    Size,
    Front,
    Back,
    Get,
    Slice,
    Range,
    List,
    PushFront,
    PushBack,
    PopFront,
    PopBack,
    Clear,
    MultiPushFront,
    MultiPushBack,
}

/// Sorted set commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZSetCommand {
    Size,
    Get,
    Set,
    Mod,
    Del,
    Incr,
    Decr,
    Clear,
    Exists,
    TopN,
    GetAll,
    Scan,
    RScan,
    Keys,
    List,
    Count,
    Sum,
    Avg,
    RemRangeByRank,
    RemRangeByScore,
    MultiExists,
    MultiSize,
    MultiGet,
    MultiSet,
    MultiDel,
}

/// A resolved command, tagged by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Flat(FlatCommand),
    Hash(HashCommand),
    Queue(QueueCommand),
    ZSet(ZSetCommand),
}

impl Command {
    /// The data type this command operates on.
    pub fn category(&self) -> Category {
        match self {
            Command::Flat(_) => Category::Flat,
            Command::Hash(_) => Category::Hash,
            Command::Queue(_) => Category::Queue,
            Command::ZSet(_) => Category::ZSet,
        }
    }
}

/// One row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub command: Command,
    /// Number of request blocks, command name included
    pub arity: usize,
    pub access: Access,
}

impl CommandSpec {
    /// Returns true for variable-length `multi_*` commands.
    pub fn is_multi(&self) -> bool {
        self.name.starts_with("multi_")
    }

    /// Checks the number of request blocks against the table.
    pub fn accepts(&self, blocks: usize) -> bool {
        if self.is_multi() {
            blocks >= self.arity
        } else {
            blocks == self.arity
        }
    }

    /// Data type of the command.
    pub fn category(&self) -> Category {
        self.command.category()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            Access::Read => "read",
            Access::Write => "write",
        };
        let args = if self.is_multi() { "+" } else { "" };
        write!(
            f,
            "{} ({:?}, {} blocks{}, {})",
            self.name,
            self.category(),
            self.arity,
            args,
            access
        )
    }
}

const fn spec(name: &'static str, command: Command, arity: usize, access: Access) -> CommandSpec {
    CommandSpec {
        name,
        command,
        arity,
        access,
    }
}

use Access::{Read as R, Write as W};
use Command::{Flat as K, Hash as H, Queue as Q, ZSet as Z};

/// Every command the server knows.
pub static COMMAND_TABLE: &[CommandSpec] = &[
    // Flat
    spec("get", K(FlatCommand::Get), 2, R),
    spec("getall", K(FlatCommand::GetAll), 1, R),
    spec("set", K(FlatCommand::Set), 3, W),
    spec("setx", K(FlatCommand::SetX), 4, W),
    spec("setnx", K(FlatCommand::SetNx), 3, W),
    spec("getset", K(FlatCommand::GetSet), 3, W),
    spec("del", K(FlatCommand::Del), 2, W),
    spec("incr", K(FlatCommand::Incr), 3, W),
    spec("decr", K(FlatCommand::Decr), 3, W),
    spec("scan", K(FlatCommand::Scan), 4, R),
    spec("rscan", K(FlatCommand::RScan), 4, R),
    spec("keys", K(FlatCommand::Keys), 1, R),
    spec("exists", K(FlatCommand::Exists), 2, R),
    spec("multi_set", K(FlatCommand::MultiSet), 3, W),
    // Hash
    spec("hsize", H(HashCommand::Size), 2, R),
    spec("hget", H(HashCommand::Get), 3, R),
    spec("hset", H(HashCommand::Set), 4, W),
    spec("hmod", H(HashCommand::Mod), 4, W),
    spec("hdel", H(HashCommand::Del), 3, W),
    spec("hincr", H(HashCommand::Incr), 4, W),
    spec("hdecr", H(HashCommand::Decr), 4, W),
    spec("hclear", H(HashCommand::Clear), 2, W),
    spec("hgetall", H(HashCommand::GetAll), 2, R),
    spec("hscan", H(HashCommand::Scan), 5, R),
    spec("hrscan", H(HashCommand::RScan), 5, R),
    spec("hkeys", H(HashCommand::Keys), 2, R),
    spec("hvals", H(HashCommand::Vals), 2, R),
    spec("hlist", H(HashCommand::List), 4, R),
    spec("hexists", H(HashCommand::Exists), 3, R),
    spec("multi_hset", H(HashCommand::MultiSet), 3, W),
    // Queue
    spec("qsize", Q(QueueCommand::Size), 2, R),
    spec("qfront", Q(QueueCommand::Front), 2, R),
    spec("qback", Q(QueueCommand::Back), 2, R),
    spec("qget", Q(QueueCommand::Get), 3, R),
    spec("qslice", Q(QueueCommand::Slice), 4, R),
    spec("qrange", Q(QueueCommand::Range), 3, R),
    spec("qlist", Q(QueueCommand::List), 2, R),
    spec("qpush", Q(QueueCommand::PushBack), 3, W),
    spec("qpush_front", Q(QueueCommand::PushFront), 3, W),
    spec("qpush_back", Q(QueueCommand::PushBack), 3, W),
    spec("qpop", Q(QueueCommand::PopFront), 2, W),
    spec("qpop_front", Q(QueueCommand::PopFront), 2, W),
    spec("qpop_back", Q(QueueCommand::PopBack), 2, W),
    spec("qclear", Q(QueueCommand::Clear), 2, W),
    spec("multi_qpush", Q(QueueCommand::MultiPushBack), 3, W),
    spec("multi_qpush_front", Q(QueueCommand::MultiPushFront), 3, W),
    spec("multi_qpush_back", Q(QueueCommand::MultiPushBack), 3, W),
    // Sorted set
    spec("zsize", Z(ZSetCommand::Size), 2, R),
    spec("zget", Z(ZSetCommand::Get), 3, R),
    spec("zset", Z(ZSetCommand::Set), 4, W),
    spec("zmod", Z(ZSetCommand::Mod), 4, W),
    spec("zdel", Z(ZSetCommand::Del), 3, W),
    spec("zincr", Z(ZSetCommand::Incr), 4, W),
    spec("zdecr", Z(ZSetCommand::Decr), 4, W),
    spec("zclear", Z(ZSetCommand::Clear), 2, W),
    spec("zexists", Z(ZSetCommand::Exists), 3, R),
    spec("ztopn", Z(ZSetCommand::TopN), 3, R),
    spec("zgetall", Z(ZSetCommand::GetAll), 2, R),
    spec("zscan", Z(ZSetCommand::Scan), 6, R),
    spec("zrscan", Z(ZSetCommand::RScan), 6, R),
    spec("zkeys", Z(ZSetCommand::Keys), 6, R),
    spec("zlist", Z(ZSetCommand::List), 4, R),
    spec("zcount", Z(ZSetCommand::Count), 4, R),
    spec("zsum", Z(ZSetCommand::Sum), 4, R),
    spec("zavg", Z(ZSetCommand::Avg), 4, R),
    spec("zremrangebyrank", Z(ZSetCommand::RemRangeByRank), 4, W),
    spec("zremrangebyscore", Z(ZSetCommand::RemRangeByScore), 4, W),
    spec("multi_zexists", Z(ZSetCommand::MultiExists), 3, R),
    spec("multi_zsize", Z(ZSetCommand::MultiSize), 2, R),
    spec("multi_zget", Z(ZSetCommand::MultiGet), 3, R),
    spec("multi_zset", Z(ZSetCommand::MultiSet), 4, W),
    spec("multi_zdel", Z(ZSetCommand::MultiDel), 3, W),
];

/// Resolves a command name. Names are case-sensitive.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|spec| spec.name.as_bytes() == name)
}
