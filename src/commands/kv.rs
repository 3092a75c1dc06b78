//! Flat Key/Value Commands
//!
//! Flat records are stored as `K` + user key with the raw value. They keep
//! no auxiliary metadata, so every operation is stateless.

use crate::commands::{arg, bool_block, int_block, pairs, parse_int, CommandError, CommandResult};
use crate::protocol::command::FlatCommand;
use crate::storage::encoding::{kv_key, KV_TAG};
use crate::storage::{RangeScanner, Store, WriteBatch};
use bytes::Bytes;

/// Executes a flat command. `args` excludes the command name.
pub fn process<S: Store + ?Sized>(
    store: &mut S,
    cmd: FlatCommand,
    args: &[Bytes],
) -> CommandResult<Vec<Bytes>> {
    match cmd {
        FlatCommand::Get => Ok(vec![get(store, arg(args, 0)?)?]),
        FlatCommand::Set => {
            set(store, arg(args, 0)?, arg(args, 1)?)?;
            Ok(vec![])
        }
        FlatCommand::SetNx => {
            let written = set_nx(store, arg(args, 0)?, arg(args, 1)?)?;
            Ok(vec![int_block(u8::from(written))])
        }
        FlatCommand::GetSet => match get_set(store, arg(args, 0)?, arg(args, 1)?)? {
            Some(old) => Ok(vec![old]),
            None => Err(CommandError::NotFound),
        },
        FlatCommand::Del => {
            del(store, arg(args, 0)?)?;
            Ok(vec![])
        }
        FlatCommand::Exists => Ok(vec![bool_block(exists(store, arg(args, 0)?)?)]),
        FlatCommand::Incr => {
            let delta = parse_int(arg(args, 1)?, "delta")?;
            Ok(vec![int_block(incr(store, arg(args, 0)?, delta)?)])
        }
        FlatCommand::Decr => {
            let delta = parse_int(arg(args, 1)?, "delta")?;
            let delta = delta.checked_neg().ok_or_else(overflow)?;
            Ok(vec![int_block(incr(store, arg(args, 0)?, delta)?)])
        }
        FlatCommand::Keys => Ok(keys(store)),
        FlatCommand::GetAll => Ok(get_all(store)
            .into_iter()
            .flat_map(|(k, v)| [k, v])
            .collect()),
        FlatCommand::MultiSet => Ok(vec![int_block(multi_set(store, args)?)]),
        FlatCommand::SetX | FlatCommand::Scan | FlatCommand::RScan => {
            Err(CommandError::NotImplemented)
        }
    }
}

fn overflow() -> CommandError {
    CommandError::InvalidParameter("increment or decrement would overflow".into())
}

/// Reads a value.
pub fn get<S: Store + ?Sized>(store: &S, key: &[u8]) -> CommandResult<Bytes> {
    store.get(&kv_key(key))?.ok_or(CommandError::NotFound)
}

/// Writes a value.
pub fn set<S: Store + ?Sized>(store: &mut S, key: &[u8], value: &[u8]) -> CommandResult<()> {
    store.put(&kv_key(key), value)?;
    Ok(())
}

/// Writes a value only if the key is absent. Returns true if written.
pub fn set_nx<S: Store + ?Sized>(store: &mut S, key: &[u8], value: &[u8]) -> CommandResult<bool> {
    let k = kv_key(key);
    if store.get(&k)?.is_some() {
        return Ok(false);
    }
    store.put(&k, value)?;
    Ok(true)
}

/// Writes a value, returning the previous one.
pub fn get_set<S: Store + ?Sized>(
    store: &mut S,
    key: &[u8],
    value: &[u8],
) -> CommandResult<Option<Bytes>> {
    let k = kv_key(key);
    let old = store.get(&k)?;
    store.put(&k, value)?;
    Ok(old)
}

/// Removes a key. Removing a missing key succeeds.
pub fn del<S: Store + ?Sized>(store: &mut S, key: &[u8]) -> CommandResult<()> {
    store.delete(&kv_key(key))?;
    Ok(())
}

/// Returns true if the key exists.
pub fn exists<S: Store + ?Sized>(store: &S, key: &[u8]) -> CommandResult<bool> {
    Ok(store.get(&kv_key(key))?.is_some())
}

/// Adds `delta` to an integer value, treating a missing key as 0.
pub fn incr<S: Store + ?Sized>(store: &mut S, key: &[u8], delta: i64) -> CommandResult<i64> {
    let k = kv_key(key);
    let current = match store.get(&k)? {
        Some(v) => parse_int(&v, "value")?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or_else(overflow)?;
    store.put(&k, next.to_string().as_bytes())?;
    Ok(next)
}

/// Lists every flat key.
pub fn keys<S: Store + ?Sized>(store: &S) -> Vec<Bytes> {
    let prefix = [KV_TAG];
    RangeScanner::new(store, &prefix).keys(&prefix, None, 0)
}

/// Lists every flat key/value pair.
pub fn get_all<S: Store + ?Sized>(store: &S) -> Vec<(Bytes, Bytes)> {
    let prefix = [KV_TAG];
    RangeScanner::new(store, &prefix).range(&prefix, None, 0)
}

/// Writes `k1 v1 k2 v2 ...` in one batch. Returns the number of keys written.
pub fn multi_set<S: Store + ?Sized>(store: &mut S, args: &[Bytes]) -> CommandResult<usize> {
    let pairs = pairs(args)?;
    let mut batch = WriteBatch::new();
    for (key, value) in &pairs {
        batch.put(kv_key(key), value.to_vec());
    }
    store.write(batch)?;
    Ok(pairs.len())
}
