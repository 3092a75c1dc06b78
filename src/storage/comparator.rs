//! Record Key Ordering
//!
//! The store keeps keys sorted by a [`Comparator`]. The bundled
//! [`AggregateComparator`] dispatches on the type tag so that:
//!
//! - all records of one hash map sort together, ordered by field
//!   (shorter fields first, then bytewise), with the size record first;
//! - all records of one queue sort together, ordered by decoded sequence
//!   number, with the meta record (sequence 0) first;
//! - all records of one sorted set sort together, grouped by family
//!   (`K`, `N`, `S`), and score records ordered by decoded score then member.
//!
//! Keys with any other tag compare bytewise. Keys that carry a known tag but
//! are too short to decode sort before every well-formed key of that tag and
//! compare bytewise among themselves, which keeps the order total.
//!
//! Changing the comparator reorders every record, so a store written with
//! one comparator cannot be read with another.

use crate::storage::encoding::{
    read_i64_le, read_u64_le, split_name, HASH_TAG, QUEUE_TAG, ZSET_SCORE, ZSET_TAG,
};
use std::cmp::Ordering;

/// A total order over raw record keys.
pub trait Comparator {
    /// Stable identifier of this ordering.
    const NAME: &'static str;

    /// Three-way comparison of two keys.
    fn compare(a: &[u8], b: &[u8]) -> Ordering;

    /// Shortens `start` to a key in `[start, limit)`. Left as a no-op.
    fn find_shortest_separator(_start: &mut Vec<u8>, _limit: &[u8]) {}

    /// Shortens `key` to a key `>= key`. Left as a no-op.
    fn find_short_successor(_key: &mut Vec<u8>) {}
}

/// Plain lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    const NAME: &'static str = "catchdb.BytewiseComparator";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// The type-aware ordering used by every CatchDB store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateComparator;

impl Comparator for AggregateComparator {
    const NAME: &'static str = "catchdb.AggregateComparator";

    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        match (a.first(), b.first()) {
            (Some(&ta), Some(&tb)) if ta == tb => match ta {
                HASH_TAG => compare_hash(a, b),
                QUEUE_TAG => compare_queue(a, b),
                ZSET_TAG => compare_zset(a, b),
                _ => a.cmp(b),
            },
            _ => a.cmp(b),
        }
    }
}

/// Orders decoded keys, putting undecodable keys first.
fn compare_decoded<'k, T>(
    a: &'k [u8],
    b: &'k [u8],
    decode: impl Fn(&'k [u8]) -> Option<T>,
    cmp: impl FnOnce(T, T) -> Ordering,
) -> Ordering {
    match (decode(a), decode(b)) {
        (Some(x), Some(y)) => cmp(x, y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// `H len name field`: name length, name, record length, then field bytes.
fn compare_hash(a: &[u8], b: &[u8]) -> Ordering {
    compare_decoded(
        a,
        b,
        |k| split_name(k, 1),
        |(na, fa), (nb, fb)| {
            compare_names(na, nb)
                .then_with(|| fa.len().cmp(&fb.len()))
                .then_with(|| fa.cmp(fb))
        },
    )
}

/// `Q len name seq`: name length, name, then the decoded sequence number.
fn compare_queue(a: &[u8], b: &[u8]) -> Ordering {
    compare_decoded(
        a,
        b,
        |k| split_name(k, 1),
        |(na, ra), (nb, rb)| compare_names(na, nb).then_with(|| compare_u64_prefix(ra, rb)),
    )
}

fn compare_u64_prefix(a: &[u8], b: &[u8]) -> Ordering {
    compare_decoded(a, b, read_u64_le, |x, y| {
        x.cmp(&y).then_with(|| a[8..].cmp(&b[8..]))
    })
}

fn compare_i64_prefix(a: &[u8], b: &[u8]) -> Ordering {
    compare_decoded(a, b, read_i64_le, |x, y| {
        x.cmp(&y).then_with(|| a[8..].cmp(&b[8..]))
    })
}

/// `Z kind len name rest`: name length, name, kind, then the family's suffix.
fn compare_zset(a: &[u8], b: &[u8]) -> Ordering {
    compare_decoded(
        a,
        b,
        |k| {
            let kind = *k.get(1)?;
            let (name, rest) = split_name(k, 2)?;
            Some((kind, name, rest))
        },
        |(ka, na, ra), (kb, nb, rb)| {
            compare_names(na, nb)
                .then_with(|| ka.cmp(&kb))
                .then_with(|| {
                    if ka == ZSET_SCORE {
                        compare_i64_prefix(ra, rb)
                    } else {
                        ra.cmp(rb)
                    }
                })
        },
    )
}
