//! Record Key Layout
//!
//! Every record lives in one flat, ordered keyspace. The first byte of a key
//! is a type tag; everything after it is laid out per type so that all
//! records of one collection sort next to each other under the
//! [`AggregateComparator`](super::AggregateComparator).
//!
//! ```text
//!  flat      'K' user_key
//!  hash      'H' name_len:u16le name [field]          (bare template = size record)
//!  queue     'Q' name_len:u16le name seq:u64le        (seq 0 = meta record)
//!  zset      'Z' 'N' name_len:u16le name              -> count:u64le
//!            'Z' 'K' name_len:u16le name member       -> score:i64le
//!            'Z' 'S' name_len:u16le name score:i64le member -> ""
//! ```
//!
//! All fixed-width integers are encoded and decoded explicitly. Only the
//! queue meta record stores its front/back sequence numbers big-endian.

use thiserror::Error;

/// Tag for flat key/value records.
pub const KV_TAG: u8 = b'K';
/// Tag for hash map records.
pub const HASH_TAG: u8 = b'H';
/// Tag for queue records.
pub const QUEUE_TAG: u8 = b'Q';
/// Tag for sorted set records.
pub const ZSET_TAG: u8 = b'Z';

/// Sorted set size record discriminator.
pub const ZSET_SIZE: u8 = b'N';
/// Sorted set member -> score discriminator.
pub const ZSET_KEY: u8 = b'K';
/// Sorted set score -> member discriminator.
pub const ZSET_SCORE: u8 = b'S';

/// Width of the embedded collection name length.
pub const NAME_LEN_SIZE: usize = 2;

/// Largest collection name the u16 length field can describe.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Errors raised while building record keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The collection name does not fit the u16 length field
    #[error("collection name too long: {0} bytes (max: {MAX_NAME_LEN})")]
    NameTooLong(usize),
}

/// Builds a flat record key: `K` + user key.
pub fn kv_key(key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + key.len());
    buf.push(KV_TAG);
    buf.extend_from_slice(key);
    buf
}

/// Builds the name template shared by every record of a hash or queue.
///
/// The template itself doubles as the hash size record key.
pub fn name_template(tag: u8, name: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let len = name_len(name)?;
    let mut buf = Vec::with_capacity(1 + NAME_LEN_SIZE + name.len() + 8);
    buf.push(tag);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(name);
    Ok(buf)
}

/// Builds the template for one sorted set record family.
pub fn zset_template(kind: u8, name: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let len = name_len(name)?;
    let mut buf = Vec::with_capacity(2 + NAME_LEN_SIZE + name.len() + 8);
    buf.push(ZSET_TAG);
    buf.push(kind);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(name);
    Ok(buf)
}

fn name_len(name: &[u8]) -> Result<u16, EncodingError> {
    u16::try_from(name.len()).map_err(|_| EncodingError::NameTooLong(name.len()))
}

/// Appends `suffix` to a template, producing a full record key.
pub fn with_suffix(template: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(template.len() + suffix.len());
    buf.extend_from_slice(template);
    buf.extend_from_slice(suffix);
    buf
}

/// Builds a queue item key from the queue template and a sequence number.
pub fn queue_item_key(template: &[u8], seq: u64) -> Vec<u8> {
    with_suffix(template, &seq.to_le_bytes())
}

/// Builds a score -> member key from the `ZS` template.
pub fn zset_score_key(template: &[u8], score: i64, member: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(template.len() + 8 + member.len());
    buf.extend_from_slice(template);
    buf.extend_from_slice(&score.to_le_bytes());
    buf.extend_from_slice(member);
    buf
}

// ============================================================================
// Fixed-width integer codecs
// ============================================================================

/// Decodes a little-endian u16 from the first two bytes.
pub fn read_u16_le(buf: &[u8]) -> Option<u16> {
    buf.get(..2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
}

/// Decodes a little-endian u64 from the first eight bytes.
pub fn read_u64_le(buf: &[u8]) -> Option<u64> {
    buf.get(..8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
}

/// Decodes a big-endian u64 from the first eight bytes.
pub fn read_u64_be(buf: &[u8]) -> Option<u64> {
    buf.get(..8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
}

/// Decodes a little-endian i64 from the first eight bytes.
pub fn read_i64_le(buf: &[u8]) -> Option<i64> {
    buf.get(..8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_le_bytes)
}

/// Splits `[len:u16le][name][rest]` starting at `offset`.
///
/// Returns `None` if the key is too short for the length it declares.
pub fn split_name(key: &[u8], offset: usize) -> Option<(&[u8], &[u8])> {
    let len = read_u16_le(key.get(offset..)?)? as usize;
    let start = offset + NAME_LEN_SIZE;
    let name = key.get(start..start + len)?;
    Some((name, &key[start + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_key() {
        assert_eq!(kv_key(b"foo"), b"Kfoo".to_vec());
        assert_eq!(kv_key(b""), b"K".to_vec());
    }

    #[test]
    fn test_name_template_layout() {
        let key = name_template(HASH_TAG, b"users").unwrap();
        assert_eq!(key, b"H\x05\x00users".to_vec());

        let (name, rest) = split_name(&key, 1).unwrap();
        assert_eq!(name, b"users");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_zset_template_layout() {
        let key = zset_template(ZSET_SCORE, b"z").unwrap();
        assert_eq!(key, b"ZS\x01\x00z".to_vec());

        let full = zset_score_key(&key, -3, b"bob");
        let (name, rest) = split_name(&full, 2).unwrap();
        assert_eq!(name, b"z");
        assert_eq!(read_i64_le(rest), Some(-3));
        assert_eq!(&rest[8..], b"bob");
    }

    #[test]
    fn test_name_too_long() {
        let name = vec![b'x'; MAX_NAME_LEN + 1];
        assert_eq!(
            name_template(QUEUE_TAG, &name),
            Err(EncodingError::NameTooLong(MAX_NAME_LEN + 1))
        );
        assert!(name_template(QUEUE_TAG, &name[..MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn test_queue_item_key() {
        let template = name_template(QUEUE_TAG, b"q").unwrap();
        let key = queue_item_key(&template, 0x0102);
        let (_, rest) = split_name(&key, 1).unwrap();
        assert_eq!(read_u64_le(rest), Some(0x0102));
    }

    #[test]
    fn test_split_name_truncated() {
        assert!(split_name(b"H", 1).is_none());
        assert!(split_name(b"H\x09\x00abc", 1).is_none());
    }

    #[test]
    fn test_integer_codecs() {
        assert_eq!(read_u64_be(&7u64.to_be_bytes()), Some(7));
        assert_eq!(read_u64_le(&[1, 2, 3]), None);
        assert_eq!(read_i64_le(&i64::MIN.to_le_bytes()), Some(i64::MIN));
    }
}
