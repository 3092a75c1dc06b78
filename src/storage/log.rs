//! Batch Log
//!
//! Durability for [`MemStore`](super::MemStore): every atomic batch is
//! appended as one checksummed record before it is applied in memory.
//!
//! ## Record Format
//!
//! ```text
//! ┌──────────┬──────────┬────────────────────────────────────────────┐
//! │ CRC (4B) │ Len (4B) │ Payload (Len bytes)                        │
//! └──────────┴──────────┴────────────────────────────────────────────┘
//!
//! Payload: [op_count:4] then per op
//!          [kind:1 (1=put, 2=delete)][key_len:4][key][value_len:4][value]
//! ```
//!
//! All integers are little-endian. The CRC covers the length field and the
//! payload. Replay stops at the first truncated or mismatching record: a
//! torn tail is the remains of a crash mid-append, and nothing valid can
//! follow it.

use crate::storage::{BatchOp, StoreError, WriteBatch};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Destination of a [`BatchLog`].
pub trait LogFile: Write {
    /// Forces written data down to the device.
    fn sync_data(&self) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }
}

/// Append-only log of write batches.
///
/// A failed append closes the log: whatever the writer still buffers is
/// discarded, and every later append fails until the store is reopened.
/// Reopening replays the log, which drops a torn tail.
#[derive(Debug)]
pub struct BatchLog<W: LogFile = File> {
    writer: Option<BufWriter<W>>,
    path: PathBuf,
    sync: bool,
}

impl BatchLog<File> {
    /// Opens (creating if needed) the log at `path` for appending.
    pub fn open(
        path: impl Into<PathBuf>,
        buffer_size: usize,
        sync: bool,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self::with_writer(file, path, buffer_size, sync))
    }

    /// Reads every intact batch from the log at `path`.
    ///
    /// A missing file yields no batches.
    pub fn replay(path: &Path) -> Result<Vec<WriteBatch>, StoreError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut batches = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            match decode_record(&data[offset..]) {
                Ok((batch, used)) => {
                    batches.push(batch);
                    offset += used;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        offset,
                        discarded = data.len() - offset,
                        "Discarding torn log tail: {}",
                        e
                    );
                    break;
                }
            }
        }

        debug!(path = %path.display(), batches = batches.len(), "Log replayed");
        Ok(batches)
    }

    /// Replaces the log at `path` with a single batch holding `records`.
    ///
    /// The snapshot is written to a temporary file and renamed into place,
    /// so a crash leaves either the old log or the new one.
    pub fn rewrite<'a>(
        path: &Path,
        records: impl Iterator<Item = (&'a [u8], &'a [u8])>,
    ) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let ops: Vec<BatchOp> = records
                .map(|(key, value)| BatchOp::Put {
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
                .collect();
            if !ops.is_empty() {
                writer.write_all(&encode_record(ops.iter()))?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<W: LogFile> BatchLog<W> {
    /// Wraps an already opened log destination.
    pub fn with_writer(writer: W, path: impl Into<PathBuf>, buffer_size: usize, sync: bool) -> Self {
        Self {
            writer: Some(BufWriter::with_capacity(buffer_size.max(1), writer)),
            path: path.into(),
            sync,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false once an append has failed.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Appends one batch and flushes it to the OS (and to disk if `sync`).
    pub fn append(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(StoreError::Io(io::Error::other(
                "batch log closed after a failed append",
            )));
        };

        let record = encode_record(batch.ops().iter());
        if let Err(e) = write_record(writer, &record, self.sync) {
            error!(path = %self.path.display(), error = %e, "batch log append failed, closing log");
            // into_parts hands back the unflushed bytes instead of writing them
            if let Some(writer) = self.writer.take() {
                let _ = writer.into_parts();
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_record<W: LogFile>(writer: &mut BufWriter<W>, record: &[u8], sync: bool) -> io::Result<()> {
    writer.write_all(record)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

fn encode_record<'a>(ops: impl ExactSizeIterator<Item = &'a BatchOp>) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE];
    buf.extend_from_slice(&(ops.len() as u32).to_le_bytes());

    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                buf.push(OP_PUT);
                put_field(&mut buf, key);
                put_field(&mut buf, value);
            }
            BatchOp::Delete { key } => {
                buf.push(OP_DELETE);
                put_field(&mut buf, key);
                put_field(&mut buf, &[]);
            }
        }
    }

    let payload_len = (buf.len() - HEADER_SIZE) as u32;
    buf[CRC_SIZE..HEADER_SIZE].copy_from_slice(&payload_len.to_le_bytes());
    let crc = crc32fast::hash(&buf[CRC_SIZE..]);
    buf[..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
    buf.extend_from_slice(field);
}

/// Decodes one record, returning the batch and the bytes it occupied.
fn decode_record(data: &[u8]) -> Result<(WriteBatch, usize), StoreError> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::Corruption("record header truncated".into()));
    }

    let stored_crc = read_u32(data, 0)?;
    let payload_len = read_u32(data, CRC_SIZE)? as usize;
    let total = HEADER_SIZE + payload_len;
    if data.len() < total {
        return Err(StoreError::Corruption("record truncated".into()));
    }
    if crc32fast::hash(&data[CRC_SIZE..total]) != stored_crc {
        return Err(StoreError::Corruption("checksum mismatch".into()));
    }

    let payload = &data[HEADER_SIZE..total];
    let count = read_u32(payload, 0)?;
    let mut offset = 4;
    let mut batch = WriteBatch::new();

    for _ in 0..count {
        let kind = *payload
            .get(offset)
            .ok_or_else(|| StoreError::Corruption("missing op kind".into()))?;
        offset += 1;
        let key = read_field(payload, &mut offset)?;
        let value = read_field(payload, &mut offset)?;
        match kind {
            OP_PUT => batch.put(key, value),
            OP_DELETE => batch.delete(key),
            other => {
                return Err(StoreError::Corruption(format!("invalid op kind: {}", other)));
            }
        };
    }

    Ok((batch, total))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, StoreError> {
    buf.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| StoreError::Corruption("integer field truncated".into()))
}

fn read_field<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a [u8], StoreError> {
    let len = read_u32(buf, *offset)? as usize;
    let start = *offset + 4;
    let field = buf
        .get(start..start + len)
        .ok_or_else(|| StoreError::Corruption("field truncated".into()))?;
    *offset = start + len;
    Ok(field)
}
