//! Fixed-Capacity Ring Buffer
//!
//! Each connection accumulates inbound bytes in a [`RingBuffer`] of fixed
//! logical capacity `C`. The backing allocation is `2C` bytes, so the unread
//! region and the free region after it are always contiguous slices even
//! after the read cursor has moved on:
//!
//! ```text
//!  0                      C                     2C
//!  ├──────────────────────┼──────────────────────┤
//!  │        ░░░░░░░░░░░░░░░░░░░░░░░░             │
//!  │        ^start        data      ^start+len   │
//!  │                                ├───────────>│ writable (up to start+C)
//! ```
//!
//! When the data region reaches past `C` the buffer is marked wrapped. Once
//! the read cursor itself crosses `C`, the remaining bytes are copied down to
//! offset 0 and the flag is cleared, keeping later writes inside the
//! allocation.

use std::io::{self, Read};

/// A fixed-capacity byte buffer that never reallocates.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    capacity: usize,
    start: usize,
    len: usize,
    wrapped: bool,
}

impl RingBuffer {
    /// Creates a buffer holding at most `capacity` unread bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity * 2].into_boxed_slice(),
            capacity,
            start: 0,
            len: 0,
            wrapped: false,
        }
    }

    /// Maximum number of unread bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space left for writing.
    pub fn available(&self) -> usize {
        self.capacity - self.len
    }

    /// Returns true if no more bytes can be written.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Returns true if the unread region extends past the logical capacity.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Offset of the first unread byte in the backing allocation.
    pub fn data_start(&self) -> usize {
        self.start
    }

    /// The unread region.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.len]
    }

    /// The free region, `available()` bytes long.
    pub fn write_tail(&mut self) -> &mut [u8] {
        let tail = self.start + self.len;
        &mut self.buf[tail..self.start + self.capacity]
    }

    /// Commits `n` bytes written into [`write_tail`](Self::write_tail).
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`available`](Self::available).
    pub fn advance_write(&mut self, n: usize) {
        assert!(
            n <= self.available(),
            "advance_write({}) past available space ({})",
            n,
            self.available()
        );
        self.len += n;
        if self.start + self.len > self.capacity {
            self.wrapped = true;
        }
    }

    /// Consumes `n` bytes from the front of the unread region.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`len`](Self::len).
    pub fn advance_read(&mut self, n: usize) {
        assert!(
            n <= self.len,
            "advance_read({}) past unread data ({})",
            n,
            self.len
        );
        self.start += n;
        self.len -= n;

        if self.len == 0 {
            self.start = 0;
            self.wrapped = false;
        } else if self.wrapped && self.start >= self.capacity {
            self.buf.copy_within(self.start..self.start + self.len, 0);
            self.start = 0;
            self.wrapped = false;
        }
    }

    /// Drops all unread bytes.
    pub fn reset(&mut self) {
        self.start = 0;
        self.len = 0;
        self.wrapped = false;
    }

    /// Reads once from `reader` into the free region.
    ///
    /// Returns `Ok(0)` on end of stream (or when the buffer is full).
    pub fn read_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.is_full() {
            return Ok(0);
        }
        let n = reader.read(self.write_tail())?;
        self.advance_write(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(rb: &mut RingBuffer, data: &[u8]) {
        rb.write_tail()[..data.len()].copy_from_slice(data);
        rb.advance_write(data.len());
    }

    #[test]
    fn test_empty_buffer() {
        let rb = RingBuffer::new(8);
        assert!(rb.is_empty());
        assert!(!rb.is_full());
        assert_eq!(rb.available(), 8);
        assert_eq!(rb.data(), b"");
    }

    #[test]
    fn test_write_then_read() {
        let mut rb = RingBuffer::new(8);
        push(&mut rb, b"hello");
        assert_eq!(rb.data(), b"hello");
        assert_eq!(rb.available(), 3);

        rb.advance_read(2);
        assert_eq!(rb.data(), b"llo");
        assert_eq!(rb.data_start(), 2);
        assert_eq!(rb.available(), 5);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut rb = RingBuffer::new(4);
        push(&mut rb, b"abcd");
        assert!(rb.is_full());
        assert_eq!(rb.write_tail().len(), 0);
    }

    #[test]
    fn test_wrap_and_compact() {
        let mut rb = RingBuffer::new(8);
        push(&mut rb, b"abcdef");
        rb.advance_read(5);
        // Free space now runs from 6 to 13, past the logical capacity.
        assert_eq!(rb.write_tail().len(), 7);

        push(&mut rb, b"ghijk");
        assert!(rb.is_wrapped());
        assert_eq!(rb.data(), b"fghijk");

        rb.advance_read(2);
        assert!(rb.is_wrapped());
        assert_eq!(rb.data(), b"hijk");

        // Read cursor reaches C: remaining bytes move to the front.
        rb.advance_read(1);
        assert!(!rb.is_wrapped());
        assert_eq!(rb.data_start(), 0);
        assert_eq!(rb.data(), b"ijk");
        assert_eq!(rb.available(), 5);
    }

    #[test]
    fn test_drain_resets_cursor() {
        let mut rb = RingBuffer::new(8);
        push(&mut rb, b"abc");
        rb.advance_read(3);
        assert_eq!(rb.data_start(), 0);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut rb = RingBuffer::new(8);
        push(&mut rb, b"abcdefgh");
        rb.reset();
        assert!(rb.is_empty());
        assert_eq!(rb.available(), 8);
    }

    #[test]
    fn test_read_from() {
        let mut rb = RingBuffer::new(4);
        let mut src: &[u8] = b"abcdef";

        assert_eq!(rb.read_from(&mut src).unwrap(), 4);
        assert_eq!(rb.read_from(&mut src).unwrap(), 0);
        assert_eq!(rb.data(), b"abcd");
    }

    #[test]
    #[should_panic(expected = "advance_write")]
    fn test_overwrite_panics() {
        let mut rb = RingBuffer::new(4);
        rb.advance_write(5);
    }

    #[test]
    #[should_panic(expected = "advance_read")]
    fn test_overread_panics() {
        let mut rb = RingBuffer::new(4);
        push(&mut rb, b"ab");
        rb.advance_read(3);
    }
}
