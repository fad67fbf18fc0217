//! Ring buffer implementation for bounded output capture
//!
//! Keeps the first `N` bytes written (the prefix) and the most recent `N`
//! bytes after that (the suffix), counting everything in between. Used to
//! attach a stderr excerpt to exit errors without holding an unbounded stream.

use std::fmt;
use std::io;

/// A prefix/suffix saver with a fixed capacity per half.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    max_bytes: usize,
    prefix: Vec<u8>,
    /// Circular once `suffix.len() == max_bytes`.
    suffix: Vec<u8>,
    /// Next write position in `suffix`.
    suffix_off: usize,
    omitted: u64,
    total_bytes_written: u64,
}

impl RingBuffer {
    /// Create a new ring buffer keeping at most `max_bytes` of prefix and
    /// `max_bytes` of suffix.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            prefix: Vec::with_capacity(max_bytes.min(8192)),
            suffix: Vec::new(),
            suffix_off: 0,
            omitted: 0,
            total_bytes_written: 0,
        }
    }

    /// Write data to the ring buffer.
    pub fn write(&mut self, data: &[u8]) {
        self.total_bytes_written += data.len() as u64;

        let mut rest = fill(&mut self.prefix, self.max_bytes, data);

        // Only the last max_bytes of the remainder can survive.
        if rest.len() > self.max_bytes {
            let overage = rest.len() - self.max_bytes;
            rest = &rest[overage..];
            self.omitted += overage as u64;
        }
        rest = fill(&mut self.suffix, self.max_bytes, rest);

        // Suffix is full if anything is left: overwrite in a circle.
        while !rest.is_empty() {
            let room = self.max_bytes - self.suffix_off;
            let n = room.min(rest.len());
            self.suffix[self.suffix_off..self.suffix_off + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            self.omitted += n as u64;
            self.suffix_off += n;
            if self.suffix_off == self.max_bytes {
                self.suffix_off = 0;
            }
        }
    }

    /// Materialize the captured bytes in chronological order.
    ///
    /// When bytes were dropped, a `"\n... omitting N bytes ...\n"` marker
    /// separates the prefix from the suffix.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.suffix.is_empty() {
            return self.prefix.clone();
        }
        if self.omitted == 0 {
            let mut out = Vec::with_capacity(self.prefix.len() + self.suffix.len());
            out.extend_from_slice(&self.prefix);
            out.extend_from_slice(&self.suffix);
            return out;
        }
        let marker = format!("\n... omitting {} bytes ...\n", self.omitted);
        let mut out = Vec::with_capacity(self.prefix.len() + marker.len() + self.suffix.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(&self.suffix[self.suffix_off..]);
        out.extend_from_slice(&self.suffix[..self.suffix_off]);
        out
    }

    /// Capacity of each half.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_bytes
    }

    /// Number of bytes currently retained (prefix plus suffix).
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Get the total number of bytes written (including omitted bytes)
    #[must_use]
    pub const fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Bytes written but not retained.
    #[must_use]
    pub const fn omitted_bytes(&self) -> u64 {
        self.omitted
    }

    /// Check if any data was dropped
    #[must_use]
    pub const fn was_truncated(&self) -> bool {
        self.omitted > 0
    }
}

/// Append up to `cap - dst.len()` bytes of `data` to `dst`, returning the
/// part of `data` that did not fit.
fn fill<'a>(dst: &mut Vec<u8>, cap: usize, data: &'a [u8]) -> &'a [u8] {
    let room = cap.saturating_sub(dst.len());
    let add = room.min(data.len());
    dst.extend_from_slice(&data[..add]);
    &data[add..]
}

impl io::Write for RingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RingBuffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_bytes()))
    }
}
