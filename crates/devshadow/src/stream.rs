//! Positional byte store and the device stream cursors built on it.
//!
//! Device serialization is positional: a device's save routine emits a
//! sequence of `put(bytes, position)` calls, and its load routine the
//! symmetric `get(bytes, position)` calls.  Two stores back this protocol:
//!
//! - [`StagingBuffer`]: used before the baseline size is known.  Grows on
//!   demand to cover every write; never shrinks.
//! - [`StateBuffer`]: one per execution state, fixed at the finalized
//!   size.  Writes land in place; the offset is trusted.
//!
//! Devices never see the stores directly.  They talk to a
//! [`SnapshotWriter`] or [`SnapshotReader`], which keep a running position
//! and provide big-endian scalar helpers on top of the raw byte calls.

use crate::verified::stream::{clamp_copy_len, put_range, staging_target_len};
use thiserror::Error;

/// Errors surfaced to device load routines.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A read ran past the end of the state buffer.
    #[error("short read at offset {pos}: wanted {wanted} bytes, got {got}")]
    Truncated { pos: u64, wanted: usize, got: usize },

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean byte {value:#04x} at offset {pos}")]
    InvalidBool { pos: u64, value: u8 },
}

/// Destination of positional `put` calls.
pub trait ByteSink {
    /// Copy `buf` into the store at `pos`, returning the number of bytes
    /// written (always `buf.len()`).
    fn put(&mut self, buf: &[u8], pos: u64) -> usize;
}

// ═══════════════════════════════════════════════════════════════════════
//  Stores
// ═══════════════════════════════════════════════════════════════════════

/// Growable buffer that receives the very first capture.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    data: Vec<u8>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length, i.e. the highest byte any write has reached.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give up the staged bytes. Used once, by finalization.
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSink for StagingBuffer {
    fn put(&mut self, buf: &[u8], pos: u64) -> usize {
        let target = staging_target_len(self.data.len(), pos, buf.len());
        if target > self.data.len() {
            self.data.resize(target, 0);
        }
        self.data[put_range(pos, buf.len())].copy_from_slice(buf);
        buf.len()
    }
}

/// Fixed-size snapshot buffer owned by a single execution state.
#[derive(Clone, PartialEq, Eq)]
pub struct StateBuffer {
    data: Box<[u8]>,
}

impl StateBuffer {
    /// Byte-for-byte copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { data: bytes.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy up to `buf.len()` bytes starting at `pos` into `buf`.
    ///
    /// Returns the number of bytes actually copied, which is less than
    /// `buf.len()` when the read would run past the end of the buffer.
    pub fn get(&self, buf: &mut [u8], pos: u64) -> usize {
        let n = clamp_copy_len(self.data.len(), pos, buf.len());
        if n > 0 {
            let start = pos as usize;
            buf[..n].copy_from_slice(&self.data[start..start + n]);
        }
        n
    }
}

impl ByteSink for StateBuffer {
    fn put(&mut self, buf: &[u8], pos: u64) -> usize {
        self.data[put_range(pos, buf.len())].copy_from_slice(buf);
        buf.len()
    }
}

impl std::fmt::Debug for StateBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Cursors
// ═══════════════════════════════════════════════════════════════════════

/// Save-side cursor handed to a device's save routine.
pub struct SnapshotWriter<'a> {
    sink: &'a mut dyn ByteSink,
    pos: u64,
}

impl<'a> SnapshotWriter<'a> {
    pub fn new(sink: &'a mut dyn ByteSink) -> Self {
        Self { sink, pos: 0 }
    }

    /// Offset the next write will land at.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Move the cursor to an arbitrary offset.
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn put_bytes(&mut self, buf: &[u8]) {
        let written = self.sink.put(buf, self.pos);
        self.pos += written as u64;
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    pub fn put_be16(&mut self, v: u16) {
        self.put_bytes(&v.to_be_bytes());
    }

    pub fn put_be32(&mut self, v: u32) {
        self.put_bytes(&v.to_be_bytes());
    }

    pub fn put_be64(&mut self, v: u64) {
        self.put_bytes(&v.to_be_bytes());
    }
}

/// Load-side cursor handed to a device's load routine.
pub struct SnapshotReader<'a> {
    source: &'a StateBuffer,
    pos: u64,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(source: &'a StateBuffer) -> Self {
        Self { source, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Fill `buf` from the current position.
    ///
    /// A short read advances the cursor past what was copied and fails
    /// with [`StreamError::Truncated`].
    pub fn get_bytes(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        let pos = self.pos;
        let got = self.source.get(buf, pos);
        self.pos += got as u64;
        if got < buf.len() {
            return Err(StreamError::Truncated {
                pos,
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, StreamError> {
        let mut b = [0u8; 1];
        self.get_bytes(&mut b)?;
        Ok(b[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, StreamError> {
        let pos = self.pos;
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(StreamError::InvalidBool { pos, value }),
        }
    }

    pub fn get_be16(&mut self) -> Result<u16, StreamError> {
        let mut b = [0u8; 2];
        self.get_bytes(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn get_be32(&mut self) -> Result<u32, StreamError> {
        let mut b = [0u8; 4];
        self.get_bytes(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn get_be64(&mut self) -> Result<u64, StreamError> {
        let mut b = [0u8; 8];
        self.get_bytes(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_grows_on_demand() {
        let mut staging = StagingBuffer::new();
        assert!(staging.is_empty());

        staging.put(&[1, 2, 3, 4], 0);
        assert_eq!(staging.len(), 4);

        // Sparse write leaves a zero-filled gap.
        staging.put(&[9], 7);
        assert_eq!(staging.as_bytes(), &[1, 2, 3, 4, 0, 0, 0, 9]);
    }

    #[test]
    fn staging_never_shrinks() {
        let mut staging = StagingBuffer::new();
        staging.put(&[0xAA; 32], 0);
        staging.put(&[0xBB; 4], 2);
        assert_eq!(staging.len(), 32);
        assert_eq!(&staging.as_bytes()[..8], &[0xAA, 0xAA, 0xBB, 0xBB, 0xBB, 0xBB, 0xAA, 0xAA]);
    }

    #[test]
    fn state_buffer_put_in_place() {
        let mut buf = StateBuffer::from_bytes(&[0u8; 8]);
        assert_eq!(buf.put(&[5, 6], 3), 2);
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 5, 6, 0, 0, 0]);
    }

    #[test]
    #[should_panic]
    fn state_buffer_put_past_end_panics() {
        let mut buf = StateBuffer::from_bytes(&[0u8; 8]);
        buf.put(&[1, 2, 3], 6);
    }

    #[test]
    fn state_buffer_get_reports_short_reads() {
        let buf = StateBuffer::from_bytes(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0u8; 4];
        assert_eq!(buf.get(&mut out, 1), 4);
        assert_eq!(out, [2, 3, 4, 5]);

        let mut out = [0u8; 4];
        assert_eq!(buf.get(&mut out, 4), 2);
        assert_eq!(out, [5, 6, 0, 0]);

        assert_eq!(buf.get(&mut out, 6), 0);
    }

    #[test]
    fn writer_reader_scalars() {
        let mut staging = StagingBuffer::new();
        let mut w = SnapshotWriter::new(&mut staging);
        w.put_u8(0x7f);
        w.put_be16(0x0102);
        w.put_be32(0xdead_beef);
        w.put_be64(u64::MAX - 1);
        w.put_bool(true);
        assert_eq!(w.position(), 1 + 2 + 4 + 8 + 1);

        let state = StateBuffer::from_bytes(staging.as_bytes());
        let mut r = SnapshotReader::new(&state);
        assert_eq!(r.get_u8().unwrap(), 0x7f);
        assert_eq!(r.get_be16().unwrap(), 0x0102);
        assert_eq!(r.get_be32().unwrap(), 0xdead_beef);
        assert_eq!(r.get_be64().unwrap(), u64::MAX - 1);
        assert!(r.get_bool().unwrap());
    }

    #[test]
    fn big_endian_layout() {
        let mut staging = StagingBuffer::new();
        SnapshotWriter::new(&mut staging).put_be32(0x0102_0304);
        assert_eq!(staging.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn writer_seek_allows_out_of_order_puts() {
        let mut staging = StagingBuffer::new();
        let mut w = SnapshotWriter::new(&mut staging);
        w.seek(4);
        w.put_be16(0xBEEF);
        w.seek(0);
        w.put_u8(1);
        assert_eq!(staging.as_bytes(), &[1, 0, 0, 0, 0xBE, 0xEF]);
    }

    #[test]
    fn reader_truncated() {
        let state = StateBuffer::from_bytes(&[1, 2]);
        let mut r = SnapshotReader::new(&state);
        let err = r.get_be32().unwrap_err();
        assert_eq!(
            err,
            StreamError::Truncated {
                pos: 0,
                wanted: 4,
                got: 2
            }
        );
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn reader_rejects_bad_bool() {
        let state = StateBuffer::from_bytes(&[2]);
        let mut r = SnapshotReader::new(&state);
        assert_eq!(
            r.get_bool().unwrap_err(),
            StreamError::InvalidBool { pos: 0, value: 2 }
        );
    }
}
