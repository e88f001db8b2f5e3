//! # Binary Codec
//!
//! Deterministic little-endian encoding for every structure in a world file.
//!
//! ## Design
//!
//! - `ByteWriter` appends to a growable buffer and counts bytes written
//! - `ByteReader` walks a borrowed slice; every read is bounds-checked and
//!   fails with [`StoreError::Truncated`] instead of panicking
//! - Strings are either u16 length-prefixed or fixed-capacity zero-padded

use crate::error::{StoreError, StoreResult};

/// Byte writer - appends little-endian values to an owned buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns its buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn put_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i64 in little-endian format.
    #[inline]
    pub fn put_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f64 in little-endian format.
    #[inline]
    pub fn put_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a u16 length prefix followed by the UTF-8 bytes of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptPayload`] if the string is longer than `u16::MAX` bytes.
    pub fn put_str(&mut self, value: &str) -> StoreResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| {
            StoreError::CorruptPayload(format!("string of {} bytes exceeds u16 prefix", value.len()))
        })?;
        self.put_u16(len);
        self.put_bytes(value.as_bytes());
        Ok(())
    }

    /// Writes `value` into exactly `capacity` bytes, zero-padded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptPayload`] if the string does not fit.
    pub fn put_fixed_str(&mut self, value: &str, capacity: usize) -> StoreResult<()> {
        if value.len() > capacity {
            return Err(StoreError::CorruptPayload(format!(
                "string {value:?} exceeds fixed capacity {capacity}"
            )));
        }
        self.put_bytes(value.as_bytes());
        self.put_zeros(capacity - value.len());
        Ok(())
    }

    /// Writes `count` zero bytes.
    #[inline]
    pub fn put_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Emits zero bytes until the byte count is a multiple of `alignment`.
    ///
    /// An alignment of 0 writes nothing.
    pub fn pad_to(&mut self, alignment: usize) {
        if alignment == 0 {
            return;
        }
        let rem = self.buffer.len() % alignment;
        if rem != 0 {
            self.put_zeros(alignment - rem);
        }
    }
}

/// Byte reader - checked little-endian reads over a borrowed slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Borrows the next `count` bytes and advances past them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] if fewer than `count` bytes remain.
    pub fn take(&mut self, count: usize) -> StoreResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(StoreError::Truncated {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> StoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian u16.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_u16(&mut self) -> StoreResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian u32.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_u32(&mut self) -> StoreResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian i32.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_i32(&mut self) -> StoreResult<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads a little-endian i64.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_i64(&mut self) -> StoreResult<i64> {
        self.take_array().map(i64::from_le_bytes)
    }

    /// Reads a little-endian f32.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_f32(&mut self) -> StoreResult<f32> {
        self.take_array().map(f32::from_le_bytes)
    }

    /// Reads a little-endian f64.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] at end of data.
    pub fn get_f64(&mut self) -> StoreResult<f64> {
        self.take_array().map(f64::from_le_bytes)
    }

    /// Copies the next `out.len()` bytes into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] if not enough bytes remain.
    pub fn get_into(&mut self, out: &mut [u8]) -> StoreResult<()> {
        out.copy_from_slice(self.take(out.len())?);
        Ok(())
    }

    /// Reads a u16 length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] on invalid UTF-8.
    pub fn get_str(&mut self) -> StoreResult<String> {
        let len = usize::from(self.get_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StoreError::CorruptPayload(format!("invalid utf-8 string: {e}")))
    }

    /// Reads a zero-padded string of exactly `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] on invalid UTF-8.
    pub fn get_fixed_str(&mut self, capacity: usize) -> StoreResult<String> {
        let bytes = self.take(capacity)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(capacity);
        String::from_utf8(bytes[..end].to_vec())
            .map_err(|e| StoreError::CorruptPayload(format!("invalid utf-8 fixed string: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut w = ByteWriter::new();
        w.put_u16(0x0102);
        w.put_i32(-2);
        assert_eq!(w.as_slice(), &[0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_mixed_values_read_back() {
        let mut w = ByteWriter::new();
        w.put_u8(7);
        w.put_i64(-1_234_567_890_123);
        w.put_f32(1.5);
        w.put_f64(-0.25);
        w.put_str("plains").unwrap();
        w.put_fixed_str("flat", 16).unwrap();

        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 1 + 8 + 4 + 8 + 2 + 6 + 16);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.get_i64().unwrap(), -1_234_567_890_123);
        assert!((r.get_f32().unwrap() - 1.5).abs() < f32::EPSILON);
        assert!((r.get_f64().unwrap() + 0.25).abs() < f64::EPSILON);
        assert_eq!(r.get_str().unwrap(), "plains");
        assert_eq!(r.get_fixed_str(16).unwrap(), "flat");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_pad_to_alignment() {
        let mut w = ByteWriter::new();
        w.put_u32(1);
        w.pad_to(4096);
        assert_eq!(w.len(), 4096);

        // Already aligned: no-op
        w.pad_to(4096);
        assert_eq!(w.len(), 4096);
    }

    #[test]
    fn test_pad_to_zero_alignment_writes_nothing() {
        let mut w = ByteWriter::new();
        w.pad_to(0);
        assert!(w.is_empty());

        w.put_u8(7);
        w.pad_to(0);
        assert_eq!(w.as_slice(), &[7]);
    }

    #[test]
    fn test_truncated_read_is_an_error() {
        let data = [1u8, 2, 3];
        let mut r = ByteReader::new(&data);
        match r.get_u32() {
            Err(StoreError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        // Position unchanged after a failed read
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_fixed_str_overflow_rejected() {
        let mut w = ByteWriter::new();
        assert!(w.put_fixed_str("this is far too long", 8).is_err());
        assert!(w.is_empty());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let data = [2u8, 0, 0xFF, 0xFE];
        let mut r = ByteReader::new(&data);
        assert!(matches!(r.get_str(), Err(StoreError::CorruptPayload(_))));
    }
}
