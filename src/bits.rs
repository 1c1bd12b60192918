//! Bit cursors over immutable byte buffers, and owned bitstrings.
//!
//! Bits are numbered MSB-first: bit 0 of a buffer is the most significant bit
//! of byte 0. A [`BitCursor`] is a `(buffer, bit offset, bit length)` view and
//! is `Copy`; every operation that "consumes" bits returns a new cursor.

use crate::codec::read_be;
use crate::error::BitsError;
use std::fmt;

/// Read-only view of `len` bits of `data`, starting at bit `offset`.
///
/// Invariant: `offset + len <= data.len() * 8`.
#[derive(Clone, Copy)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    offset: u64,
    len: u64,
}

impl<'a> BitCursor<'a> {
    /// View `len` bits of `data` starting at bit `offset`.
    pub fn new(data: &'a [u8], offset: u64, len: u64) -> Result<Self, BitsError> {
        let available = data.len() as u64 * 8;
        match offset.checked_add(len) {
            Some(end) if end <= available => Ok(BitCursor { data, offset, len }),
            _ => Err(BitsError::OutOfRange { offset, len, available }),
        }
    }

    /// View all bits of `data`.
    pub fn from_bytes(data: &'a [u8]) -> Self {
        BitCursor {
            data,
            offset: 0,
            len: data.len() as u64 * 8,
        }
    }

    pub fn empty() -> BitCursor<'static> {
        BitCursor {
            data: &[],
            offset: 0,
            len: 0,
        }
    }

    /// Caller guarantees the invariant.
    pub(crate) fn from_parts(data: &'a [u8], offset: u64, len: u64) -> Self {
        debug_assert!(offset + len <= data.len() as u64 * 8);
        BitCursor { data, offset, len }
    }

    /// Underlying buffer (the whole buffer, not just the viewed bits).
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bit offset of the first viewed bit within [`data`](Self::data).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bits remaining.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split off the first `n` bits; `None` when fewer than `n` remain.
    pub(crate) fn split(self, n: u64) -> Option<(BitCursor<'a>, BitCursor<'a>)> {
        if n > self.len {
            return None;
        }
        let head = BitCursor::from_parts(self.data, self.offset, n);
        let tail = BitCursor::from_parts(self.data, self.offset + n, self.len - n);
        Some((head, tail))
    }

    /// First `width` bits (at most 64) as a big-endian unsigned integer.
    pub(crate) fn peek(&self, width: u32) -> u64 {
        debug_assert!(width as u64 <= self.len);
        read_be(self.data, self.offset, width)
    }

    /// Bit `index` of the view.
    pub fn get(&self, index: u64) -> Result<bool, BitsError> {
        if index >= self.len {
            return Err(BitsError::Index { index, len: self.len });
        }
        Ok(read_be(self.data, self.offset + index, 1) == 1)
    }

    pub fn is_clear(&self, index: u64) -> Result<bool, BitsError> {
        self.get(index).map(|b| !b)
    }

    /// `len` bits starting `off` bits into this view.
    pub fn sub(&self, off: u64, len: u64) -> Result<BitCursor<'a>, BitsError> {
        match off.checked_add(len) {
            Some(end) if end <= self.len => Ok(BitCursor::from_parts(self.data, self.offset + off, len)),
            _ => Err(BitsError::OutOfRange {
                offset: off,
                len,
                available: self.len,
            }),
        }
    }

    /// The first `n` bits.
    pub fn take_bits(&self, n: u64) -> Result<BitCursor<'a>, BitsError> {
        self.sub(0, n)
    }

    /// Everything after the first `n` bits.
    pub fn skip_bits(&self, n: u64) -> Result<BitCursor<'a>, BitsError> {
        if n > self.len {
            return Err(BitsError::OutOfRange {
                offset: 0,
                len: n,
                available: self.len,
            });
        }
        Ok(BitCursor::from_parts(self.data, self.offset + n, self.len - n))
    }

    /// True if `self` is bit-for-bit a prefix of `other`.
    pub fn is_prefix_of(&self, other: &BitCursor<'_>) -> bool {
        match other.split(self.len) {
            Some((head, _)) => *self == head,
            None => false,
        }
    }

    /// Copy the viewed bits into bytes; a trailing partial byte is zero padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let nbytes = ((self.len + 7) / 8) as usize;
        if self.offset % 8 == 0 {
            let start = (self.offset / 8) as usize;
            let mut out = self.data[start..start + nbytes].to_vec();
            let spare = (nbytes as u64 * 8 - self.len) as u32;
            if let Some(last) = out.last_mut() {
                *last &= 0xffu8 << spare;
            }
            return out;
        }
        let mut out = Vec::with_capacity(nbytes);
        let mut pos = 0;
        while pos < self.len {
            let n = (self.len - pos).min(8) as u32;
            let byte = read_be(self.data, self.offset + pos, n) as u8;
            out.push(byte << (8 - n));
            pos += n as u64;
        }
        out
    }

    pub fn to_bitstring(&self) -> Bitstring {
        Bitstring {
            bytes: self.to_bytes(),
            len: self.len,
        }
    }
}

impl PartialEq for BitCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        let mut pos = 0;
        while pos < self.len {
            let n = (self.len - pos).min(64) as u32;
            if read_be(self.data, self.offset + pos, n) != read_be(other.data, other.offset + pos, n) {
                return false;
            }
            pos += n as u64;
        }
        true
    }
}

impl Eq for BitCursor<'_> {}

impl fmt::Debug for BitCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitCursor")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// An owned sequence of bits. Padding bits of the last byte are always zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitstring {
    bytes: Vec<u8>,
    len: u64,
}

impl Bitstring {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64 * 8;
        Bitstring { bytes, len }
    }

    /// Caller guarantees `bytes` holds exactly `ceil(len / 8)` bytes with zero padding.
    pub(crate) fn from_raw(bytes: Vec<u8>, len: u64) -> Self {
        debug_assert_eq!(bytes.len() as u64, (len + 7) / 8);
        Bitstring { bytes, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_cursor(&self) -> BitCursor<'_> {
        BitCursor::from_parts(&self.bytes, 0, self.len)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Concatenate several bit views into one bitstring.
    pub fn concat(parts: &[BitCursor<'_>]) -> Bitstring {
        let mut buf = crate::buffer::BitBuffer::new();
        for part in parts {
            buf.append_cursor(*part);
        }
        buf.finish()
    }

    /// Classic hexdump: offset, 16 bytes per row, printable ASCII column.
    pub fn hexdump(&self) -> String {
        let mut out = String::new();
        for (row, chunk) in self.bytes.chunks(16).enumerate() {
            out.push_str(&format!("{:08x} ", row * 16));
            for i in 0..16 {
                match chunk.get(i) {
                    Some(b) => out.push_str(&format!(" {:02x}", b)),
                    None => out.push_str("   "),
                }
            }
            out.push_str("  |");
            for &b in chunk {
                out.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
            }
            out.push_str("|\n");
        }
        out
    }
}

impl From<Vec<u8>> for Bitstring {
    fn from(bytes: Vec<u8>) -> Self {
        Bitstring::from_bytes(bytes)
    }
}

impl From<&[u8]> for Bitstring {
    fn from(bytes: &[u8]) -> Self {
        Bitstring::from_bytes(bytes.to_vec())
    }
}

impl<'a> From<&'a Bitstring> for BitCursor<'a> {
    fn from(bs: &'a Bitstring) -> Self {
        bs.as_cursor()
    }
}
