//! Append-only bit buffer used by construction.

use crate::bits::{BitCursor, Bitstring};

/// Growable output of whole bytes plus a bit length; appends need not be byte aligned.
/// Bits past `len` in the last byte are kept zero.
#[derive(Debug, Clone, Default)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    len: u64,
}

impl BitBuffer {
    pub fn new() -> Self {
        BitBuffer::default()
    }

    pub fn with_capacity_bits(bits: u64) -> Self {
        BitBuffer {
            bytes: Vec::with_capacity(((bits + 7) / 8) as usize),
            len: 0,
        }
    }

    /// Bits written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    pub fn append_bit(&mut self, bit: bool) {
        self.append_bits(bit as u64, 1);
    }

    /// Append the low `width` bits of `value`, most significant first.
    pub fn append_bits(&mut self, value: u64, width: u32) {
        debug_assert!(width <= 64);
        if self.is_aligned() && width % 8 == 0 {
            let bytes = value.to_be_bytes();
            self.bytes.extend_from_slice(&bytes[8 - (width / 8) as usize..]);
            self.len += width as u64;
            return;
        }
        let mut remaining = width;
        while remaining > 0 {
            let used = (self.len % 8) as u32;
            if used == 0 {
                self.bytes.push(0);
            }
            let free = 8 - used;
            let n = free.min(remaining);
            let chunk = ((value >> (remaining - n)) & ((1u64 << n) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << (free - n);
            }
            self.len += n as u64;
            remaining -= n;
        }
    }

    /// Append whole bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        if self.is_aligned() {
            self.bytes.extend_from_slice(bytes);
            self.len += bytes.len() as u64 * 8;
        } else {
            for &b in bytes {
                self.append_bits(b as u64, 8);
            }
        }
    }

    /// Append every bit of a view.
    pub fn append_cursor(&mut self, bits: BitCursor<'_>) {
        if self.is_aligned() && bits.offset() % 8 == 0 {
            let tail = bits.len() % 8;
            let start = (bits.offset() / 8) as usize;
            let whole = (bits.len() / 8) as usize;
            self.append_bytes(&bits.data()[start..start + whole]);
            if tail > 0 {
                let rest = BitCursor::from_parts(bits.data(), bits.offset() + whole as u64 * 8, tail);
                self.append_bits(rest.peek(tail as u32), tail as u32);
            }
            return;
        }
        let mut rest = bits;
        while !rest.is_empty() {
            let n = rest.len().min(64);
            let Some((head, tail)) = rest.split(n) else {
                unreachable!("split within length");
            };
            self.append_bits(head.peek(n as u32), n as u32);
            rest = tail;
        }
    }

    /// View of what has been written so far.
    pub fn as_cursor(&self) -> BitCursor<'_> {
        BitCursor::from_parts(&self.bytes, 0, self.len)
    }

    pub fn finish(self) -> Bitstring {
        Bitstring::from_raw(self.bytes, self.len)
    }
}
