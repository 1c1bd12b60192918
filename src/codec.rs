//! Codec primitives: bit-exact conversion between bit ranges and integers,
//! strings and sub-bitstrings.
//!
//! Integers of 1 to 64 bits are handled on a single 64-bit path. Byte-aligned
//! 16/32/64-bit reads go through `byteorder` directly; everything else gathers
//! the covering bytes and shifts.
//!
//! ## Endianness
//!
//! Endianness only matters for widths above 8 bits. The field's bits are split
//! into 8-bit groups in stream order; when the width is not a multiple of 8 the
//! last group is short. Big endian reads the groups most significant first.
//! Little endian reads them least significant first, the short group holding
//! the most significant bits. Native is whichever of the two the target uses.

use crate::bits::BitCursor;
use crate::buffer::BitBuffer;
use crate::error::ConstructFailure;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
    Native,
}

impl Endian {
    /// Big or Little, resolving Native for the compilation target.
    pub fn resolve(self) -> Endian {
        match self {
            Endian::Native if cfg!(target_endian = "little") => Endian::Little,
            Endian::Native => Endian::Big,
            e => e,
        }
    }
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Read `width` (0..=64) bits starting at bit `off` of `data`, MSB first.
/// The range must lie inside `data`.
pub(crate) fn read_be(data: &[u8], off: u64, width: u32) -> u64 {
    debug_assert!(width <= 64);
    if width == 0 {
        return 0;
    }
    let start = (off / 8) as usize;
    let shift = (off % 8) as u32;
    if shift == 0 {
        match width {
            8 => return data[start] as u64,
            16 => return BigEndian::read_u16(&data[start..]) as u64,
            32 => return BigEndian::read_u32(&data[start..]) as u64,
            64 => return BigEndian::read_u64(&data[start..]),
            _ => {}
        }
    }
    let end = ((off + width as u64 + 7) / 8) as usize;
    let mut acc: u128 = 0;
    for &b in &data[start..end] {
        acc = (acc << 8) | b as u128;
    }
    let spare = (end - start) as u32 * 8 - shift - width;
    ((acc >> spare) as u64) & mask(width)
}

/// Reorder the 8-bit groups of a `width`-bit stream-order value into a little-endian number.
fn le_from_stream(raw: u64, width: u32) -> u64 {
    if width % 8 == 0 {
        return raw.swap_bytes() >> (64 - width);
    }
    let mut value = 0u64;
    let mut consumed = 0;
    let mut group = 0;
    while consumed < width {
        let n = (width - consumed).min(8);
        let chunk = (raw >> (width - consumed - n)) & mask(n);
        value |= chunk << (8 * group);
        consumed += n;
        group += 1;
    }
    value
}

/// Inverse of [`le_from_stream`].
fn le_to_stream(value: u64, width: u32) -> u64 {
    if width % 8 == 0 {
        return value.swap_bytes() >> (64 - width);
    }
    let mut raw = 0u64;
    let mut produced = 0;
    let mut group = 0;
    while produced < width {
        let n = (width - produced).min(8);
        let chunk = (value >> (8 * group)) & mask(n);
        raw = (raw << n) | chunk;
        produced += n;
        group += 1;
    }
    raw
}

/// Interpret `width` stream-order bits as an integer value.
pub fn decode_int(raw: u64, width: u32, endian: Endian, signed: bool) -> Value<'static> {
    debug_assert!((1..=64).contains(&width));
    let raw = raw & mask(width);
    let v = if width > 8 && endian.resolve() == Endian::Little {
        le_from_stream(raw, width)
    } else {
        raw
    };
    if signed {
        let shift = 64 - width;
        Value::Signed(((v << shift) as i64) >> shift)
    } else {
        Value::Unsigned(v)
    }
}

/// Range-check `value` and produce its `width` stream-order bits.
pub fn encode_int(value: i128, width: u32, endian: Endian, signed: bool) -> Result<u64, ConstructFailure> {
    debug_assert!((1..=64).contains(&width));
    let (min, max) = if signed {
        (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1)
    } else {
        (0, (1i128 << width) - 1)
    };
    if value < min || value > max {
        return Err(ConstructFailure::OutOfRange { value, width, signed });
    }
    let bits = (value as u64) & mask(width);
    Ok(if width > 8 && endian.resolve() == Endian::Little {
        le_to_stream(bits, width)
    } else {
        bits
    })
}

/// Extract a `width`-bit integer. `None` if fewer bits remain.
pub fn extract_int<'a>(
    cur: BitCursor<'a>,
    width: u32,
    endian: Endian,
    signed: bool,
) -> Option<(Value<'a>, BitCursor<'a>)> {
    let (head, rest) = cur.split(width as u64)?;
    Some((decode_int(head.peek(width), width, endian, signed), rest))
}

/// Extract `bits` bits (a multiple of 8) as bytes, or with `None` everything
/// that remains, zero padding a trailing partial byte.
pub fn extract_text<'a>(cur: BitCursor<'a>, bits: Option<u64>) -> Option<(Vec<u8>, BitCursor<'a>)> {
    let (head, rest) = cur.split(bits.unwrap_or(cur.len()))?;
    Some((head.to_bytes(), rest))
}

/// Extract `bits` bits as a nested view, or with `None` everything that remains.
pub fn extract_bits<'a>(cur: BitCursor<'a>, bits: Option<u64>) -> Option<(BitCursor<'a>, BitCursor<'a>)> {
    cur.split(bits.unwrap_or(cur.len()))
}

/// Append a range-checked integer.
pub fn append_int(
    buf: &mut BitBuffer,
    value: i128,
    width: u32,
    endian: Endian,
    signed: bool,
) -> Result<(), ConstructFailure> {
    let bits = encode_int(value, width, endian, signed)?;
    buf.append_bits(bits, width);
    Ok(())
}

pub fn append_text(buf: &mut BitBuffer, bytes: &[u8]) {
    buf.append_bytes(bytes);
}

pub fn append_bits(buf: &mut BitBuffer, bits: BitCursor<'_>) {
    buf.append_cursor(bits);
}
