//! Typed field encoding.
//!
//! # Wire encoding
//!
//! ```text
//! bool        1 byte, 0 or 1 (any non-zero byte reads as true)
//! u8 / i8     1 byte
//! i16 / u16   2 bytes little-endian
//! i32 / u32   4 bytes little-endian
//! i64 / u64   8 bytes little-endian
//! f32         4 bytes little-endian IEEE-754
//! Decimal     16 bytes: lo, mid, hi, flags (i32 little-endian each)
//! string      7-bit encoded byte length, then UTF-8 bytes
//! Vector3     f32 x, f32 y, f32 z
//! Quaternion  f32 w, f32 x, f32 y, f32 z
//! [u8]        raw bytes, no prefix (the reader supplies the count)
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, SgmError};
use crate::types::{Decimal, Quaternion, Vector3};

/// A value that can be appended to a writable packet.
pub trait WriteField {
    fn write_to(&self, dst: &mut BytesMut);
}

/// A value that can be consumed from a readable packet.
///
/// `src` is advanced past the field on success and left untouched on
/// failure.
pub trait ReadField: Sized {
    fn read_from(src: &mut &[u8]) -> Result<Self>;
}

impl<T: WriteField + ?Sized> WriteField for &T {
    fn write_to(&self, dst: &mut BytesMut) {
        (**self).write_to(dst)
    }
}

fn ensure(src: &[u8], needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(SgmError::UnexpectedEof {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}

macro_rules! fixed_width_field {
    ($ty:ty, $put:ident, $get:ident) => {
        impl WriteField for $ty {
            fn write_to(&self, dst: &mut BytesMut) {
                dst.$put(*self);
            }
        }

        impl ReadField for $ty {
            fn read_from(src: &mut &[u8]) -> Result<Self> {
                ensure(src, std::mem::size_of::<$ty>())?;
                Ok(src.$get())
            }
        }
    };
}

fixed_width_field!(u8, put_u8, get_u8);
fixed_width_field!(i8, put_i8, get_i8);
fixed_width_field!(i16, put_i16_le, get_i16_le);
fixed_width_field!(u16, put_u16_le, get_u16_le);
fixed_width_field!(i32, put_i32_le, get_i32_le);
fixed_width_field!(u32, put_u32_le, get_u32_le);
fixed_width_field!(i64, put_i64_le, get_i64_le);
fixed_width_field!(u64, put_u64_le, get_u64_le);
fixed_width_field!(f32, put_f32_le, get_f32_le);

impl WriteField for bool {
    fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(*self));
    }
}

impl ReadField for bool {
    fn read_from(src: &mut &[u8]) -> Result<Self> {
        Ok(u8::read_from(src)? != 0)
    }
}

// ── Strings ──────────────────────────────────────────────────────

/// Append a 7-bit encoded length (low groups first, high bit = "more").
pub fn write_length_prefix(dst: &mut BytesMut, len: usize) {
    let mut value = len as u32;
    while value >= 0x80 {
        dst.put_u8(value as u8 | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode a 7-bit encoded length. At most five bytes; the result must fit
/// in a non-negative `i32`.
pub fn read_length_prefix(src: &mut &[u8]) -> Result<usize> {
    let mut cursor = *src;
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = u8::read_from(&mut cursor)?;
        if shift == 28 && byte > 0x07 {
            return Err(SgmError::InvalidLengthPrefix);
        }
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            *src = cursor;
            return Ok(value as usize);
        }
    }
    Err(SgmError::InvalidLengthPrefix)
}

impl WriteField for str {
    fn write_to(&self, dst: &mut BytesMut) {
        write_length_prefix(dst, self.len());
        dst.put_slice(self.as_bytes());
    }
}

impl WriteField for String {
    fn write_to(&self, dst: &mut BytesMut) {
        self.as_str().write_to(dst)
    }
}

impl ReadField for String {
    fn read_from(src: &mut &[u8]) -> Result<Self> {
        let mut cursor = *src;
        let len = read_length_prefix(&mut cursor)?;
        ensure(cursor, len)?;
        let text = String::from_utf8(cursor[..len].to_vec())?;
        cursor.advance(len);
        *src = cursor;
        Ok(text)
    }
}

// ── Raw spans ────────────────────────────────────────────────────

impl WriteField for [u8] {
    fn write_to(&self, dst: &mut BytesMut) {
        dst.put_slice(self);
    }
}

/// Consume exactly `count` raw bytes.
pub fn read_raw(src: &mut &[u8], count: usize) -> Result<Vec<u8>> {
    ensure(src, count)?;
    let bytes = src[..count].to_vec();
    src.advance(count);
    Ok(bytes)
}

// ── Composite values ─────────────────────────────────────────────

impl WriteField for Vector3 {
    fn write_to(&self, dst: &mut BytesMut) {
        dst.put_f32_le(self.x);
        dst.put_f32_le(self.y);
        dst.put_f32_le(self.z);
    }
}

impl ReadField for Vector3 {
    fn read_from(src: &mut &[u8]) -> Result<Self> {
        ensure(src, 12)?;
        Ok(Vector3::new(src.get_f32_le(), src.get_f32_le(), src.get_f32_le()))
    }
}

impl WriteField for Quaternion {
    fn write_to(&self, dst: &mut BytesMut) {
        dst.put_f32_le(self.w);
        dst.put_f32_le(self.x);
        dst.put_f32_le(self.y);
        dst.put_f32_le(self.z);
    }
}

impl ReadField for Quaternion {
    fn read_from(src: &mut &[u8]) -> Result<Self> {
        ensure(src, 16)?;
        Ok(Quaternion::new(
            src.get_f32_le(),
            src.get_f32_le(),
            src.get_f32_le(),
            src.get_f32_le(),
        ))
    }
}

impl WriteField for Decimal {
    fn write_to(&self, dst: &mut BytesMut) {
        for word in self.to_parts() {
            dst.put_i32_le(word);
        }
    }
}

impl ReadField for Decimal {
    fn read_from(src: &mut &[u8]) -> Result<Self> {
        ensure(src, 16)?;
        let mut cursor = *src;
        let decimal = Decimal::from_parts(
            cursor.get_i32_le(),
            cursor.get_i32_le(),
            cursor.get_i32_le(),
            cursor.get_i32_le(),
        )?;
        *src = cursor;
        Ok(decimal)
    }
}

// ── Tests ────────────────────────────────────────────────────────
