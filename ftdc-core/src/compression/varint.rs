//! Unsigned LEB128 varints

use crate::{FtdcError, Result};
use bytes::{Buf, BufMut};

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` as an unsigned varint
#[inline]
pub fn put_uvarint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read one unsigned varint from the front of `buf`
#[inline]
pub fn read_uvarint<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for idx in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(FtdcError::Corruption("truncated varint".into()));
        }
        let byte = buf.get_u8();
        if byte < 0x80 {
            if idx == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(FtdcError::Corruption("varint overflows 64 bits".into()));
            }
            return Ok(value | (byte as u64) << shift);
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(FtdcError::Corruption("varint overflows 64 bits".into()))
}
