//! Delta stream decoder

use super::varint::read_uvarint;
use super::LENGTH_PREFIX_SIZE;
use crate::config::{MAX_CHUNK_VALUES, MAX_UNCOMPRESSED_SIZE};
use crate::{FtdcError, Result};
use bytes::Buf;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Inflate a length-prefixed zlib payload
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(FtdcError::InvalidFormat("Chunk payload too short".into()));
    }

    let mut cursor = data;
    let expected = cursor.get_u32_le() as usize;
    if expected > MAX_UNCOMPRESSED_SIZE {
        return Err(FtdcError::Corruption(format!(
            "declared uncompressed length {} exceeds limit {}",
            expected, MAX_UNCOMPRESSED_SIZE
        )));
    }

    // the declared length is untrusted until the stream agrees with it
    let mut out = Vec::with_capacity(expected.min(cursor.len().saturating_mul(8)));
    ZlibDecoder::new(cursor)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| FtdcError::Compression(e.to_string()))?;

    if out.len() != expected {
        return Err(FtdcError::Corruption(format!(
            "uncompressed length mismatch: declared {}, got {}",
            expected,
            out.len()
        )));
    }

    Ok(out)
}

/// Read `num_deltas` deltas for each of `num_metrics` columns
pub fn decode_deltas<B: Buf>(
    buf: &mut B,
    num_metrics: usize,
    num_deltas: usize,
) -> Result<Vec<Vec<i64>>> {
    match num_metrics.checked_mul(num_deltas) {
        Some(total) if total <= MAX_CHUNK_VALUES && num_deltas <= MAX_CHUNK_VALUES => {}
        _ => {
            return Err(FtdcError::Corruption(format!(
                "{} metrics by {} deltas exceeds the chunk limit of {} values",
                num_metrics, num_deltas, MAX_CHUNK_VALUES
            )))
        }
    }

    let mut columns = Vec::with_capacity(num_metrics.min(buf.remaining()));

    for metric in 0..num_metrics {
        // zero runs let a short stream describe long columns, so grow as needed
        let mut column = Vec::with_capacity(num_deltas.min(buf.remaining()));
        let mut zeroes = 0u64;

        for _ in 0..num_deltas {
            if zeroes > 0 {
                column.push(0);
                zeroes -= 1;
                continue;
            }

            let delta = read_uvarint(buf)?;
            if delta == 0 {
                zeroes = read_uvarint(buf)?;
            }
            column.push(delta as i64);
        }

        if zeroes > 0 {
            return Err(FtdcError::Corruption(format!(
                "zero run overflows metric {} by {} samples",
                metric, zeroes
            )));
        }
        columns.push(column);
    }

    Ok(columns)
}

/// Prefix-sum a delta column against its starting value
///
/// The result has one more element than `deltas`, the first being `start`.
/// Sums wrap, matching the encoder's two's-complement deltas.
pub fn undelta(start: i64, deltas: &[i64]) -> Vec<i64> {
    let mut values = Vec::with_capacity(deltas.len() + 1);
    let mut current = start;
    values.push(current);
    for delta in deltas {
        current = current.wrapping_add(*delta);
        values.push(current);
    }
    values
}
