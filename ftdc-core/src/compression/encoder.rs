//! Delta stream encoder

use super::varint::put_uvarint;
use super::{CompressionConfig, LENGTH_PREFIX_SIZE};
use crate::{FtdcError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::write::ZlibEncoder;
use std::io::Write;

/// Position of a delta in a column-major delta buffer
#[inline]
pub fn delta_offset(max_samples: usize, sample: usize, metric: usize) -> usize {
    metric * max_samples + sample
}

/// Write the first `num_samples` deltas of every metric column
///
/// Zero deltas are run-length encoded as a `0` marker followed by the run
/// length minus one. Runs never span two metrics.
pub fn encode_deltas(
    buf: &mut BytesMut,
    deltas: &[i64],
    max_samples: usize,
    num_metrics: usize,
    num_samples: usize,
) {
    debug_assert!(num_samples <= max_samples);
    debug_assert!(deltas.len() >= num_metrics * max_samples);

    for metric in 0..num_metrics {
        let mut zeroes = 0u64;

        for sample in 0..num_samples {
            let delta = deltas[delta_offset(max_samples, sample, metric)];
            if delta == 0 {
                zeroes += 1;
                continue;
            }

            if zeroes > 0 {
                put_zero_run(buf, zeroes);
                zeroes = 0;
            }
            put_uvarint(buf, delta as u64);
        }

        if zeroes > 0 {
            put_zero_run(buf, zeroes);
        }
    }
}

#[inline]
fn put_zero_run(buf: &mut BytesMut, run: u64) {
    put_uvarint(buf, 0);
    put_uvarint(buf, run - 1);
}

/// zlib-compress `payload`, prefixed with its uncompressed length
pub fn compress(payload: &[u8], config: &CompressionConfig) -> Result<Bytes> {
    if payload.len() > u32::MAX as usize {
        return Err(FtdcError::Compression(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 4), config.flate_level());
    encoder
        .write_all(payload)
        .map_err(|e| FtdcError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| FtdcError::Compression(e.to_string()))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + compressed.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(&compressed);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_column(column: &[i64]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_deltas(&mut buf, column, column.len(), 1, column.len());
        buf.to_vec()
    }

    #[test]
    fn test_offsets_column_major() {
        assert_eq!(delta_offset(10, 0, 0), 0);
        assert_eq!(delta_offset(10, 3, 0), 3);
        assert_eq!(delta_offset(10, 3, 2), 23);
    }

    #[test]
    fn test_non_zero_deltas() {
        assert_eq!(encode_column(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_run_in_middle() {
        assert_eq!(encode_column(&[5, 0, 0, 0, 7]), vec![5, 0, 2, 7]);
    }

    #[test]
    fn test_trailing_zero_run_flushed() {
        assert_eq!(encode_column(&[0, 0]), vec![0, 1]);
        assert_eq!(encode_column(&[4, 0]), vec![4, 0, 0]);
    }

    #[test]
    fn test_runs_do_not_span_metrics() {
        // two metrics, capacity 3, two samples used
        let deltas = vec![0, 0, 99, 0, 0, 99];
        let mut buf = BytesMut::new();
        encode_deltas(&mut buf, &deltas, 3, 2, 2);
        assert_eq!(buf.to_vec(), vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_constant_metric_size_independent_of_length() {
        let short = encode_column(&vec![0; 10]);
        let long = encode_column(&vec![0; 100]);
        assert_eq!(short.len(), long.len());
    }

    #[test]
    fn test_compress_prefix() {
        let payload = vec![7u8; 1000];
        let out = compress(&payload, &CompressionConfig::default()).unwrap();
        assert_eq!(&out[..4], &1000u32.to_le_bytes());
        assert!(out.len() < payload.len());
    }
}
