//! Delta and zero-run-length compression for metric columns
//!
//! A chunk's deltas are laid out column-major (metric major, sample
//! minor). Each column is written as unsigned varints of the deltas' raw
//! two's-complement bits, with runs of zero deltas collapsed into a
//! `0, run_length - 1` pair. The whole payload is then zlib-compressed and
//! prefixed with its uncompressed length.

mod decoder;
mod encoder;
mod varint;

pub use decoder::{decode_deltas, decompress, undelta};
pub use encoder::{compress, delta_offset, encode_deltas};
pub use varint::{put_uvarint, read_uvarint, MAX_VARINT_LEN};

/// Size of the uncompressed-length prefix in front of a compressed payload
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Compression configuration
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// zlib level, 0 (store) through 9 (best)
    pub level: u32,
}

impl CompressionConfig {
    pub(crate) fn flate_level(&self) -> flate2::Compression {
        flate2::Compression::new(self.level.min(9))
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { level: 6 }
    }
}
