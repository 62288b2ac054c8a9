//! Fixed-size chunking

use super::{BaseCollector, Collector, CollectorInfo};
use crate::compression::CompressionConfig;
use crate::{Document, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Splits samples into chunks of at most `max_samples` samples each
///
/// Every chunk is a [`BaseCollector`], so a schema change inside a chunk is
/// an error. The metadata document is written ahead of the first chunk only.
pub struct BatchCollector {
    max_samples: usize,
    compression: CompressionConfig,
    chunks: Vec<BaseCollector>,
}

impl BatchCollector {
    pub fn new(max_samples: usize) -> Self {
        Self::with_compression(max_samples, CompressionConfig::default())
    }

    pub fn with_compression(max_samples: usize, compression: CompressionConfig) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            max_samples,
            compression,
            chunks: vec![Self::open_chunk(max_samples, compression)],
        }
    }

    fn open_chunk(max_samples: usize, compression: CompressionConfig) -> BaseCollector {
        BaseCollector::with_compression(max_samples - 1, compression)
    }

    /// Number of chunks held, the open one included
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn current(&mut self) -> &mut BaseCollector {
        if self.chunks.is_empty() {
            self.chunks
                .push(Self::open_chunk(self.max_samples, self.compression));
        }
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }
}

impl Collector for BatchCollector {
    fn set_metadata(&mut self, metadata: Document) {
        if let Some(first) = self.chunks.first_mut() {
            first.set_metadata(metadata);
        }
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        if self.current().info().sample_count >= self.max_samples {
            debug!(
                chunk = self.chunks.len(),
                max_samples = self.max_samples,
                "chunk full, opening next"
            );
            self.chunks
                .push(Self::open_chunk(self.max_samples, self.compression));
        }

        self.current().add(sample)
    }

    fn resolve(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        for chunk in &mut self.chunks {
            out.put_slice(&chunk.resolve()?);
        }
        Ok(out.freeze())
    }

    fn reset(&mut self) {
        self.chunks = vec![Self::open_chunk(self.max_samples, self.compression)];
    }

    fn info(&self) -> CollectorInfo {
        self.chunks.iter().map(Collector::info).sum()
    }
}
