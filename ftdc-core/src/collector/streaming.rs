//! Collectors that write closed chunks straight to a sink

use super::{flush_collector, BaseCollector, Collector, CollectorInfo};
use crate::compression::CompressionConfig;
use crate::metrics::{fingerprint, Fingerprint};
use crate::{Document, Result};
use bytes::Bytes;
use std::io::Write;
use tracing::{debug, info};

/// Fixed-size chunking that keeps only the open chunk in memory
///
/// Each time the open chunk reaches `max_samples` it is serialized and
/// written to the sink before the next sample is accepted. Call
/// [`StreamingCollector::flush`] to write a partially filled chunk.
pub struct StreamingCollector<W: Write> {
    writer: W,
    max_samples: usize,
    chunk: BaseCollector,
    chunks_written: usize,
}

impl<W: Write> StreamingCollector<W> {
    pub fn new(max_samples: usize, writer: W) -> Self {
        Self::with_compression(max_samples, writer, CompressionConfig::default())
    }

    pub fn with_compression(max_samples: usize, writer: W, compression: CompressionConfig) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            writer,
            max_samples,
            chunk: BaseCollector::with_compression(max_samples - 1, compression),
            chunks_written: 0,
        }
    }

    /// Write the open chunk, if it holds any samples, and flush the sink
    pub fn flush(&mut self) -> Result<()> {
        self.write_chunk()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Number of chunks written to the sink so far
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the sink; samples in the open chunk are discarded
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_chunk(&mut self) -> Result<()> {
        let info = self.chunk.info();
        if info.sample_count == 0 {
            return Ok(());
        }

        flush_collector(&mut self.chunk, &mut self.writer)?;
        self.chunks_written += 1;
        info!(
            samples = info.sample_count,
            metrics = info.metric_count,
            chunks = self.chunks_written,
            "wrote chunk"
        );
        Ok(())
    }
}

impl<W: Write> Collector for StreamingCollector<W> {
    /// Written ahead of the next chunk to reach the sink
    fn set_metadata(&mut self, metadata: Document) {
        self.chunk.set_metadata(metadata);
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        if self.chunk.info().sample_count >= self.max_samples {
            self.write_chunk()?;
        }
        self.chunk.add(sample)
    }

    /// Serialize the open chunk without writing it
    fn resolve(&mut self) -> Result<Bytes> {
        self.chunk.resolve()
    }

    fn reset(&mut self) {
        self.chunk.reset();
    }

    /// Counters of the open chunk only
    fn info(&self) -> CollectorInfo {
        self.chunk.info()
    }
}

/// [`StreamingCollector`] that also closes the open chunk whenever the
/// schema fingerprint of a sample changes
pub struct StreamingDynamicCollector<W: Write> {
    inner: StreamingCollector<W>,
    current: Option<(Fingerprint, usize)>,
}

impl<W: Write> StreamingDynamicCollector<W> {
    pub fn new(max_samples: usize, writer: W) -> Self {
        Self {
            inner: StreamingCollector::new(max_samples, writer),
            current: None,
        }
    }

    pub fn with_compression(max_samples: usize, writer: W, compression: CompressionConfig) -> Self {
        Self {
            inner: StreamingCollector::with_compression(max_samples, writer, compression),
            current: None,
        }
    }

    /// Write the open chunk, if it holds any samples, and flush the sink
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    pub fn chunks_written(&self) -> usize {
        self.inner.chunks_written()
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Unwrap the sink; samples in the open chunk are discarded
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: Write> Collector for StreamingDynamicCollector<W> {
    fn set_metadata(&mut self, metadata: Document) {
        self.inner.set_metadata(metadata);
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        let schema = fingerprint(&sample);

        match self.current {
            Some(current) if current != schema => {
                debug!(
                    previous = %current.0,
                    current = %schema.0,
                    "schema changed, writing open chunk"
                );
                self.inner.write_chunk()?;
            }
            _ => {}
        }

        self.inner.add(sample)?;
        self.current = Some(schema);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Bytes> {
        self.inner.resolve()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.current = None;
    }

    fn info(&self) -> CollectorInfo {
        self.inner.info()
    }
}
