//! Collectors: accumulate samples into compressed chunks
//!
//! - [`BaseCollector`]: one chunk, delta-encodes against a reference sample
//! - [`BatchCollector`]: rolls over to a new chunk every `max_samples`
//! - [`DynamicCollector`]: also starts a new chunk when the schema changes
//! - [`StreamingCollector`] / [`StreamingDynamicCollector`]: write closed
//!   chunks to a sink instead of keeping them in memory
//! - [`SamplingCollector`]: drops samples arriving faster than an interval
//! - [`BufferedCollector`]: hands samples to a background worker

mod base;
mod batch;
mod buffered;
mod dynamic;
mod sampling;
mod streaming;

pub use base::BaseCollector;
pub use batch::BatchCollector;
pub use buffered::BufferedCollector;
pub use dynamic::DynamicCollector;
pub use sampling::SamplingCollector;
pub use streaming::{StreamingCollector, StreamingDynamicCollector};

use crate::compression::CompressionConfig;
use crate::marshal::Marshaler;
use crate::{CancelToken, Document, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;

/// Progress counters of a collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorInfo {
    /// Samples held, reference samples included
    pub sample_count: usize,
    /// Metric series across all chunks held
    pub metric_count: usize,
}

impl std::ops::Add for CollectorInfo {
    type Output = CollectorInfo;

    fn add(self, other: CollectorInfo) -> CollectorInfo {
        CollectorInfo {
            sample_count: self.sample_count + other.sample_count,
            metric_count: self.metric_count + other.metric_count,
        }
    }
}

impl std::iter::Sum for CollectorInfo {
    fn sum<I: Iterator<Item = CollectorInfo>>(iter: I) -> Self {
        iter.fold(CollectorInfo::default(), |acc, info| acc + info)
    }
}

/// Accumulates samples and serializes them as a chunk stream
///
/// Not safe for concurrent `add` calls; wrap in [`BufferedCollector`] or
/// guard externally.
pub trait Collector {
    /// Attach a metadata document, written ahead of the first chunk
    fn set_metadata(&mut self, metadata: Document);

    /// Add one sample
    fn add(&mut self, sample: Document) -> Result<()>;

    /// Serialize every chunk held into framed records
    fn resolve(&mut self) -> Result<Bytes>;

    /// Drop all state, ready for reuse
    fn reset(&mut self);

    fn info(&self) -> CollectorInfo;
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn set_metadata(&mut self, metadata: Document) {
        (**self).set_metadata(metadata)
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        (**self).add(sample)
    }

    fn resolve(&mut self) -> Result<Bytes> {
        (**self).resolve()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn info(&self) -> CollectorInfo {
        (**self).info()
    }
}

/// Add values that are not documents yet
pub trait CollectorExt: Collector {
    /// Convert `value` with `marshaler`, then add it
    fn add_with<T: ?Sized, M: Marshaler<T>>(&mut self, marshaler: &M, value: &T) -> Result<()> {
        let doc = marshaler.marshal(value)?;
        self.add(doc)
    }
}

impl<C: Collector + ?Sized> CollectorExt for C {}

/// Resolve `collector`, write the bytes to `writer` and reset it
///
/// Does nothing when the collector holds no samples.
pub fn flush_collector<C, W>(collector: &mut C, writer: &mut W) -> Result<()>
where
    C: Collector + ?Sized,
    W: Write + ?Sized,
{
    if collector.info().sample_count == 0 {
        return Ok(());
    }

    let payload = collector.resolve()?;
    writer.write_all(&payload)?;
    collector.reset();
    Ok(())
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum samples per chunk
    pub max_samples: usize,
    /// Start a new chunk whenever the sample schema changes
    pub dynamic: bool,
    /// Drop samples arriving sooner than this after the last accepted one
    pub sampling_interval_ms: Option<u64>,
    /// Queue samples to a background worker with this capacity
    pub buffer_size: Option<usize>,
    /// zlib level for chunk payloads
    pub compression_level: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_samples: crate::config::DEFAULT_MAX_SAMPLES,
            dynamic: true,
            sampling_interval_ms: None,
            buffer_size: None,
            compression_level: CompressionConfig::default().level,
        }
    }
}

impl CollectorConfig {
    fn compression(&self) -> CompressionConfig {
        CompressionConfig {
            level: self.compression_level,
        }
    }

    /// Build the configured collector stack
    pub fn build(&self) -> Result<Box<dyn Collector + Send>> {
        self.build_with_cancel(CancelToken::new())
    }

    /// Build the configured collector stack; `cancel` stops a buffered
    /// collector's worker
    pub fn build_with_cancel(&self, cancel: CancelToken) -> Result<Box<dyn Collector + Send>> {
        let mut collector: Box<dyn Collector + Send> = if self.dynamic {
            Box::new(DynamicCollector::with_compression(
                self.max_samples,
                self.compression(),
            ))
        } else {
            Box::new(BatchCollector::with_compression(
                self.max_samples,
                self.compression(),
            ))
        };

        if let Some(ms) = self.sampling_interval_ms {
            collector = Box::new(SamplingCollector::new(Duration::from_millis(ms), collector));
        }

        if let Some(size) = self.buffer_size {
            collector = Box::new(BufferedCollector::new(cancel, size, collector)?);
        }

        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::read_structured;
    use crate::marshal::SerdeMarshaler;
    use std::io::Cursor;

    #[test]
    fn test_flush_collector_resets() {
        let mut collector = BatchCollector::new(10);
        let mut out = Vec::new();

        flush_collector(&mut collector, &mut out).unwrap();
        assert!(out.is_empty());

        collector.add(Document::new().with("a", 1i64)).unwrap();
        flush_collector(&mut collector, &mut out).unwrap();
        assert!(!out.is_empty());
        assert_eq!(collector.info(), CollectorInfo::default());

        let docs: Vec<Document> = read_structured(Cursor::new(out)).collect();
        assert_eq!(docs, vec![Document::new().with("a", 1i64)]);
    }

    #[test]
    fn test_flush_buffered_collector() {
        let config = CollectorConfig {
            buffer_size: Some(8),
            ..Default::default()
        };
        let mut collector = config.build().unwrap();
        let mut out = Vec::new();

        collector.add(Document::new().with("x", 1i64)).unwrap();
        flush_collector(&mut collector, &mut out).unwrap();
        assert!(!out.is_empty());
        assert_eq!(collector.info().sample_count, 0);

        let docs: Vec<Document> = read_structured(Cursor::new(out)).collect();
        assert_eq!(docs, vec![Document::new().with("x", 1i64)]);
    }

    #[test]
    fn test_info_sum() {
        let infos = vec![
            CollectorInfo {
                sample_count: 2,
                metric_count: 3,
            },
            CollectorInfo {
                sample_count: 1,
                metric_count: 4,
            },
        ];
        let total: CollectorInfo = infos.into_iter().sum();
        assert_eq!(total.sample_count, 3);
        assert_eq!(total.metric_count, 7);
    }

    #[test]
    fn test_config_build_roundtrip() {
        let config: CollectorConfig =
            serde_json::from_str(r#"{"max_samples": 2, "buffer_size": 4}"#).unwrap();
        assert!(config.dynamic);
        assert_eq!(config.max_samples, 2);

        let mut collector = config.build().unwrap();
        for i in 0..3i64 {
            collector.add(Document::new().with("x", i)).unwrap();
        }
        let bytes = collector.resolve().unwrap();

        let docs: Vec<Document> = read_structured(Cursor::new(bytes.to_vec())).collect();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].get("x"), Some(&crate::Value::Int64(2)));
    }

    #[test]
    fn test_add_with_marshaler() {
        #[derive(serde::Serialize)]
        struct Stats {
            ops: i64,
            ok: bool,
        }

        let mut collector = BaseCollector::new(5);
        collector
            .add_with(&SerdeMarshaler, &Stats { ops: 3, ok: true })
            .unwrap();
        assert_eq!(collector.info().metric_count, 2);
    }
}
