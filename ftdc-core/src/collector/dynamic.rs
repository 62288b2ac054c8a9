//! Schema-adaptive chunking

use super::{BatchCollector, Collector, CollectorInfo};
use crate::compression::CompressionConfig;
use crate::metrics::{fingerprint, Fingerprint};
use crate::{Document, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Batches samples like [`BatchCollector`] and additionally opens a new
/// chunk whenever the schema fingerprint of a sample changes
///
/// The fingerprint covers field paths only. A sample with the same paths
/// but a different metric type at some position is still rejected by the
/// chunk it lands in.
pub struct DynamicCollector {
    max_samples: usize,
    compression: CompressionConfig,
    batches: Vec<BatchCollector>,
    current: Option<(Fingerprint, usize)>,
}

impl DynamicCollector {
    pub fn new(max_samples: usize) -> Self {
        Self::with_compression(max_samples, CompressionConfig::default())
    }

    pub fn with_compression(max_samples: usize, compression: CompressionConfig) -> Self {
        Self {
            max_samples,
            compression,
            batches: vec![BatchCollector::with_compression(max_samples, compression)],
            current: None,
        }
    }

    /// Number of schema segments seen since the last reset
    pub fn segment_count(&self) -> usize {
        self.batches.len()
    }
}

impl Collector for DynamicCollector {
    fn set_metadata(&mut self, metadata: Document) {
        if let Some(first) = self.batches.first_mut() {
            first.set_metadata(metadata);
        }
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        let schema = fingerprint(&sample);

        match self.current {
            Some(current) if current != schema => {
                debug!(
                    previous = %current.0,
                    current = %schema.0,
                    metrics = schema.1,
                    "schema changed, opening new chunk"
                );
                self.batches
                    .push(BatchCollector::with_compression(self.max_samples, self.compression));
            }
            _ => {}
        }

        let last = self.batches.len() - 1;
        self.batches[last].add(sample)?;
        self.current = Some(schema);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        for batch in &mut self.batches {
            out.put_slice(&batch.resolve()?);
        }
        Ok(out.freeze())
    }

    fn reset(&mut self) {
        self.batches = vec![BatchCollector::with_compression(
            self.max_samples,
            self.compression,
        )];
        self.current = None;
    }

    fn info(&self) -> CollectorInfo {
        self.batches.iter().map(Collector::info).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{read_chunks, read_structured};
    use crate::FtdcError;
    use std::io::Cursor;

    fn a(n: i64) -> Document {
        Document::new().with("a", n)
    }

    fn b(n: i64) -> Document {
        Document::new().with("b", n).with("c", n * 2)
    }

    #[test]
    fn test_schema_change_opens_chunk() {
        let mut collector = DynamicCollector::new(10);
        for doc in [a(1), a(2), b(3), b(4)] {
            collector.add(doc).unwrap();
        }

        assert_eq!(collector.segment_count(), 2);
        let bytes = collector.resolve().unwrap();
        let lens: Vec<usize> = read_chunks(Cursor::new(bytes.to_vec()))
            .map(|c| c.len())
            .collect();
        assert_eq!(lens, vec![2, 2]);

        let docs: Vec<Document> = read_structured(Cursor::new(bytes.to_vec())).collect();
        assert_eq!(docs, vec![a(1), a(2), b(3), b(4)]);
    }

    #[test]
    fn test_flip_flop_schema() {
        let mut collector = DynamicCollector::new(10);
        for doc in [a(1), b(2), a(3)] {
            collector.add(doc).unwrap();
        }
        assert_eq!(collector.segment_count(), 3);
        assert_eq!(collector.info().sample_count, 3);
        assert_eq!(collector.info().metric_count, 4);
    }

    #[test]
    fn test_same_schema_still_rolls_over_on_size() {
        let mut collector = DynamicCollector::new(2);
        for i in 0..5 {
            collector.add(a(i)).unwrap();
        }
        assert_eq!(collector.segment_count(), 1);

        let bytes = collector.resolve().unwrap();
        assert_eq!(read_chunks(Cursor::new(bytes.to_vec())).count(), 3);
    }

    #[test]
    fn test_type_change_with_same_paths_is_error() {
        let mut collector = DynamicCollector::new(10);
        collector.add(a(1)).unwrap();

        let err = collector
            .add(Document::new().with("a", 1.5))
            .unwrap_err();
        assert!(matches!(err, FtdcError::TypeMismatch { .. }));
        assert_eq!(collector.segment_count(), 1);
        assert_eq!(collector.info().sample_count, 1);
    }

    #[test]
    fn test_metadata_and_reset() {
        let mut collector = DynamicCollector::new(10);
        collector.set_metadata(Document::new().with("host", "a"));
        collector.add(a(1)).unwrap();
        collector.add(b(1)).unwrap();

        let mut iter = read_chunks(Cursor::new(collector.resolve().unwrap().to_vec()));
        assert!(iter.next().is_some());
        assert!(iter.metadata().is_some());

        collector.reset();
        assert_eq!(collector.segment_count(), 1);
        assert_eq!(collector.info(), CollectorInfo::default());
        collector.add(b(5)).unwrap();
        assert_eq!(collector.segment_count(), 1);
    }
}
