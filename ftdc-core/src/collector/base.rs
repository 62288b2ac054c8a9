//! Single-chunk delta collector

use super::{Collector, CollectorInfo};
use crate::chunk::Record;
use crate::compression::{compress, delta_offset, encode_deltas, CompressionConfig};
use crate::metrics::{extract_metrics, ExtractedSample, MetricValue};
use crate::{Document, FtdcError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Collects one chunk: a reference sample plus up to `max_deltas` deltas
///
/// Every sample after the first must extract the same number and types of
/// metrics as the reference; anything else is rejected.
pub struct BaseCollector {
    max_deltas: usize,
    compression: CompressionConfig,
    metadata: Option<Document>,
    reference: Option<Document>,
    last_sample: ExtractedSample,
    /// Column-major, `max_deltas` slots per metric
    deltas: Vec<i64>,
    num_deltas: usize,
}

impl BaseCollector {
    /// Create a collector accepting up to `max_deltas` samples after the
    /// reference
    pub fn new(max_deltas: usize) -> Self {
        Self::with_compression(max_deltas, CompressionConfig::default())
    }

    pub fn with_compression(max_deltas: usize, compression: CompressionConfig) -> Self {
        Self {
            max_deltas,
            compression,
            metadata: None,
            reference: None,
            last_sample: ExtractedSample::default(),
            deltas: Vec::new(),
            num_deltas: 0,
        }
    }

    /// Whether another sample can be accepted
    pub fn is_full(&self) -> bool {
        self.reference.is_some() && self.num_deltas >= self.max_deltas
    }

    /// Compressed chunk payload without record framing
    pub fn payload(&self) -> Result<Bytes> {
        let reference = self.reference.as_ref().ok_or(FtdcError::NoReference)?;
        let num_metrics = self.last_sample.len();

        let reference_bytes = reference.to_bytes()?;
        let mut buf = BytesMut::with_capacity(reference_bytes.len() + 8 + num_metrics * 2);
        buf.put_slice(&reference_bytes);
        buf.put_u32_le(num_metrics as u32);
        buf.put_u32_le(self.num_deltas as u32);
        encode_deltas(
            &mut buf,
            &self.deltas,
            self.max_deltas,
            num_metrics,
            self.num_deltas,
        );

        compress(&buf, &self.compression)
    }

    fn check_schema(&self, sample: &ExtractedSample) -> Result<()> {
        if sample.len() != self.last_sample.len() {
            return Err(FtdcError::SchemaMismatch {
                sample: self.num_deltas + 1,
                current: sample.len(),
                previous: self.last_sample.len(),
            });
        }

        for (index, (current, previous)) in sample
            .types
            .iter()
            .zip(&self.last_sample.types)
            .enumerate()
        {
            if current != previous {
                return Err(FtdcError::TypeMismatch {
                    index,
                    current: current.to_string(),
                    previous: previous.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Delta between two values of the same metric
///
/// Doubles subtract as floats and store the bit pattern of the difference.
#[inline]
fn compute_delta(current: MetricValue, previous: MetricValue) -> i64 {
    match (current, previous) {
        (MetricValue::Double(current), MetricValue::Double(previous)) => {
            (current - previous).to_bits() as i64
        }
        (current, previous) => current.as_i64().wrapping_sub(previous.as_i64()),
    }
}

impl Collector for BaseCollector {
    fn set_metadata(&mut self, metadata: Document) {
        self.metadata = Some(metadata);
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        if self.reference.is_none() {
            let extracted = extract_metrics(&sample);
            debug!(metrics = extracted.len(), "starting chunk");
            self.deltas = vec![0; self.max_deltas * extracted.len()];
            self.last_sample = extracted;
            self.reference = Some(sample);
            return Ok(());
        }

        if self.num_deltas >= self.max_deltas {
            return Err(FtdcError::Overfull {
                max: self.max_deltas,
            });
        }

        let extracted = extract_metrics(&sample);
        self.check_schema(&extracted)?;

        for (metric, (current, previous)) in extracted
            .values
            .iter()
            .zip(&self.last_sample.values)
            .enumerate()
        {
            let offset = delta_offset(self.max_deltas, self.num_deltas, metric);
            self.deltas[offset] = compute_delta(*current, *previous);
        }

        self.num_deltas += 1;
        self.last_sample = extracted;
        Ok(())
    }

    fn resolve(&mut self) -> Result<Bytes> {
        let payload = self.payload()?;

        let mut out = BytesMut::new();
        if let Some(metadata) = &self.metadata {
            out.put_slice(&Record::metadata(metadata)?.encode());
        }
        out.put_slice(&Record::chunk(payload).encode());
        Ok(out.freeze())
    }

    fn reset(&mut self) {
        self.metadata = None;
        self.reference = None;
        self.last_sample = ExtractedSample::default();
        self.deltas = Vec::new();
        self.num_deltas = 0;
    }

    fn info(&self) -> CollectorInfo {
        if self.reference.is_none() {
            return CollectorInfo::default();
        }

        CollectorInfo {
            sample_count: self.num_deltas + 1,
            metric_count: self.last_sample.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{read_structured, ChunkReader};
    use crate::Value;
    use std::io::Cursor;

    fn decode(bytes: Bytes) -> Vec<Document> {
        read_structured(Cursor::new(bytes.to_vec())).collect()
    }

    #[test]
    fn test_constant_samples_roundtrip() {
        let mut collector = BaseCollector::new(20);
        let sample = Document::new().with("one", 43i64).with("two", 5i64);
        for _ in 0..3 {
            collector.add(sample.clone()).unwrap();
        }

        let info = collector.info();
        assert_eq!(info.sample_count, 3);
        assert_eq!(info.metric_count, 2);

        let docs = decode(collector.resolve().unwrap());
        assert_eq!(docs, vec![sample.clone(), sample.clone(), sample]);
    }

    #[test]
    fn test_signed_deltas() {
        let mut collector = BaseCollector::new(20);
        collector
            .add(Document::new().with("a", 23i64).with("b", 24i64))
            .unwrap();
        collector
            .add(Document::new().with("a", 26i64).with("b", 25i64))
            .unwrap();

        let docs = decode(collector.resolve().unwrap());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1], Document::new().with("a", 26i64).with("b", 25i64));
    }

    #[test]
    fn test_no_reference() {
        let mut collector = BaseCollector::new(5);
        assert!(matches!(collector.resolve(), Err(FtdcError::NoReference)));
    }

    #[test]
    fn test_overfull() {
        let mut collector = BaseCollector::new(2);
        for i in 0..3i64 {
            collector.add(Document::new().with("a", i)).unwrap();
        }
        assert!(collector.is_full());

        let err = collector.add(Document::new().with("a", 9i64)).unwrap_err();
        assert!(matches!(err, FtdcError::Overfull { max: 2 }));
        assert_eq!(collector.info().sample_count, 3);
    }

    #[test]
    fn test_schema_mismatch_leaves_info_unchanged() {
        let mut collector = BaseCollector::new(10);
        collector.add(Document::new().with("a", 1i64)).unwrap();
        collector.add(Document::new().with("a", 2i64)).unwrap();
        let before = collector.info();

        let err = collector
            .add(Document::new().with("a", 3i64).with("b", 4i64))
            .unwrap_err();
        assert!(matches!(
            err,
            FtdcError::SchemaMismatch {
                current: 2,
                previous: 1,
                ..
            }
        ));
        assert_eq!(collector.info(), before);
    }

    #[test]
    fn test_type_mismatch() {
        let mut collector = BaseCollector::new(10);
        collector.add(Document::new().with("a", 1i64)).unwrap();

        let err = collector.add(Document::new().with("a", 1.0)).unwrap_err();
        assert!(matches!(err, FtdcError::TypeMismatch { index: 0, .. }));
        assert!(err.is_schema_error());
        assert_eq!(collector.info().sample_count, 1);
    }

    #[test]
    fn test_double_delta_is_float_difference() {
        let mut collector = BaseCollector::new(4);
        collector.add(Document::new().with("d", 1.5)).unwrap();
        collector.add(Document::new().with("d", 4.0)).unwrap();
        assert_eq!(collector.deltas[0], 2.5f64.to_bits() as i64);
    }

    #[test]
    fn test_doubles_decode_by_bit_sum() {
        let mut collector = BaseCollector::new(4);
        collector.add(Document::new().with("d", 1.5)).unwrap();
        collector.add(Document::new().with("d", 1.5)).unwrap();
        collector.add(Document::new().with("d", 4.0)).unwrap();

        let bytes = collector.resolve().unwrap();
        let chunk = ChunkReader::new(Cursor::new(bytes.to_vec()))
            .next()
            .unwrap()
            .unwrap();
        let series = &chunk.metrics()[0].values;

        let start = 1.5f64.to_bits() as i64;
        assert_eq!(series[0], start);
        assert_eq!(series[1], start);
        assert_eq!(series[2], start.wrapping_add(2.5f64.to_bits() as i64));
        assert_eq!(chunk.structured(1).unwrap().get("d"), Some(&Value::Double(1.5)));
    }

    #[test]
    fn test_all_types_roundtrip() {
        let make = |i: i64| {
            Document::new()
                .with("host", "db1")
                .with("b", i % 2 == 0)
                .with("i32", (i * -3) as i32)
                .with("i64", i * 1_000_000_007)
                .with("constant", 0.25)
                .with("at", Value::DateTime(1_700_000_000_000 + i * 1000))
                .with("op", Value::Timestamp { t: 50 + i as u32, i: i as u32 })
                .with("nested", Document::new().with("list", vec![Value::Int64(i), Value::Null]))
        };

        let mut collector = BaseCollector::new(30);
        let samples: Vec<Document> = (0..25).map(make).collect();
        for sample in &samples {
            collector.add(sample.clone()).unwrap();
        }

        assert_eq!(decode(collector.resolve().unwrap()), samples);
    }

    #[test]
    fn test_constant_metric_payload_size() {
        let sizes: Vec<usize> = [10usize, 200]
            .iter()
            .map(|n| {
                let mut collector = BaseCollector::with_compression(
                    *n,
                    CompressionConfig { level: 0 },
                );
                for _ in 0..=*n {
                    collector.add(Document::new().with("v", 7i64)).unwrap();
                }
                collector.payload().unwrap().len()
            })
            .collect();

        // only the varint of the run length and the count field may differ
        assert!(sizes[1] - sizes[0] <= 1);
    }

    #[test]
    fn test_reset_then_reuse() {
        let mut collector = BaseCollector::new(3);
        collector.set_metadata(Document::new().with("m", 1i64));
        collector.add(Document::new().with("a", 1i64)).unwrap();
        collector.reset();

        assert_eq!(collector.info(), CollectorInfo::default());
        assert!(matches!(collector.resolve(), Err(FtdcError::NoReference)));

        collector
            .add(Document::new().with("x", 1i64).with("y", 2i64))
            .unwrap();
        assert_eq!(collector.info().metric_count, 2);

        let bytes = collector.resolve().unwrap();
        let mut reader = ChunkReader::new(Cursor::new(bytes.to_vec()));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.metadata().is_none());
    }
}
