//! Decoded chunks and the iterators that reconstruct samples from them
//!
//! A chunk stream is a sequence of framed records: optional metadata
//! documents and compressed chunks. [`ChunkReader`] decodes one chunk at a
//! time; the iterators in this module turn chunks into structured,
//! flattened, or matrix documents on demand.

mod frame;
mod iter;
mod reader;
mod restore;

pub use frame::{Record, RecordKind};
pub use iter::{
    read_chunks, read_flattened, read_matrix, read_structured, ChunkIterator, MatrixIterator,
    SampleIterator, SampleMode,
};
pub use reader::ChunkReader;

use crate::compression::{decode_deltas, decompress, undelta};
use crate::metrics::{walk_metric_fields, MetricType};
use crate::{Document, FtdcError, Result, Value};
use bytes::Buf;

/// One numeric series of a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Key segments from the document root
    pub path: Vec<String>,
    /// Cumulative values, one per sample
    pub values: Vec<i64>,
    /// Value taken from the reference sample
    pub starting_value: i64,
    pub original_type: MetricType,
}

impl Metric {
    /// Dotted key, e.g. `a.b.0.c`
    pub fn key(&self) -> String {
        self.path.join(".")
    }

    /// Value of sample `idx` in its original type
    ///
    /// Timestamp metrics hold only one half of a timestamp and return the
    /// raw component as an `Int64`.
    pub fn value_at(&self, idx: usize) -> Option<Value> {
        self.values
            .get(idx)
            .map(|raw| restore::restore_scalar(self.original_type, *raw))
    }
}

/// A decoded compression window
#[derive(Debug, Clone)]
pub struct Chunk {
    reference: Document,
    metadata: Option<Document>,
    metrics: Vec<Metric>,
    sample_count: usize,
}

impl Chunk {
    /// Decode the body of a chunk record
    ///
    /// Layout after decompression:
    /// - reference sample document
    /// - 4 bytes: metric count
    /// - 4 bytes: delta count
    /// - varint delta stream, metric major
    pub fn from_record_body(body: &[u8], metadata: Option<Document>) -> Result<Self> {
        let payload = decompress(body)?;
        let (reference, used) = Document::from_bytes(&payload)
            .map_err(|e| FtdcError::Corruption(format!("invalid reference sample: {}", e)))?;

        let mut cursor = &payload[used..];
        if cursor.remaining() < 8 {
            return Err(FtdcError::InvalidFormat("Chunk header truncated".into()));
        }
        let num_metrics = cursor.get_u32_le() as usize;
        let num_deltas = cursor.get_u32_le() as usize;

        let mut metrics = metric_schema(&reference);
        if metrics.len() != num_metrics {
            return Err(FtdcError::Corruption(format!(
                "metric count mismatch: reference has {}, payload declares {}",
                metrics.len(),
                num_metrics
            )));
        }

        let columns = decode_deltas(&mut cursor, num_metrics, num_deltas)?;
        for (metric, column) in metrics.iter_mut().zip(columns) {
            metric.values = undelta(metric.starting_value, &column);
        }

        Ok(Self {
            reference,
            metadata,
            metrics,
            sample_count: num_deltas + 1,
        })
    }

    /// Number of samples in the chunk
    pub fn len(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// First sample of the chunk, as it was added
    pub fn reference(&self) -> &Document {
        &self.reference
    }

    pub fn metadata(&self) -> Option<&Document> {
        self.metadata.as_ref()
    }

    /// First datetime field of the reference sample, in milliseconds
    pub fn start_time(&self) -> Option<i64> {
        self.metrics
            .iter()
            .find(|m| m.original_type == MetricType::DateTime)
            .map(|m| m.starting_value)
    }

    /// Rebuild sample `idx` with the reference sample's shape
    pub fn structured(&self, idx: usize) -> Result<Document> {
        self.check_index(idx)?;
        restore::restore_document(&self.reference, &self.metrics, idx)
    }

    /// Rebuild sample `idx` as a flat document keyed by dotted paths
    pub fn flattened(&self, idx: usize) -> Result<Document> {
        self.check_index(idx)?;
        Ok(restore::restore_flat(&self.metrics, idx))
    }

    /// One document mapping every metric key to its series for the chunk
    pub fn matrix(&self) -> Document {
        restore::restore_matrix(&self.metrics)
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.sample_count {
            return Err(FtdcError::InvalidFormat(format!(
                "sample index {} out of range for chunk of {}",
                idx, self.sample_count
            )));
        }
        Ok(())
    }
}

/// The metrics a reference sample defines, with starting values and no
/// series yet
pub(crate) fn metric_schema(reference: &Document) -> Vec<Metric> {
    let mut metrics = Vec::new();

    walk_metric_fields(reference, &mut |path, value, metric_type| {
        let mut push = |starting_value: i64| {
            metrics.push(Metric {
                path: path.to_vec(),
                values: Vec::new(),
                starting_value,
                original_type: metric_type,
            })
        };

        match value {
            Value::Boolean(v) => push(*v as i64),
            Value::Int32(v) => push(*v as i64),
            Value::Int64(v) => push(*v),
            Value::Double(v) => push(v.to_bits() as i64),
            Value::DateTime(ms) => push(*ms),
            Value::Timestamp { t, i } => {
                push(*t as i64);
                push(*i as i64);
            }
            _ => {}
        }
    });

    metrics
}
