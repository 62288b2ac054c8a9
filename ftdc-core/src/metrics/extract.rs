//! Flatten a sample into its ordered metric values

use super::{walk_metric_fields, MetricType};
use crate::{Document, Value};

/// A single extracted numeric value
///
/// Doubles stay floating point until the delta is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Double(f64),
}

impl MetricValue {
    /// The value as the signed 64-bit series element it is stored as.
    /// Doubles contribute their IEEE-754 bit pattern.
    pub fn as_i64(self) -> i64 {
        match self {
            MetricValue::Int(v) => v,
            MetricValue::Double(v) => v.to_bits() as i64,
        }
    }
}

/// Metrics extracted from one sample, in document traversal order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSample {
    pub values: Vec<MetricValue>,
    pub types: Vec<MetricType>,
    /// First datetime field of the sample, in milliseconds
    pub timestamp: Option<i64>,
}

impl ExtractedSample {
    /// Number of metric series in the sample
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extract the metric values of a sample
///
/// Non-metric fields are skipped. A timestamp yields two consecutive
/// values, seconds then increment.
pub fn extract_metrics(doc: &Document) -> ExtractedSample {
    let mut sample = ExtractedSample::default();

    walk_metric_fields(doc, &mut |_, value, metric_type| match value {
        Value::Boolean(v) => sample.push(MetricValue::Int(*v as i64), metric_type),
        Value::Int32(v) => sample.push(MetricValue::Int(*v as i64), metric_type),
        Value::Int64(v) => sample.push(MetricValue::Int(*v), metric_type),
        Value::Double(v) => sample.push(MetricValue::Double(*v), metric_type),
        Value::DateTime(ms) => {
            if sample.timestamp.is_none() {
                sample.timestamp = Some(*ms);
            }
            sample.push(MetricValue::Int(*ms), metric_type);
        }
        Value::Timestamp { t, i } => {
            sample.push(MetricValue::Int(*t as i64), metric_type);
            sample.push(MetricValue::Int(*i as i64), metric_type);
        }
        _ => {}
    });

    sample
}

impl ExtractedSample {
    fn push(&mut self, value: MetricValue, metric_type: MetricType) {
        self.values.push(value);
        self.types.push(metric_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_scalar_types() {
        let doc = Document::new()
            .with("b", true)
            .with("i32", -7i32)
            .with("i64", 1i64 << 40)
            .with("d", 1.5)
            .with("dt", Value::DateTime(1_600_000_000_000))
            .with("ts", Value::Timestamp { t: 30, i: 4 });

        let sample = extract_metrics(&doc);
        assert_eq!(
            sample.values,
            vec![
                MetricValue::Int(1),
                MetricValue::Int(-7),
                MetricValue::Int(1 << 40),
                MetricValue::Double(1.5),
                MetricValue::Int(1_600_000_000_000),
                MetricValue::Int(30),
                MetricValue::Int(4),
            ]
        );
        assert_eq!(
            sample.types,
            vec![
                MetricType::Boolean,
                MetricType::Int32,
                MetricType::Int64,
                MetricType::Double,
                MetricType::DateTime,
                MetricType::Timestamp,
                MetricType::Timestamp,
            ]
        );
        assert_eq!(sample.timestamp, Some(1_600_000_000_000));
    }

    #[test]
    fn test_extract_skips_non_metrics() {
        let doc = Document::new()
            .with("name", "x")
            .with("nothing", Value::Null)
            .with("blob", Value::Binary(vec![1, 2, 3]))
            .with("oid", Value::ObjectId([1; 12]))
            .with("n", 3i64);

        let sample = extract_metrics(&doc);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.values[0], MetricValue::Int(3));
    }

    #[test]
    fn test_extract_nested_order() {
        let doc = Document::new()
            .with("z", 1i64)
            .with(
                "nested",
                Document::new()
                    .with("a", vec![Value::Int64(2), Value::Int64(3)])
                    .with("b", 4i64),
            )
            .with("y", 5i64);

        let values: Vec<i64> = extract_metrics(&doc)
            .values
            .into_iter()
            .map(MetricValue::as_i64)
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_double_bits() {
        assert_eq!(MetricValue::Double(2.0).as_i64(), 2.0f64.to_bits() as i64);
    }
}
