//! Metric extraction and schema fingerprinting
//!
//! Every metric-bearing field of a sample (booleans, integers, doubles,
//! datetimes and timestamps) becomes one numeric series, two for
//! timestamps. All other field types are skipped.

mod extract;
mod fingerprint;

pub use extract::{extract_metrics, ExtractedSample, MetricValue};
pub use fingerprint::{fingerprint, Fingerprint};

use crate::{Document, Value};
use std::fmt;

/// Original type of a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Boolean,
    Int32,
    Int64,
    Double,
    DateTime,
    Timestamp,
}

impl MetricType {
    /// Classify a value; `None` for non-metric types
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(_) => Some(MetricType::Boolean),
            Value::Int32(_) => Some(MetricType::Int32),
            Value::Int64(_) => Some(MetricType::Int64),
            Value::Double(_) => Some(MetricType::Double),
            Value::DateTime(_) => Some(MetricType::DateTime),
            Value::Timestamp { .. } => Some(MetricType::Timestamp),
            _ => None,
        }
    }

    /// Number of numeric series a field of this type produces
    pub fn width(self) -> usize {
        match self {
            MetricType::Timestamp => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::Boolean => "boolean",
            MetricType::Int32 => "int32",
            MetricType::Int64 => "int64",
            MetricType::Double => "double",
            MetricType::DateTime => "datetime",
            MetricType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Walk a document depth-first and call `visit` for every metric-bearing
/// field with its full key path. Arrays contribute their indexes as path
/// segments.
pub(crate) fn walk_metric_fields<F>(doc: &Document, visit: &mut F)
where
    F: FnMut(&[String], &Value, MetricType),
{
    let mut path = Vec::new();
    walk_document(doc, &mut path, visit);
}

fn walk_document<F>(doc: &Document, path: &mut Vec<String>, visit: &mut F)
where
    F: FnMut(&[String], &Value, MetricType),
{
    for element in doc {
        path.push(element.key.clone());
        walk_value(&element.value, path, visit);
        path.pop();
    }
}

fn walk_value<F>(value: &Value, path: &mut Vec<String>, visit: &mut F)
where
    F: FnMut(&[String], &Value, MetricType),
{
    match value {
        Value::Document(doc) => walk_document(doc, path, visit),
        Value::Array(values) => {
            for (idx, item) in values.iter().enumerate() {
                path.push(idx.to_string());
                walk_value(item, path, visit);
                path.pop();
            }
        }
        other => {
            if let Some(metric_type) = MetricType::of(other) {
                visit(path, other, metric_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_paths() {
        let doc = Document::new()
            .with("host", "db1")
            .with(
                "a",
                Document::new().with(
                    "b",
                    vec![
                        Value::Int32(1),
                        Value::Document(Document::new().with("c", 2.5).with("s", "x")),
                    ],
                ),
            )
            .with("ok", true);

        let mut seen = Vec::new();
        walk_metric_fields(&doc, &mut |path, _, t| seen.push((path.join("."), t)));

        assert_eq!(
            seen,
            vec![
                ("a.b.0".to_string(), MetricType::Int32),
                ("a.b.1.c".to_string(), MetricType::Double),
                ("ok".to_string(), MetricType::Boolean),
            ]
        );
    }
}
