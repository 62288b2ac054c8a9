//! Rebuild documents from decoded metric series

use super::Metric;
use crate::metrics::MetricType;
use crate::{Document, Element, FtdcError, Result, Value};

/// Convert a raw series value back to its original type
pub(crate) fn restore_scalar(metric_type: MetricType, raw: i64) -> Value {
    match metric_type {
        MetricType::Boolean => Value::Boolean(raw != 0),
        MetricType::Int32 => Value::Int32(raw as i32),
        MetricType::Int64 => Value::Int64(raw),
        MetricType::Double => Value::Double(f64::from_bits(raw as u64)),
        MetricType::DateTime => Value::DateTime(raw),
        MetricType::Timestamp => Value::Int64(raw),
    }
}

fn restore_timestamp(seconds: i64, increment: i64) -> Value {
    Value::Timestamp {
        t: seconds as u32,
        i: increment as u32,
    }
}

/// Rebuild sample `idx` with the same nesting and key order as
/// `reference`. Non-metric fields are copied from the reference.
pub(crate) fn restore_document(
    reference: &Document,
    metrics: &[Metric],
    idx: usize,
) -> Result<Document> {
    let mut cursor = MetricCursor {
        metrics,
        position: 0,
        idx,
    };
    let doc = restore_fields(reference, &mut cursor)?;

    if cursor.position != metrics.len() {
        return Err(FtdcError::Corruption(format!(
            "reference sample uses {} of {} metrics",
            cursor.position,
            metrics.len()
        )));
    }
    Ok(doc)
}

struct MetricCursor<'a> {
    metrics: &'a [Metric],
    position: usize,
    idx: usize,
}

impl MetricCursor<'_> {
    fn next_raw(&mut self) -> Result<i64> {
        let metric = self.metrics.get(self.position).ok_or_else(|| {
            FtdcError::Corruption("reference sample has more metrics than the chunk".into())
        })?;
        self.position += 1;

        metric.values.get(self.idx).copied().ok_or_else(|| {
            FtdcError::Corruption(format!(
                "metric {} has no value for sample {}",
                metric.key(),
                self.idx
            ))
        })
    }
}

fn restore_fields(reference: &Document, cursor: &mut MetricCursor<'_>) -> Result<Document> {
    reference
        .iter()
        .map(|element| -> Result<Element> {
            Ok(Element {
                key: element.key.clone(),
                value: restore_value(&element.value, cursor)?,
            })
        })
        .collect()
}

fn restore_value(value: &Value, cursor: &mut MetricCursor<'_>) -> Result<Value> {
    let restored = match value {
        Value::Document(doc) => Value::Document(restore_fields(doc, cursor)?),
        Value::Array(values) => Value::Array(
            values
                .iter()
                .map(|item| restore_value(item, cursor))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Timestamp { .. } => {
            let seconds = cursor.next_raw()?;
            let increment = cursor.next_raw()?;
            restore_timestamp(seconds, increment)
        }
        other => match MetricType::of(other) {
            Some(metric_type) => restore_scalar(metric_type, cursor.next_raw()?),
            None => other.clone(),
        },
    };
    Ok(restored)
}

/// Rebuild sample `idx` as a flat document of dotted keys
pub(crate) fn restore_flat(metrics: &[Metric], idx: usize) -> Document {
    let mut doc = Document::new();
    for_each_field(metrics, |key, metric_type, first, second| {
        let raw = first.values.get(idx).copied().unwrap_or_default();
        let value = match second {
            Some(second) => {
                restore_timestamp(raw, second.values.get(idx).copied().unwrap_or_default())
            }
            None => restore_scalar(metric_type, raw),
        };
        doc.push(key, value);
    });
    doc
}

/// One document with the full series of every metric key
pub(crate) fn restore_matrix(metrics: &[Metric]) -> Document {
    let mut doc = Document::new();
    for_each_field(metrics, |key, metric_type, first, second| {
        let series = match second {
            Some(second) => first
                .values
                .iter()
                .zip(&second.values)
                .map(|(t, i)| restore_timestamp(*t, *i))
                .collect(),
            None => first
                .values
                .iter()
                .map(|raw| restore_scalar(metric_type, *raw))
                .collect(),
        };
        doc.push(key, Value::Array(series));
    });
    doc
}

/// Visit metrics field by field, pairing up the two halves of timestamps
fn for_each_field<'a, F>(metrics: &'a [Metric], mut visit: F)
where
    F: FnMut(String, MetricType, &'a Metric, Option<&'a Metric>),
{
    let mut position = 0;
    while position < metrics.len() {
        let metric = &metrics[position];
        let pair = match metric.original_type {
            MetricType::Timestamp => metrics
                .get(position + 1)
                .filter(|next| next.original_type == MetricType::Timestamp && next.path == metric.path),
            _ => None,
        };

        visit(metric.key(), metric.original_type, metric, pair);
        position += if pair.is_some() { 2 } else { 1 };
    }
}
