//! Schema fingerprints for cheap change detection

use super::{walk_metric_fields, MetricType};
use crate::Document;
use std::fmt;

/// Digest over the dotted paths of a sample's metric-bearing fields
///
/// Equal fingerprints are necessary but not sufficient for two samples to
/// share a schema: field types are not hashed and collisions are possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u32);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Compute the fingerprint and metric count of a sample
///
/// A timestamp field hashes its path once but counts as two metrics.
pub fn fingerprint(doc: &Document) -> (Fingerprint, usize) {
    let mut hasher = crc32fast::Hasher::new();
    let mut count = 0;

    walk_metric_fields(doc, &mut |path, _, metric_type: MetricType| {
        for (idx, segment) in path.iter().enumerate() {
            if idx > 0 {
                hasher.update(b".");
            }
            hasher.update(segment.as_bytes());
        }
        hasher.update(&[0]);
        count += metric_type.width();
    });

    (Fingerprint(hasher.finalize()), count)
}
