//! Time-based decimation

use super::{Collector, CollectorInfo};
use crate::{Document, Result};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// Passes a sample to the wrapped collector only if at least `interval`
/// has elapsed since the last sample it passed
pub struct SamplingCollector<C> {
    interval: Duration,
    last_accepted: Option<Instant>,
    dropped: u64,
    inner: C,
}

impl<C: Collector> SamplingCollector<C> {
    pub fn new(interval: Duration, inner: C) -> Self {
        Self {
            interval,
            last_accepted: None,
            dropped: 0,
            inner,
        }
    }

    /// Samples dropped since creation or the last reset
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn accept(&self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => true,
        }
    }
}

impl<C: Collector> Collector for SamplingCollector<C> {
    fn set_metadata(&mut self, metadata: Document) {
        self.inner.set_metadata(metadata);
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        let now = Instant::now();
        if !self.accept(now) {
            self.dropped += 1;
            return Ok(());
        }

        self.inner.add(sample)?;
        self.last_accepted = Some(now);
        Ok(())
    }

    fn resolve(&mut self) -> Result<Bytes> {
        self.inner.resolve()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.last_accepted = None;
        self.dropped = 0;
    }

    fn info(&self) -> CollectorInfo {
        self.inner.info()
    }
}
