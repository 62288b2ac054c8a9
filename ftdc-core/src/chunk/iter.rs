//! Lazy, cancellable sample iterators over chunk streams

use super::{Chunk, ChunkReader};
use crate::{CancelToken, Document, FtdcError, Result};
use std::io::Read;
use tracing::warn;

/// Shape of the documents a [`SampleIterator`] yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Same nesting and non-metric fields as the original sample
    Structured,
    /// Dotted metric keys only
    Flattened,
}

/// Shared pull/cancel/close bookkeeping for the decode iterators
struct Source<R> {
    reader: ChunkReader<R>,
    cancel: Option<CancelToken>,
    error: Option<FtdcError>,
    metadata: Option<Document>,
}

impl<R: Read> Source<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: ChunkReader::new(reader),
            cancel: None,
            error: None,
            metadata: None,
        }
    }

    fn cancelled(&mut self) -> bool {
        let cancelled = self.cancel.as_ref().is_some_and(CancelToken::is_cancelled);
        if cancelled {
            self.reader.close();
        }
        cancelled
    }

    fn next_chunk(&mut self) -> Option<Chunk> {
        if self.cancelled() {
            return None;
        }

        match self.reader.next()? {
            Ok(chunk) => {
                if let Some(metadata) = chunk.metadata() {
                    self.metadata = Some(metadata.clone());
                }
                Some(chunk)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn fail(&mut self, e: FtdcError) {
        warn!(error = %e, "chunk stream decode failed");
        self.error = Some(e);
        self.reader.close();
    }

    fn close(&mut self) -> Result<()> {
        self.reader.close();
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Iterator over decoded chunks
pub struct ChunkIterator<R> {
    source: Source<R>,
}

impl<R: Read> ChunkIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            source: Source::new(reader),
        }
    }

    /// Stop yielding once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.source.cancel = Some(token);
        self
    }

    /// Metadata document of the stream, once seen
    pub fn metadata(&self) -> Option<&Document> {
        self.source.metadata.as_ref()
    }

    /// Release the byte source and report any decode error, once
    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

impl<R: Read> Iterator for ChunkIterator<R> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        self.source.next_chunk()
    }
}

/// Iterator yielding one reconstructed document per sample
pub struct SampleIterator<R> {
    source: Source<R>,
    mode: SampleMode,
    current: Option<Chunk>,
    position: usize,
}

impl<R: Read> SampleIterator<R> {
    pub fn new(reader: R, mode: SampleMode) -> Self {
        Self {
            source: Source::new(reader),
            mode,
            current: None,
            position: 0,
        }
    }

    /// Stop yielding once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.source.cancel = Some(token);
        self
    }

    /// Metadata document of the stream, once seen
    pub fn metadata(&self) -> Option<&Document> {
        self.source.metadata.as_ref()
    }

    /// Release the byte source and report any decode error, once
    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.source.close()
    }
}

impl<R: Read> Iterator for SampleIterator<R> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        loop {
            if self.source.cancelled() {
                self.current = None;
                return None;
            }

            if let Some(chunk) = &self.current {
                if self.position < chunk.len() {
                    let idx = self.position;
                    self.position += 1;

                    let sample = match self.mode {
                        SampleMode::Structured => chunk.structured(idx),
                        SampleMode::Flattened => chunk.flattened(idx),
                    };
                    return match sample {
                        Ok(doc) => Some(doc),
                        Err(e) => {
                            self.current = None;
                            self.source.fail(e);
                            None
                        }
                    };
                }
            }

            self.current = Some(self.source.next_chunk()?);
            self.position = 0;
        }
    }
}

/// Iterator yielding one series document per chunk
pub struct MatrixIterator<R> {
    source: Source<R>,
}

impl<R: Read> MatrixIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            source: Source::new(reader),
        }
    }

    /// Stop yielding once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.source.cancel = Some(token);
        self
    }

    /// Metadata document of the stream, once seen
    pub fn metadata(&self) -> Option<&Document> {
        self.source.metadata.as_ref()
    }

    /// Release the byte source and report any decode error, once
    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

impl<R: Read> Iterator for MatrixIterator<R> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.source.next_chunk().map(|chunk| chunk.matrix())
    }
}

/// Decoded chunks of a stream
pub fn read_chunks<R: Read>(reader: R) -> ChunkIterator<R> {
    ChunkIterator::new(reader)
}

/// Samples of a stream, shaped like the documents that were added
pub fn read_structured<R: Read>(reader: R) -> SampleIterator<R> {
    SampleIterator::new(reader, SampleMode::Structured)
}

/// Samples of a stream as flat documents of dotted metric keys
pub fn read_flattened<R: Read>(reader: R) -> SampleIterator<R> {
    SampleIterator::new(reader, SampleMode::Flattened)
}

/// One series document per chunk of a stream
pub fn read_matrix<R: Read>(reader: R) -> MatrixIterator<R> {
    MatrixIterator::new(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{BatchCollector, Collector};
    use crate::Value;
    use std::io::Cursor;

    fn stream(samples: usize, per_chunk: usize) -> Vec<u8> {
        let mut collector = BatchCollector::new(per_chunk);
        collector.set_metadata(Document::new().with("source", "test"));
        for i in 0..samples as i64 {
            collector
                .add(
                    Document::new()
                        .with("name", "node")
                        .with("stats", Document::new().with("ops", i * 10).with("up", true)),
                )
                .unwrap();
        }
        collector.resolve().unwrap().to_vec()
    }

    #[test]
    fn test_structured_samples() {
        let mut iter = read_structured(Cursor::new(stream(5, 2)));
        let docs: Vec<Document> = iter.by_ref().collect();
        iter.close().unwrap();

        assert_eq!(docs.len(), 5);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(doc.get("name"), Some(&Value::from("node")));
            assert_eq!(doc.get_path("stats.ops"), Some(&Value::Int64(i as i64 * 10)));
            assert_eq!(doc.get_path("stats.up"), Some(&Value::Boolean(true)));
        }
        assert_eq!(
            iter.metadata().and_then(|m| m.get("source")),
            Some(&Value::from("test"))
        );
    }

    #[test]
    fn test_flattened_samples() {
        let docs: Vec<Document> = read_flattened(Cursor::new(stream(3, 10))).collect();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].keys().collect::<Vec<_>>(), vec!["stats.ops", "stats.up"]);
        assert_eq!(docs[2].get("stats.ops"), Some(&Value::Int64(20)));
    }

    #[test]
    fn test_matrix_per_chunk() {
        let docs: Vec<Document> = read_matrix(Cursor::new(stream(5, 3))).collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].get("stats.ops"),
            Some(&Value::Array(vec![
                Value::Int64(0),
                Value::Int64(10),
                Value::Int64(20)
            ]))
        );
        assert_eq!(docs[1].get("stats.ops").and_then(|v| match v { Value::Array(a) => Some(a), _ => None }).map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_close_early() {
        let mut iter = read_structured(Cursor::new(stream(6, 2)));
        assert!(iter.next().is_some());
        iter.close().unwrap();
        assert!(iter.next().is_none());
        iter.close().unwrap();
    }

    #[test]
    fn test_cancel_stops_iteration() {
        let token = CancelToken::new();
        let mut iter = read_flattened(Cursor::new(stream(6, 2))).with_cancel(token.clone());
        assert!(iter.next().is_some());

        token.cancel();
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        iter.close().unwrap();
    }

    #[test]
    fn test_decode_error_surfaced_once() {
        let mut bytes = stream(4, 2);
        let len = bytes.len();
        bytes[len - 3] ^= 0xFF;

        let mut iter = read_structured(Cursor::new(bytes));
        let docs: Vec<Document> = iter.by_ref().collect();
        assert_eq!(docs.len(), 2);

        assert!(iter.close().unwrap_err().is_corruption());
        iter.close().unwrap();
    }

    #[test]
    fn test_chunk_iterator() {
        let mut iter = read_chunks(Cursor::new(stream(5, 2)));
        let lens: Vec<usize> = iter.by_ref().map(|c| c.len()).collect();
        assert_eq!(lens, vec![2, 2, 1]);
        assert!(iter.metadata().is_some());
        iter.close().unwrap();
    }
}
