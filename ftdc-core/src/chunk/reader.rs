//! Pull-based chunk reader

use super::{Chunk, Record, RecordKind};
use crate::{Document, Result};
use std::io::Read;
use tracing::debug;

/// Reads framed records from a byte source and decodes one chunk per pull
///
/// Metadata records are remembered and attached to the chunks that follow
/// them. The source is dropped as soon as it is exhausted or fails.
pub struct ChunkReader<R> {
    reader: Option<R>,
    metadata: Option<Document>,
    chunks_read: usize,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            metadata: None,
            chunks_read: 0,
        }
    }

    /// Most recent metadata document seen in the stream
    pub fn metadata(&self) -> Option<&Document> {
        self.metadata.as_ref()
    }

    /// Number of chunks decoded so far
    pub fn chunks_read(&self) -> usize {
        self.chunks_read
    }

    /// Release the underlying source; later pulls return `None`
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            let reader = match self.reader.as_mut() {
                Some(reader) => reader,
                None => return Ok(None),
            };

            let record = match Record::read_from(reader)? {
                Some(record) => record,
                None => {
                    debug!(chunks = self.chunks_read, "chunk stream exhausted");
                    self.reader = None;
                    return Ok(None);
                }
            };

            match record.kind {
                RecordKind::Metadata => {
                    let (doc, _) = Document::from_bytes(&record.body)?;
                    self.metadata = Some(doc);
                }
                RecordKind::Chunk => {
                    let chunk = Chunk::from_record_body(&record.body, self.metadata.clone())?;
                    self.chunks_read += 1;
                    return Ok(Some(chunk));
                }
            }
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.reader = None;
                Some(Err(e))
            }
        }
    }
}
