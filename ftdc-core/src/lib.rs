//! FTDC Core - Full Time Diagnostic Data Capture codec
//!
//! Compresses a stream of structured metric samples into compact chunks
//! and decodes them back.
//!
//! # Architecture
//!
//! - **Metrics**: flattens a sample into typed numeric series and
//!   fingerprints its schema
//! - **Compression**: delta, zero-run and varint encoding of each series,
//!   wrapped in zlib
//! - **Collectors**: decide chunk boundaries (fixed size or on schema
//!   change), stream chunks to a sink, decimate or buffer samples
//! - **Chunk**: framed record stream, chunk decoder and lazy iterators
//!   yielding structured, flattened or matrix documents
//!
//! ```no_run
//! use ftdc_core::{read_structured, BatchCollector, Collector, Document};
//!
//! let mut collector = BatchCollector::new(300);
//! collector.add(Document::new().with("ops", 1i64))?;
//! let bytes = collector.resolve()?;
//!
//! for sample in read_structured(&bytes[..]) {
//!     println!("{}", sample);
//! }
//! # Ok::<(), ftdc_core::FtdcError>(())
//! ```

pub mod chunk;
pub mod collector;
pub mod compression;
pub mod marshal;
pub mod metrics;

mod cancel;
mod document;
mod error;

pub use cancel::CancelToken;
pub use chunk::{
    read_chunks, read_flattened, read_matrix, read_structured, Chunk, ChunkReader, Metric,
};
pub use collector::{
    flush_collector, BaseCollector, BatchCollector, BufferedCollector, Collector, CollectorConfig,
    CollectorExt, CollectorInfo, DynamicCollector, SamplingCollector, StreamingCollector,
    StreamingDynamicCollector,
};
pub use document::{Document, Element, Value};
pub use error::{FtdcError, Result};
pub use marshal::{DocumentMarshaler, Marshaler, SerdeMarshaler};

/// FTDC version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Samples per chunk, reference included
    pub const DEFAULT_MAX_SAMPLES: usize = 300;

    /// Pending samples a buffered collector queues before `add` blocks
    pub const DEFAULT_BUFFER_SIZE: usize = 100;

    /// Largest record a reader accepts (64MB)
    pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

    /// Largest inflated chunk payload a reader accepts (256MB)
    pub const MAX_UNCOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

    /// Most metric values (metrics times deltas) a single chunk may hold
    pub const MAX_CHUNK_VALUES: usize = 16 * 1024 * 1024;
}
