//! # blocklog - A Block-Structured Append-Only Record Log
//!
//! blocklog is the storage layer beneath higher-level record streams: a
//! producer appends variable-length opaque records durably, and a consumer
//! later re-reads them in order, even if the file was truncated or partially
//! corrupted by a crash.
//!
//! ## Architecture
//!
//! - **Batching**: records are accumulated in memory and flushed together
//!   as one size-prefixed batch, amortizing framing and checksum overhead
//! - **Compression**: each flushed batch is optionally Snappy-compressed
//! - **Block framing**: batches are split into checksummed physical records
//!   (FULL, or FIRST/MIDDLE/LAST chains) packed into fixed-size blocks
//! - **Recovery**: the reader verifies checksums, skips damaged spans, and
//!   reports them to an optional observer instead of aborting
//!
//! ## Example Usage
//!
//! ```rust
//! use blocklog::{LogOptions, LogReader, LogWriter};
//!
//! # fn main() -> Result<(), blocklog::Error> {
//! // Write records into an in-memory sink (use `LogWriter::open` for files).
//! let mut writer = LogWriter::new(Vec::new(), LogOptions::default())?;
//! writer.add_meta("producer", "example")?;
//! writer.init()?;
//! writer.add_record(b"first record")?;
//! writer.add_record(b"second record")?;
//! let bytes = writer.into_sink()?;
//!
//! // Read them back in order.
//! let mut reader = LogReader::new(bytes.as_slice(), true, None)?;
//! assert_eq!(reader.metadata()["producer"], "example");
//! while let Some(record) = reader.read_record() {
//!     println!("recovered {} bytes", record.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod reader;
pub mod writer;

// Re-exports
pub use config::{CompressionType, LogOptions};
pub use error::{Error, Result};
pub use format::RecordType;
pub use io::{FileSink, FileSource, Sink, Source};
pub use reader::{CorruptionReporter, LogReader};
pub use writer::LogWriter;
