//! Log writer implementation.
//!
//! The writer batches user records into an in-memory buffer, then flushes
//! the batch as one logical payload: optionally compressed, framed into
//! physical records and packed into fixed-size blocks. Batching amortizes
//! the per-record header, checksum and compression cost.

use crate::config::{CompressionType, LogOptions};
use crate::error::{Error, Result};
use crate::format::{
    encode_varint32, mask_checksum, record_checksum, FileHeader, RecordType, RECORD_HEADER_SIZE,
};
use crate::io::{FileSink, Sink};
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
#[cfg(feature = "snappy")]
use std::io;
use std::path::Path;

/// Writer for appending records to a block-structured log.
///
/// Call order is `add_meta`* → [`init`] → ([`add_record`] | [`flush`])*.
/// Records accepted by `add_record` are buffered; they reach the sink when
/// the batch fills one block's worth of bytes, on an explicit `flush`, or
/// when the writer is dropped.
///
/// [`init`]: LogWriter::init
/// [`add_record`]: LogWriter::add_record
/// [`flush`]: LogWriter::flush
pub struct LogWriter<S: Sink> {
    /// Destination for encoded bytes. `None` only after `into_sink`.
    sink: Option<S>,
    options: LogOptions,
    meta: BTreeMap<String, String>,
    initialized: bool,

    /// Fixed block size for this file.
    block_size: usize,
    /// Write offset within the current block.
    block_offset: usize,

    /// Size-prefixed user records accumulated since the last flush.
    batch: BytesMut,
    batch_records: u32,
    /// Flush threshold: one block's worth of payload.
    batch_limit: usize,

    records_added: u64,
    bytes_added: u64,
}

impl LogWriter<FileSink> {
    /// Create a writer that overwrites the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: LogOptions) -> Result<Self> {
        let sink = FileSink::create(path)?;
        Self::new(sink, options)
    }
}

impl<S: Sink> LogWriter<S> {
    /// Create a writer over an injected sink. The writer owns the sink;
    /// it can be recovered with [`into_sink`](LogWriter::into_sink).
    pub fn new(sink: S, options: LogOptions) -> Result<Self> {
        options.validate()?;
        let block_size = options.block_size();
        Ok(Self {
            sink: Some(sink),
            options,
            meta: BTreeMap::new(),
            initialized: false,
            block_size,
            block_offset: 0,
            batch: BytesMut::new(),
            batch_records: 0,
            batch_limit: block_size - RECORD_HEADER_SIZE,
            records_added: 0,
            bytes_added: 0,
        })
    }

    /// Attach a metadata entry to the file header.
    ///
    /// Must be called before [`init`](LogWriter::init); the header map is
    /// immutable once written. Calling twice with the same key keeps the
    /// last value.
    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        if self.initialized {
            return Err(Error::invalid_state("add_meta() called after init()"));
        }
        self.meta.insert(key.into(), value.into());
        Ok(())
    }

    /// Write the file header. Must be called exactly once, before any
    /// records are added.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::invalid_state("init() already called"));
        }
        let header = FileHeader {
            block_size_multiplier: self.options.block_size_multiplier,
            compressed: self.options.compression != CompressionType::None,
            meta: std::mem::take(&mut self.meta),
        }
        .encode();
        self.sink_mut().append(&header)?;
        self.initialized = true;
        Ok(())
    }

    /// Append one user record to the current batch.
    ///
    /// The record is copied; empty records are kept and round-trip. If the
    /// batch has grown to a block's worth of bytes this triggers a flush,
    /// so the call may do sink I/O. A record larger than a block is flushed
    /// as its own logical payload and fragmented across blocks.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        if !self.initialized {
            return Err(Error::invalid_state("add_record() called before init()"));
        }
        if data.len() > u32::MAX as usize {
            return Err(Error::invalid_argument("record larger than 4 GiB"));
        }

        let mut size_enc = BytesMut::with_capacity(5);
        encode_varint32(&mut size_enc, data.len() as u32);

        // Start a fresh batch rather than letting this record push the
        // current one past the block threshold.
        if self.batch_records > 0 && self.batch.len() + size_enc.len() + data.len() > self.batch_limit
        {
            self.flush_batch()?;
        }

        self.batch.put_slice(&size_enc);
        self.batch.put_slice(data);
        self.batch_records += 1;
        self.records_added += 1;
        self.bytes_added += data.len() as u64;

        if self.batch.len() >= self.batch_limit {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Flush any batched records to the sink and sync it.
    ///
    /// A no-op when the batch is empty, so calling repeatedly is safe.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_batch()?;
        self.sink_mut().flush()?;
        Ok(())
    }

    /// Flush and consume the writer.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    /// Flush and consume the writer, returning the underlying sink.
    pub fn into_sink(mut self) -> Result<S> {
        self.flush()?;
        Ok(self.sink.take().expect("sink present until into_sink"))
    }

    /// Number of user records accepted by `add_record`.
    pub fn records_added(&self) -> u64 {
        self.records_added
    }

    /// Total user payload bytes accepted by `add_record`, before size
    /// prefixes, compression and framing.
    pub fn bytes_added(&self) -> u64 {
        self.bytes_added
    }

    fn sink_mut(&mut self) -> &mut S {
        self.sink.as_mut().expect("sink present until into_sink")
    }

    /// Encode the pending batch as one logical payload and frame it out.
    fn flush_batch(&mut self) -> Result<()> {
        if self.batch_records == 0 {
            return Ok(());
        }

        let mut body = BytesMut::with_capacity(5 + self.batch.len());
        encode_varint32(&mut body, self.batch_records);
        body.put_slice(&self.batch);

        match self.options.compression {
            CompressionType::None => {
                self.write_logical_payload(&body)?;
            }
            #[cfg(feature = "snappy")]
            CompressionType::Snappy => {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(&body)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                // Method byte 0 stores the batch raw when compression
                // does not pay for itself.
                let mut tagged = BytesMut::with_capacity(1 + compressed.len().min(body.len()));
                if compressed.len() < body.len() {
                    tagged.put_u8(CompressionType::Snappy as u8);
                    tagged.put_slice(&compressed);
                } else {
                    tagged.put_u8(CompressionType::None as u8);
                    tagged.put_slice(&body);
                }
                self.write_logical_payload(&tagged)?;
            }
        }

        self.batch.clear();
        self.batch_records = 0;
        Ok(())
    }

    /// Map one logical payload onto physical records, splitting across
    /// block boundaries as needed.
    fn write_logical_payload(&mut self, mut data: &[u8]) -> Result<()> {
        let mut first = true;
        loop {
            let leftover = self.block_size - self.block_offset;
            if leftover < RECORD_HEADER_SIZE {
                // Too small for another record header: zero-pad the
                // trailer and move to a fresh block.
                if leftover > 0 {
                    const ZEROS: [u8; RECORD_HEADER_SIZE] = [0; RECORD_HEADER_SIZE];
                    self.sink_mut().append(&ZEROS[..leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = self.block_size - self.block_offset - RECORD_HEADER_SIZE;
            let take = avail.min(data.len());
            let last = take == data.len();
            let record_type = match (first, last) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, false) => RecordType::Middle,
                (false, true) => RecordType::Last,
            };
            self.emit_physical_record(record_type, &data[..take])?;
            data = &data[take..];
            if last {
                return Ok(());
            }
            first = false;
        }
    }

    fn emit_physical_record(&mut self, record_type: RecordType, payload: &[u8]) -> Result<()> {
        debug_assert!(self.block_offset + RECORD_HEADER_SIZE + payload.len() <= self.block_size);

        let crc = mask_checksum(record_checksum(record_type as u8, payload));
        let mut header = BytesMut::with_capacity(RECORD_HEADER_SIZE);
        header.put_u32_le(crc);
        header.put_u32_le(payload.len() as u32);
        header.put_u8(record_type as u8);

        let sink = self.sink_mut();
        sink.append(&header)?;
        sink.append(payload)?;
        self.block_offset += RECORD_HEADER_SIZE + payload.len();
        Ok(())
    }
}

impl<S: Sink> Drop for LogWriter<S> {
    fn drop(&mut self) {
        if self.sink.is_some() && self.batch_records > 0 {
            if let Err(e) = self.flush() {
                log::error!("failed to flush {} batched records on drop: {}", self.batch_records, e);
            }
        }
    }
}
