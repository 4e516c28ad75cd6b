//! Log reader implementation.
//!
//! Reading proceeds in three layers, the inverse of the writer:
//!
//! 1. Blocks are pulled from the source one at a time and scanned for
//!    physical records, skipping trailer padding.
//! 2. A state machine reassembles logical payloads from FULL records and
//!    FIRST..MIDDLE..LAST chains.
//! 3. Each payload is decompressed if the file header says so and walked
//!    as a batch of size-prefixed user records.
//!
//! Corruption never aborts the stream. Damaged spans are dropped, reported
//! to the optional [`CorruptionReporter`] as `(bytes_dropped, reason)`, and
//! reading resumes at the next plausible record boundary. A failed record
//! still consumes its declared extent so later records in the same block
//! stay aligned; only when the declared length itself is implausible is the
//! rest of the block abandoned. A crash that truncated the file therefore
//! loses at most the partially written tail.

use crate::error::Result;
use crate::format::{
    decode_varint32, record_checksum, unmask_checksum, FileHeader, RecordType, BLOCK_SIZE_FACTOR,
    RECORD_HEADER_SIZE,
};
use crate::io::{FileSource, Source};
use std::collections::BTreeMap;
use std::path::Path;

/// Observer notified of every dropped byte span during reading.
///
/// Invoked synchronously with the number of bytes discarded and a short
/// human-readable reason. When no reporter is installed corruption is
/// skipped silently (still visible at debug log level).
pub type CorruptionReporter = Box<dyn FnMut(usize, &str)>;

/// Outcome of scanning for one physical record.
enum Physical {
    /// A record of the given type occupying `block[start..end]`.
    Record(RecordType, usize, usize),
    /// An invalid record was dropped; scanning can continue.
    Bad,
    /// No more records can be recovered.
    Eof,
}

/// Sequential reader for files produced by [`LogWriter`].
///
/// Construction parses the file header and fails if the file is not a
/// recognizable log. Records are then returned in write order by
/// [`read_record`](LogReader::read_record).
///
/// [`LogWriter`]: crate::writer::LogWriter
pub struct LogReader<S: Source> {
    source: S,
    reporter: Option<CorruptionReporter>,
    verify_checksum: bool,

    meta: BTreeMap<String, String>,
    compressed: bool,
    block_size: usize,

    /// Offset of the next unread byte in the source.
    file_offset: u64,
    file_size: u64,
    /// Contents of the current block and the scan position within it.
    block: Vec<u8>,
    block_pos: usize,
    /// Set once the final (possibly short) block has been read.
    eof: bool,

    /// Current decoded batch and the walk position within it.
    batch: Vec<u8>,
    batch_pos: usize,
    batch_left: u32,
}

impl<S: Source> std::fmt::Debug for LogReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("verify_checksum", &self.verify_checksum)
            .field("meta", &self.meta)
            .field("compressed", &self.compressed)
            .field("block_size", &self.block_size)
            .field("file_offset", &self.file_offset)
            .field("file_size", &self.file_size)
            .field("block_pos", &self.block_pos)
            .field("eof", &self.eof)
            .field("batch_pos", &self.batch_pos)
            .field("batch_left", &self.batch_left)
            .finish_non_exhaustive()
    }
}

impl LogReader<FileSource> {
    /// Open the log file at `path` for reading.
    pub fn open<P: AsRef<Path>>(
        path: P,
        verify_checksum: bool,
        reporter: Option<CorruptionReporter>,
    ) -> Result<Self> {
        let source = FileSource::open(path)?;
        Self::new(source, verify_checksum, reporter)
    }
}

impl<S: Source> LogReader<S> {
    /// Create a reader over an injected source.
    ///
    /// Fails with [`Error::Corruption`](crate::Error::Corruption) if the
    /// file header is unrecognizable or truncated.
    pub fn new(
        mut source: S,
        verify_checksum: bool,
        reporter: Option<CorruptionReporter>,
    ) -> Result<Self> {
        let (header, header_len) = FileHeader::read_from(&mut source)?;
        let file_size = source.size();
        Ok(Self {
            source,
            reporter,
            verify_checksum,
            meta: header.meta,
            compressed: header.compressed,
            block_size: header.block_size_multiplier as usize * BLOCK_SIZE_FACTOR,
            file_offset: header_len,
            file_size,
            block: Vec::new(),
            block_pos: 0,
            eof: false,
            batch: Vec::new(),
            batch_pos: 0,
            batch_left: 0,
        })
    }

    /// The metadata map recorded in the file header.
    ///
    /// Available any time after construction, independent of read position.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Return the next user record, or `None` at end of stream.
    ///
    /// Corruption is skipped transparently: `None` means either a clean end
    /// of stream or that everything remaining was unrecoverable, and the
    /// two are distinguished only through the corruption reporter. The
    /// returned slice is valid until the next call.
    pub fn read_record(&mut self) -> Option<&[u8]> {
        let (start, end) = loop {
            if self.batch_left > 0 {
                if let Some(range) = self.take_from_batch() {
                    break range;
                }
                continue;
            }
            if !self.fetch_next_batch() {
                return None;
            }
        };
        Some(&self.batch[start..end])
    }

    /// Decode one size-prefixed record from the current batch, or drop the
    /// rest of the batch if its framing is broken.
    fn take_from_batch(&mut self) -> Option<(usize, usize)> {
        if let Some((len, used)) = decode_varint32(&self.batch[self.batch_pos..]) {
            let start = self.batch_pos + used;
            let end = start + len as usize;
            if end <= self.batch.len() {
                self.batch_pos = end;
                self.batch_left -= 1;
                return Some((start, end));
            }
        }
        let dropped = self.batch.len() - self.batch_pos;
        self.batch_pos = self.batch.len();
        self.batch_left = 0;
        self.report(dropped, "corrupted record batch");
        None
    }

    /// Pull logical payloads until one decodes into a usable batch.
    fn fetch_next_batch(&mut self) -> bool {
        loop {
            let payload = match self.read_logical_payload() {
                Some(payload) => payload,
                None => return false,
            };
            let size = payload.len();
            match self.install_batch(payload) {
                Ok(()) => return true,
                Err(reason) => self.report(size, &reason),
            }
        }
    }

    /// Decompress a logical payload if needed and position the batch walk
    /// at its first record.
    fn install_batch(&mut self, payload: Vec<u8>) -> std::result::Result<(), String> {
        let data = if self.compressed {
            let (&method, rest) = payload
                .split_first()
                .ok_or_else(|| "empty record batch".to_string())?;
            match method {
                0 => rest.to_vec(),
                #[cfg(feature = "snappy")]
                1 => snap::raw::Decoder::new()
                    .decompress_vec(rest)
                    .map_err(|e| format!("batch decompression failed: {}", e))?,
                #[cfg(not(feature = "snappy"))]
                1 => return Err("snappy-compressed batch but snappy support is disabled".to_string()),
                m => return Err(format!("unknown compression method: {}", m)),
            }
        } else {
            payload
        };

        let (count, used) =
            decode_varint32(&data).ok_or_else(|| "corrupted record batch header".to_string())?;
        self.batch = data;
        self.batch_pos = used;
        self.batch_left = count;
        Ok(())
    }

    /// Reassemble the next logical payload from physical records.
    ///
    /// FULL yields immediately; FIRST opens a fragment buffer that MIDDLEs
    /// extend and a LAST closes. Sequencing violations drop the smallest
    /// possible span and are reported, never silently merged.
    fn read_logical_payload(&mut self) -> Option<Vec<u8>> {
        let mut scratch: Vec<u8> = Vec::new();
        let mut in_fragment = false;
        loop {
            match self.read_physical_record() {
                Physical::Record(RecordType::Full, start, end) => {
                    if in_fragment {
                        self.report(scratch.len(), "partial record without end");
                    }
                    return Some(self.block[start..end].to_vec());
                }
                Physical::Record(RecordType::First, start, end) => {
                    if in_fragment {
                        self.report(scratch.len(), "partial record without end");
                    }
                    scratch.clear();
                    scratch.extend_from_slice(&self.block[start..end]);
                    in_fragment = true;
                }
                Physical::Record(RecordType::Middle, start, end) => {
                    if !in_fragment {
                        self.report(end - start, "missing start record");
                    } else {
                        scratch.extend_from_slice(&self.block[start..end]);
                    }
                }
                Physical::Record(RecordType::Last, start, end) => {
                    if !in_fragment {
                        self.report(end - start, "missing start record");
                    } else {
                        scratch.extend_from_slice(&self.block[start..end]);
                        return Some(scratch);
                    }
                }
                Physical::Bad => {
                    if in_fragment {
                        self.report(scratch.len(), "error in middle of record");
                        scratch.clear();
                        in_fragment = false;
                    }
                }
                Physical::Eof => {
                    // A fragment left open at end of file is the tail of a
                    // crashed write; the truncation was already reported at
                    // the physical layer.
                    return None;
                }
            }
        }
    }

    /// Scan for the next physical record, refilling the block buffer as
    /// needed.
    fn read_physical_record(&mut self) -> Physical {
        loop {
            let avail = self.block.len() - self.block_pos;
            if avail < RECORD_HEADER_SIZE {
                if self.eof {
                    if avail > 0 {
                        let offset = self.record_offset();
                        self.block_pos = self.block.len();
                        self.report(avail, &format!("truncated record at offset {}", offset));
                    }
                    return Physical::Eof;
                }
                // Anything shorter than a record header at the end of a
                // block is trailer padding left by the writer.
                if !self.read_block() {
                    return Physical::Eof;
                }
                continue;
            }

            let header = &self.block[self.block_pos..self.block_pos + RECORD_HEADER_SIZE];
            let stored = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let length = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
            let type_byte = header[8];

            if RECORD_HEADER_SIZE + length > avail {
                let offset = self.record_offset();
                self.block_pos = self.block.len();
                if self.eof {
                    // The file ends inside this record's declared extent:
                    // the writer died mid-write.
                    self.report(avail, &format!("truncated record at offset {}", offset));
                    return Physical::Eof;
                }
                // More blocks follow, so the length field itself is
                // garbage and nothing after it in this block can be
                // trusted.
                self.report(avail, "bad record length");
                return Physical::Bad;
            }

            let start = self.block_pos + RECORD_HEADER_SIZE;
            let end = start + length;
            // Consume the declared extent even on failure so subsequent
            // records in the block stay aligned.
            self.block_pos = end;

            if self.verify_checksum {
                let actual = record_checksum(type_byte, &self.block[start..end]);
                if unmask_checksum(stored) != actual {
                    self.report(RECORD_HEADER_SIZE + length, "checksum mismatch");
                    return Physical::Bad;
                }
            }

            match RecordType::from_u8(type_byte) {
                Some(record_type) => return Physical::Record(record_type, start, end),
                None => {
                    self.report(length, "unknown record type");
                    return Physical::Bad;
                }
            }
        }
    }

    /// Read the next block into the buffer. Returns false when no further
    /// bytes can be produced.
    fn read_block(&mut self) -> bool {
        let remaining = self.file_size.saturating_sub(self.file_offset);
        if remaining == 0 {
            self.eof = true;
            self.block.clear();
            self.block_pos = 0;
            return false;
        }

        let want = (self.block_size as u64).min(remaining) as usize;
        self.block.resize(want, 0);
        self.block_pos = 0;
        match self.source.read_at(self.file_offset, &mut self.block) {
            Ok(n) => {
                self.block.truncate(n);
                self.file_offset += n as u64;
                if n < self.block_size {
                    self.eof = true;
                }
                n > 0
            }
            Err(e) => {
                // Positions past a failed read cannot be trusted, so the
                // stream ends here.
                let reason = format!("read error: {}", e);
                self.report(self.block_size, &reason);
                self.eof = true;
                self.block.clear();
                false
            }
        }
    }

    /// File offset of the current scan position.
    fn record_offset(&self) -> u64 {
        self.file_offset - self.block.len() as u64 + self.block_pos as u64
    }

    fn report(&mut self, bytes: usize, reason: &str) {
        log::debug!("dropping {} bytes: {}", bytes, reason);
        if let Some(reporter) = &mut self.reporter {
            reporter(bytes, reason);
        }
    }
}
