//! Configuration options for log writers.

use crate::format::{BLOCK_SIZE_FACTOR, RECORD_HEADER_SIZE};

/// Configuration options for creating a log file.
///
/// The block size and compression mode are chosen once at writer
/// construction time, recorded in the file header, and immutable for the
/// lifetime of the file. Readers learn both from the header.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Block size multiplier. The on-disk block size is
    /// `block_size_multiplier * 64 KiB`.
    /// Default: 1
    pub block_size_multiplier: u8,

    /// Compression applied to each flushed record batch.
    /// Default: CompressionType::Snappy (when the `snappy` feature is on)
    pub compression: CompressionType,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            block_size_multiplier: 1,
            compression: CompressionType::default(),
        }
    }
}

impl LogOptions {
    /// Creates a new LogOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size multiplier.
    pub fn block_size_multiplier(mut self, value: u8) -> Self {
        self.block_size_multiplier = value;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// The block size in bytes implied by these options.
    pub fn block_size(&self) -> usize {
        self.block_size_multiplier as usize * BLOCK_SIZE_FACTOR
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size_multiplier == 0 {
            return Err(crate::Error::invalid_argument(
                "block_size_multiplier must be > 0",
            ));
        }
        // A block must be able to hold at least one non-empty record.
        debug_assert!(self.block_size() > RECORD_HEADER_SIZE);
        Ok(())
    }
}

/// Compression algorithms supported for record batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}
