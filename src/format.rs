//! On-disk format definitions for the log.
//!
//! A log file is a fixed header followed by a sequence of fixed-size blocks:
//!
//! ```text
//! Header:  magic "BLG1" (4) | version (1) | block_size_multiplier (1)
//!          | compression_flag (1) | meta_count (4)
//!          | { key_len(4) key value_len(4) value } * meta_count
//! Block*:  block_size_multiplier * 64 KiB bytes, each holding:
//!          { checksum(4) length(4) type(1) payload(length) } * N  [+ zero padding]
//! ```
//!
//! All integers are little-endian. The checksum is a masked CRC32 of the
//! type byte followed by the payload; `length` is deliberately excluded so
//! a corrupted length field is caught by the block-bounds check rather than
//! silently shifting the checksum window.

use crate::error::{Error, Result};
use crate::io::Source;
use bytes::{BufMut, BytesMut};
use crc32fast::Hasher;
use std::collections::BTreeMap;

/// Base unit for block sizes; the on-disk block size is a small multiple
/// of this.
pub const BLOCK_SIZE_FACTOR: usize = 64 * 1024;

/// Size of a physical record header (checksum + length + type).
pub const RECORD_HEADER_SIZE: usize = 9;

/// Magic tag identifying a log file.
pub const MAGIC: [u8; 4] = *b"BLG1";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Fixed-size prefix of the file header, before the metadata entries.
pub const HEADER_FIXED_SIZE: usize = 11;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Physical record types for packing logical payloads into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// An entire logical payload in a single physical record.
    Full = 1,
    /// First fragment of a payload that spans block boundaries.
    First = 2,
    /// Interior fragment, always exactly one block's worth.
    Middle = 3,
    /// Final fragment of a multi-record payload.
    Last = 4,
}

impl RecordType {
    /// Convert from u8 to RecordType. Returns None for on-disk garbage;
    /// the reader reports that as `unknown record type` rather than failing.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

/// CRC32 over the record type byte followed by the payload.
pub fn record_checksum(record_type: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[record_type]);
    hasher.update(payload);
    hasher.finalize()
}

/// Mask a checksum before storing it.
///
/// Rotates the value and adds a constant so that a stored checksum of zero
/// can never be mistaken for a valid checksum of zeroed bytes.
pub fn mask_checksum(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask_checksum`].
pub fn unmask_checksum(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Append a u32 as a LEB128 varint (at most 5 bytes).
pub fn encode_varint32(buf: &mut BytesMut, mut value: u32) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode a LEB128 varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or None if the
/// input ends mid-varint or the varint overflows 32 bits.
pub fn decode_varint32(data: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().take(5).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte < 0x80 {
            // The final byte of a 5-byte varint may only carry 4 bits.
            if i == 4 && byte > 0x0f {
                return None;
            }
            return Some((value, i + 1));
        }
    }
    None
}

/// Parsed file header: everything a reader must know before the first block.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Block size multiplier recorded by the writer.
    pub block_size_multiplier: u8,
    /// Whether logical payloads carry a compression method byte.
    pub compressed: bool,
    /// User-supplied metadata, fixed at write time.
    pub meta: BTreeMap<String, String>,
}

impl FileHeader {
    /// Serialize the header for writing at the start of a file.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_FIXED_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u8(self.block_size_multiplier);
        buf.put_u8(self.compressed as u8);
        buf.put_u32_le(self.meta.len() as u32);
        for (key, value) in &self.meta {
            buf.put_u32_le(key.len() as u32);
            buf.put_slice(key.as_bytes());
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(value.as_bytes());
        }
        buf
    }

    /// Read and validate the header from the start of a source.
    ///
    /// Returns the header and its encoded length, i.e. the file offset at
    /// which blocks begin. Fails the whole open on an unrecognized magic or
    /// version; a file we cannot identify is not worth scanning for records.
    pub fn read_from<S: Source>(source: &mut S) -> Result<(FileHeader, u64)> {
        let file_size = source.size();
        let fixed = read_exact_at(source, 0, HEADER_FIXED_SIZE)?;

        if fixed[0..4] != MAGIC {
            return Err(Error::corruption("not a log file (bad magic)"));
        }
        if fixed[4] != FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "unsupported format version: {}",
                fixed[4]
            )));
        }
        let block_size_multiplier = fixed[5];
        if block_size_multiplier == 0 {
            return Err(Error::corruption("invalid block size multiplier"));
        }
        let compressed = fixed[6] != 0;
        let meta_count = u32::from_le_bytes(fixed[7..11].try_into().unwrap());

        let mut offset = HEADER_FIXED_SIZE as u64;
        let mut meta = BTreeMap::new();
        for _ in 0..meta_count {
            let (key, next) = read_meta_string(source, offset, file_size)?;
            let (value, next) = read_meta_string(source, next, file_size)?;
            meta.insert(key, value);
            offset = next;
        }

        Ok((
            FileHeader {
                block_size_multiplier,
                compressed,
                meta,
            },
            offset,
        ))
    }
}

fn read_meta_string<S: Source>(source: &mut S, offset: u64, file_size: u64) -> Result<(String, u64)> {
    let len_bytes = read_exact_at(source, offset, 4)?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as u64;
    if offset + 4 + len > file_size {
        return Err(Error::corruption("metadata entry overflows file"));
    }
    let bytes = read_exact_at(source, offset + 4, len as usize)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::corruption("metadata entry is not valid UTF-8"))?;
    Ok((text, offset + 4 + len))
}

fn read_exact_at<S: Source>(source: &mut S, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = source.read_at(offset, &mut buf)?;
    if n < len {
        return Err(Error::corruption("truncated file header"));
    }
    Ok(buf)
}
