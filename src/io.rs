//! Byte sink and source abstractions.
//!
//! The writer appends to a [`Sink`] and the reader pulls blocks from a
//! [`Source`]. Both are implemented for plain in-memory buffers (used
//! heavily by the tests) and for files. Construction from a path owns the
//! file; construction from an injected value owns whatever handle the
//! caller hands over, so borrowing is expressed by injecting a reference
//! type such as `&[u8]`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// An append-only destination for log bytes.
pub trait Sink {
    /// Append `data` at the current end of the sink.
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push any buffered bytes to durable storage.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// A random-access origin for log bytes.
pub trait Source {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; a read past the end of the data
    /// returns however many bytes remain (possibly zero), not an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total size of the underlying data in bytes.
    fn size(&self) -> u64;
}

impl Source for &[u8] {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// File-backed [`Sink`] that truncates on open and fsyncs on flush.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or overwrite) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl Sink for FileSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

/// File-backed [`Source`].
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    /// Open the file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl Source for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
