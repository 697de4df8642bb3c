//! Random-access file adapters for the sender's source and the receiver's
//! sink. The protocol only ever needs disjoint, offset-addressed reads and
//! writes, so plain positional file I/O (`pread`/`pwrite` via
//! [`std::os::unix::fs::FileExt`]) does the job without mapping the whole
//! file into the address space the way the reference implementation's
//! `mmap` does.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// A read-only, fixed-length byte source addressed by offset.
pub trait RandomAccessSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn len(&self) -> u64;
}

/// A write-only (from the protocol's point of view), fixed-length byte
/// sink addressed by offset, synchronized to stable storage on close.
pub trait RandomAccessSink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(FileSource { file, len })
    }
}

impl RandomAccessSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

pub struct FileSink {
    file: File,
}

impl FileSink {
    /// Creates (or truncates) `path` and pre-sizes it to exactly `len`
    /// bytes before any segment is written.
    pub fn create(path: &Path, len: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Ok(FileSink { file })
    }
}

impl RandomAccessSink for FileSink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_presizes_and_writes_at_offset() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rft-io-test-{}", std::process::id()));
        let mut sink = FileSink::create(&path, 10).unwrap();
        sink.write_at(4, b"abc").unwrap();
        sink.sync().unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 10);
        assert_eq!(&contents[4..7], b"abc");

        std::fs::remove_file(&path).ok();
    }
}
