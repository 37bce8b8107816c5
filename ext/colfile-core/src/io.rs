//! Random-access byte sources for readers.

use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{ColfileError, Result};

/// A source that can hand out arbitrary byte ranges.
///
/// Sources are shared read-only, so several read sessions may use one
/// source at the same time.
pub trait ChunkReader: Send + Sync {
    /// Total length of the source in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `length` bytes starting at `start`
    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes>;
}

impl ChunkReader for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        let start = start as usize;
        let end = start.checked_add(length).filter(|end| *end <= Bytes::len(self));
        match end {
            Some(end) => Ok(self.slice(start..end)),
            None => Err(ColfileError::corrupt(format!(
                "Range {}..{} is outside a source of {} bytes",
                start,
                start.saturating_add(length),
                Bytes::len(self)
            ))),
        }
    }
}

impl<T: ChunkReader + ?Sized> ChunkReader for Arc<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        (**self).get_bytes(start, length)
    }
}

impl<T: ChunkReader + ?Sized> ChunkReader for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        (**self).get_bytes(start, length)
    }
}

/// File-backed source that reopens the file for every read, so clones can
/// be used from several threads without sharing a cursor
#[derive(Debug, Clone)]
pub struct FileChunkReader {
    path: PathBuf,
    file_len: u64,
}

impl FileChunkReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        Ok(FileChunkReader { path, file_len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkReader for FileChunkReader {
    fn len(&self) -> u64 {
        self.file_len
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        if start.saturating_add(length as u64) > self.file_len {
            return Err(ColfileError::corrupt(format!(
                "Range {}..{} is outside {} ({} bytes)",
                start,
                start.saturating_add(length as u64),
                self.path.display(),
                self.file_len
            )));
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut buffer = vec![0; length];
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bytes_source_ranges() {
        let source = Bytes::from_static(b"0123456789");
        assert_eq!(ChunkReader::len(&source), 10);
        assert_eq!(source.get_bytes(2, 3).unwrap().as_ref(), b"234");
        assert_eq!(source.get_bytes(10, 0).unwrap().len(), 0);
        assert!(matches!(
            source.get_bytes(8, 3),
            Err(ColfileError::CorruptFile(_))
        ));
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello colfile").unwrap();
        file.flush().unwrap();

        let source = FileChunkReader::new(file.path()).unwrap();
        assert_eq!(source.len(), 13);
        assert_eq!(source.get_bytes(6, 7).unwrap().as_ref(), b"colfile");
        assert!(source.get_bytes(10, 10).is_err());

        let shared = Arc::new(source);
        assert_eq!(shared.get_bytes(0, 5).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_missing_file() {
        let err = FileChunkReader::new("/definitely/not/here.clf").unwrap_err();
        assert!(matches!(err, ColfileError::Io(_)));
    }
}
