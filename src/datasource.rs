//! Byte streams behind `datasource://` URLs.
//!
//! The engine does not open these URLs itself. It asks the registered
//! [`DataSourceFactory`] for a [`DataSource`] and pulls bytes through it, so
//! the application decides where the media actually lives.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::*;

pub const DATA_SOURCE_SCHEME: &str = "datasource";

/// Largest single read asked of a source.
pub const READ_CHUNK: usize = 1024 * 1024;

/// Strips `datasource://`, or returns `None` for any other URL.
pub fn data_source_path(url: &str) -> Option<&str> {
    url.strip_prefix(DATA_SOURCE_SCHEME)?.strip_prefix("://")
}

/// A seekable byte stream. Dropping it closes the stream.
pub trait DataSource: Send {
    /// Total length in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Short reads are allowed. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves to an absolute byte offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;
}

pub trait DataSourceFactory: Send + Sync {
    fn open(&self, url: &str) -> io::Result<Box<dyn DataSource>>;
}

pub struct FileDataSource {
    path: PathBuf,
    file: File,
}

impl FileDataSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).inspect_err(|e| {
            error!("[DataSource] Failed to open {}: {}", path.display(), e);
        })?;
        debug!("[DataSource] Opened {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileDataSource {
    fn size(&mut self) -> io::Result<u64> {
        let size = self.file.metadata()?.len();
        debug!("[DataSource] {} is {} bytes", self.path.display(), size);
        Ok(size)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).inspect_err(|e| {
            error!("[DataSource] Read from {} failed: {}", self.path.display(), e);
        })
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        trace!("[DataSource] {} seeked to {}", self.path.display(), offset);
        Ok(())
    }
}

impl Drop for FileDataSource {
    fn drop(&mut self) {
        debug!("[DataSource] Closing {}", self.path.display());
    }
}

/// Opens `datasource://<path>` as a local file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDataSourceFactory;

impl DataSourceFactory for FileDataSourceFactory {
    fn open(&self, url: &str) -> io::Result<Box<dyn DataSource>> {
        let path = data_source_path(url).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{url}' is not a {DATA_SOURCE_SCHEME}:// URL"),
            )
        })?;
        Ok(Box::new(FileDataSource::open(path)?))
    }
}

/// Fills `buf` in chunks of at most [`READ_CHUNK`], stopping early at end of
/// stream. Returns how many bytes were read.
pub fn read_full(source: &mut dyn DataSource, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let end = (filled + READ_CHUNK).min(buf.len());
        let n = source.read(&mut buf[filled..end])?;
        if n == 0 {
            break;
        }
        if n > end - filled {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("source returned {n} bytes for a {} byte read", end - filled),
            ));
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn media_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn url(file: &NamedTempFile) -> String {
        format!("datasource://{}", file.path().display())
    }

    /// Hands out at most three bytes per read.
    struct Trickle(io::Cursor<Vec<u8>>);

    impl DataSource for Trickle {
        fn size(&mut self) -> io::Result<u64> {
            Ok(self.0.get_ref().len() as u64)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(3);
            self.0.read(&mut buf[..len])
        }

        fn seek(&mut self, offset: u64) -> io::Result<()> {
            self.0.set_position(offset);
            Ok(())
        }
    }

    #[test]
    fn test_data_source_path() {
        assert_eq!(data_source_path("datasource:///sdcard/a.mkv"), Some("/sdcard/a.mkv"));
        assert_eq!(data_source_path("/sdcard/a.mkv"), None);
        assert_eq!(data_source_path("datasource:/a.mkv"), None);
    }

    #[test]
    fn test_file_source_read_and_seek() {
        let file = media_file(b"0123456789");
        let mut source = FileDataSourceFactory.open(&url(&file)).unwrap();
        assert_eq!(source.size().unwrap(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(read_full(source.as_mut(), &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        source.seek(8).unwrap();
        assert_eq!(read_full(source.as_mut(), &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_missing_file_and_foreign_url() {
        let err = FileDataSourceFactory
            .open("datasource:///no/such/file.mkv")
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err = FileDataSourceFactory.open("/no/scheme.mkv").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_full_retries_short_reads() {
        let mut source = Trickle(io::Cursor::new(b"abcdefgh".to_vec()));
        let mut buf = [0u8; 6];
        assert_eq!(read_full(&mut source, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"abcdef");

        let mut rest = [0u8; 6];
        assert_eq!(read_full(&mut source, &mut rest).unwrap(), 2);
        assert_eq!(&rest[..2], b"gh");
    }
}
