use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};

use bytes::Bytes;
use md5::{Digest, Md5};
use tracing::debug;

use transporter_types::{FileStats, UploadError, UploadResult};

/// Read buffer for whole-file hashing.
const HASH_BUF_SIZE: usize = 4 * 1024 * 1024; // 4 MB

/// The package being uploaded, opened once for the whole run.
///
/// All reads are positional, so clones can be handed to any number of workers
/// without sharing a cursor or taking a lock. The OS handle closes when the
/// last clone drops.
#[derive(Clone)]
pub struct PackageFile {
    path: PathBuf,
    file: Arc<File>,
    stats: FileStats,
}

impl PackageFile {
    pub async fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(path))
            .await
            .map_err(|e| UploadError::Io(io::Error::other(e)))?
    }

    fn open_blocking(path: PathBuf) -> UploadResult<Self> {
        let file = File::open(&path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(UploadError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| ((d.as_micros() + 500) / 1000) as i64)
            .unwrap_or(0);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        debug!("Opened package {} ({} bytes)", path.display(), meta.len());

        Ok(Self {
            stats: FileStats {
                file_name,
                size: meta.len(),
                modified_ms,
            },
            file: Arc::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &FileStats {
        &self.stats
    }

    pub fn file_name(&self) -> &str {
        &self.stats.file_name
    }

    pub fn size(&self) -> u64 {
        self.stats.size
    }

    /// Independent reader with its own position, for zip inspection.
    pub fn reader(&self) -> PositionalReader {
        PositionalReader {
            file: self.file.clone(),
            pos: 0,
            len: self.stats.size,
        }
    }

    /// Hex MD5 of the whole file, plus how long hashing took in milliseconds.
    pub async fn md5(&self) -> UploadResult<(String, u64)> {
        let file = self.file.clone();
        let size = self.stats.size;
        tokio::task::spawn_blocking(move || -> UploadResult<(String, u64)> {
            let start = Instant::now();
            let mut hasher = Md5::new();
            let mut buf = vec![0u8; HASH_BUF_SIZE];
            let mut offset = 0u64;
            while offset < size {
                let n = (size - offset).min(HASH_BUF_SIZE as u64) as usize;
                read_exact_at(&file, &mut buf[..n], offset)?;
                hasher.update(&buf[..n]);
                offset += n as u64;
            }
            let elapsed_ms = start.elapsed().as_millis() as u64;
            Ok((hex::encode(hasher.finalize()), elapsed_ms))
        })
        .await
        .map_err(|e| UploadError::Io(io::Error::other(e)))?
    }

    /// Read exactly `length` bytes starting at `offset`.
    pub async fn read_range(&self, offset: u64, length: u64) -> UploadResult<Bytes> {
        let end = offset.checked_add(length);
        if end.is_none_or(|end| end > self.stats.size) {
            return Err(UploadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range {}+{} is outside {} ({} bytes)",
                    offset, length, self.stats.file_name, self.stats.size
                ),
            )));
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || -> UploadResult<Bytes> {
            let mut buf = vec![0u8; length as usize];
            read_exact_at(&file, &mut buf, offset)?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| UploadError::Io(io::Error::other(e)))?
    }
}

/// `Read + Seek` view over a shared file that never touches the OS cursor.
pub struct PositionalReader {
    file: Arc<File>,
    pos: u64,
    len: u64,
}

impl Read for PositionalReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let n = (self.len - self.pos).min(buf.len() as u64) as usize;
        read_exact_at(&self.file, &mut buf[..n], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for PositionalReader {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(pos) => {
                self.pos = pos;
                Ok(pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            )),
        }
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
