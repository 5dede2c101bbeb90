use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::IoError;

/// Random-access storage behind one level file.
///
/// Implementations must be thread-safe: the builder's worker writes while
/// viewer threads read finished tiles. Callers guarantee that a range is never
/// read and written concurrently.
pub trait TileBackend: Send + Sync {
    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), IoError>;

    /// Write `data` at `offset`.
    fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), IoError>;

    /// Push outstanding writes to stable storage.
    fn flush(&self) -> Result<(), IoError>;

    /// Size of the backing file in bytes.
    fn size(&self) -> u64;

    /// Path of the backing file (for logging and cleanup).
    fn path(&self) -> &Path;
}

/// How level files are accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Memory-mapped file
    #[default]
    Mapped,
    /// Positioned reads and writes (`pread`/`pwrite`)
    Positioned,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Mapped => write!(f, "mapped"),
            StoreBackend::Positioned => write!(f, "positioned"),
        }
    }
}

/// Create (or truncate) `path`, size it to `size` bytes and open it with the
/// requested backend.
///
/// A mapping failure falls back to positioned I/O on the same file.
pub fn open_backend(
    kind: StoreBackend,
    path: &Path,
    size: u64,
) -> Result<Box<dyn TileBackend>, IoError> {
    let file = create_sized(path, size)?;
    match kind {
        StoreBackend::Positioned => Ok(Box::new(PreadBackend::new(file, path, size))),
        StoreBackend::Mapped => match MmapBackend::new(&file, path, size) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Mapping failed; using positioned I/O");
                Ok(Box::new(PreadBackend::new(file, path, size)))
            }
        },
    }
}

fn create_sized(path: &Path, size: u64) -> Result<File, IoError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| IoError::Create {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    file.set_len(size).map_err(|e| IoError::Extend {
        path: path.to_path_buf(),
        size,
        message: e.to_string(),
    })?;
    Ok(file)
}

#[inline]
fn check_range(offset: u64, len: usize, size: u64) -> Result<usize, IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(offset as usize),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            len: len as u64,
            size,
        }),
    }
}

// =============================================================================
// MmapBackend
// =============================================================================

/// Level file accessed through a writable memory map.
pub struct MmapBackend {
    map: RwLock<MmapMut>,
    path: PathBuf,
    size: u64,
}

impl MmapBackend {
    fn new(file: &File, path: &Path, size: u64) -> Result<Self, IoError> {
        // SAFETY: the file was just created by this process under a unique name
        // and is never resized or mapped elsewhere while the map is alive.
        let map = unsafe { MmapMut::map_mut(file) }.map_err(|e| IoError::Map {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            map: RwLock::new(map),
            path: path.to_path_buf(),
            size,
        })
    }
}

impl TileBackend for MmapBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), IoError> {
        let start = check_range(offset, buf.len(), self.size)?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        buf.copy_from_slice(&map[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        let start = check_range(offset, data.len(), self.size)?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush(&self) -> Result<(), IoError> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        map.flush().map_err(|e| IoError::Flush {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

// =============================================================================
// PreadBackend
// =============================================================================

/// Level file accessed with positioned reads and writes.
pub struct PreadBackend {
    file: File,
    path: PathBuf,
    size: u64,
}

impl PreadBackend {
    fn new(file: File, path: &Path, size: u64) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
            size,
        }
    }

    fn access_error(&self, e: std::io::Error) -> IoError {
        IoError::Access {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl TileBackend for PreadBackend {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), IoError> {
        check_range(offset, buf.len(), self.size)?;
        positioned::read_exact_at(&self.file, buf, offset).map_err(|e| self.access_error(e))
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        check_range(offset, data.len(), self.size)?;
        positioned::write_all_at(&self.file, data, offset).map_err(|e| self.access_error(e))
    }

    fn flush(&self) -> Result<(), IoError> {
        self.file.sync_data().map_err(|e| IoError::Flush {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }

    pub fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(data, offset)
    }
}

#[cfg(windows)]
mod positioned {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset)? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    pub fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
        while !data.is_empty() {
            match file.seek_write(data, offset)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => {
                    data = &data[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
