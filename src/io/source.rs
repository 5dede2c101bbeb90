use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::builder::{BuildStatus, BuilderHandle};
use crate::error::{BuildError, IoError};

/// Default number of bytes read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A stream of compressed bytes arriving over time.
///
/// Implementations hand out chunks in order until the stream ends. Chunk
/// boundaries carry no meaning; the decoder accepts any split.
#[async_trait]
pub trait ByteSource: Send {
    /// Next chunk, or `None` at the end of the stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, IoError>;

    /// Identifier for logging.
    fn identifier(&self) -> &str;
}

// =============================================================================
// FileSource
// =============================================================================

/// Reads a local file in fixed-size chunks.
pub struct FileSource {
    file: tokio::fs::File,
    chunk_size: usize,
    identifier: String,
}

impl FileSource {
    /// Open `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Access`] if the file cannot be opened.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, IoError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| IoError::Access {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self {
            file,
            chunk_size: chunk_size.max(1),
            identifier: format!("file://{}", path.display()),
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, IoError> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let n = self
            .file
            .read(&mut buf)
            .await
            .map_err(|e| IoError::Source(format!("{}: {}", self.identifier, e)))?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf.freeze()))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// ChannelSource
// =============================================================================

/// Chunks pushed by another task, e.g. a network response body.
///
/// The stream ends when every sender has been dropped.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Bytes>,
    identifier: String,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize, identifier: impl Into<String>) -> (mpsc::Sender<Bytes>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let source = Self {
            receiver,
            identifier: identifier.into(),
        };
        (sender, source)
    }
}

#[async_trait]
impl ByteSource for ChannelSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, IoError> {
        Ok(self.receiver.recv().await)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// MemorySource
// =============================================================================

/// An in-memory buffer handed out in chunks of a fixed size.
pub struct MemorySource {
    data: Bytes,
    offset: usize,
    chunk_size: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, IoError> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Ok(Some(chunk))
    }

    fn identifier(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// pump_source
// =============================================================================

/// Feed every chunk of `source` to a background builder, then signal the end
/// of input and wait for the result.
///
/// A source error fails the build and is returned.
///
/// # Errors
///
/// Returns the source's [`IoError`] or the build's own error.
pub async fn pump_source<S>(source: &mut S, handle: BuilderHandle) -> Result<BuildStatus, BuildError>
where
    S: ByteSource + ?Sized,
{
    let mut chunks = 0u64;
    loop {
        match source.next_chunk().await {
            Ok(Some(chunk)) => {
                chunks += 1;
                if handle.supply(chunk).await.is_err() {
                    // Worker stopped early; its result says why
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(source = source.identifier(), error = %e, "Input source failed");
                let error = BuildError::Io(e);
                handle.image().fail(error.clone());
                drop(handle);
                return Err(error);
            }
        }
    }

    debug!(source = source.identifier(), chunks, "Input source drained");
    handle.end_of_input().await
}

// =============================================================================
// Tests
// =============================================================================
