use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{BuildStatus, TiledImage};
use crate::config::TilerConfig;
use crate::decode::{DecodeCursor, Flow, JpegDecoder, Progress, ScanlineSink, SourceImage};
use crate::error::{BuildError, DecodeError, IoError};
use crate::format::Orientation;
use crate::io::DEFAULT_CHUNK_SIZE;
use crate::pyramid::{plan_levels, Compositor};
use crate::store::{BackpressureController, PyramidStore};

// =============================================================================
// BuildSink
// =============================================================================

/// Connects decoder output to the compositor and the published image.
struct BuildSink {
    config: TilerConfig,
    image: Arc<TiledImage>,
    backpressure: Option<BackpressureController>,
    compositor: Option<Compositor>,
}

impl BuildSink {
    fn sync_stats(&self) {
        if let Some(compositor) = &self.compositor {
            let stats = compositor.stats();
            self.image.set_write_stats(stats.tiles_written, stats.flushes);
        }
    }
}

impl ScanlineSink for BuildSink {
    type Error = BuildError;

    fn begin(&mut self, source: &SourceImage) -> Result<(), BuildError> {
        let orientation = Orientation::resolve(self.config.orientation, source.orientation);
        let (width, height) = orientation.display_size(source.width, source.height);
        let levels = plan_levels(
            width,
            height,
            self.config.tile_dimension,
            self.config.level_policy,
        )?;

        let pyramid = Arc::new(PyramidStore::create(
            &self.config.output_dir,
            &levels,
            self.config.backend,
            self.config.keep_files,
        )?);

        info!(
            width = source.width,
            height = source.height,
            components = source.components,
            progressive = source.progressive,
            buffered = source.buffered,
            orientation = %orientation,
            levels = levels.len(),
            "JPEG header parsed"
        );

        let backpressure = self.backpressure.take().unwrap_or_default();
        self.compositor = Some(Compositor::new(
            Arc::clone(&pyramid),
            source.width,
            source.height,
            orientation,
            backpressure,
        ));
        self.image
            .publish_header(source.clone(), orientation, levels, pyramid);
        Ok(())
    }

    fn rows(&mut self, first_row: u32, count: u32, rgba: &[u8]) -> Result<Flow, BuildError> {
        if self.image.is_cancelled() {
            return Ok(Flow::Stop);
        }
        let Some(compositor) = self.compositor.as_mut() else {
            return Ok(Flow::Stop);
        };
        compositor.push_rows(first_row, count, rgba)?;
        self.image.add_scanlines(count);
        Ok(Flow::Continue)
    }
}

// =============================================================================
// PyramidBuilder
// =============================================================================

/// Push-driven pyramid build for one JPEG.
///
/// Feed compressed bytes with [`supply`](Self::supply) as they arrive and call
/// [`end_of_input`](Self::end_of_input) after the last chunk. Decoding and tile
/// writes happen inside those calls, on the caller's thread; use
/// [`spawn_builder`](super::spawn_builder) to run them on a worker instead.
///
/// # Example
///
/// ```no_run
/// use jpeg_pyramid::{PyramidBuilder, TilerConfig};
///
/// let mut builder = PyramidBuilder::new(TilerConfig::new().with_viewport(800, 600))?;
/// let image = builder.image();
///
/// for chunk in std::fs::read("photo.jpg").unwrap().chunks(16 * 1024) {
///     builder.supply(chunk)?;
/// }
/// builder.end_of_input()?;
///
/// let (width, height) = image.image_size().unwrap();
/// let tile = image.tile(0, 0, 0)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PyramidBuilder {
    image: Arc<TiledImage>,
    decoder: JpegDecoder,
    cursor: DecodeCursor,
    sink: BuildSink,
}

impl PyramidBuilder {
    /// Create a builder.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Geometry`] if the configuration is invalid.
    pub fn new(config: TilerConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let image = Arc::new(TiledImage::new());
        Ok(Self {
            image: Arc::clone(&image),
            decoder: JpegDecoder::new(),
            cursor: DecodeCursor::new(),
            sink: BuildSink {
                config,
                image,
                backpressure: None,
                compositor: None,
            },
        })
    }

    /// Account writes with `controller` instead of the process-wide default.
    pub fn with_backpressure(mut self, controller: BackpressureController) -> Self {
        self.sink.backpressure = Some(controller);
        self
    }

    /// The query side of this build.
    pub fn image(&self) -> Arc<TiledImage> {
        Arc::clone(&self.image)
    }

    pub fn status(&self) -> BuildStatus {
        self.image.status()
    }

    pub fn cursor(&self) -> &DecodeCursor {
        &self.cursor
    }

    /// Decode as much of `bytes` (appended to earlier input) as possible.
    ///
    /// Returns the status after the call: `Decoding` while more input is
    /// expected, `Finished` if the last scanline has been composited, or
    /// `Cancelled` if the build was cancelled.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Closed`] if the build already ended
    /// - Any decode, geometry or I/O error, which also fails the build
    pub fn supply(&mut self, bytes: &[u8]) -> Result<BuildStatus, BuildError> {
        self.feed(bytes, false)
    }

    /// Signal that no more input will follow and complete the pyramid.
    ///
    /// Calling this on a build that already finished returns `Finished`.
    ///
    /// # Errors
    ///
    /// As for [`supply`](Self::supply). A stream that ends before the header
    /// or before its last scanline fails with a [`BuildError::Decode`].
    pub fn end_of_input(&mut self) -> Result<BuildStatus, BuildError> {
        if self.image.status() == BuildStatus::Finished {
            return Ok(BuildStatus::Finished);
        }
        self.feed(&[], true)
    }

    /// Stop the build and discard its files.
    pub fn cancel(&mut self) {
        self.image.cancel();
        self.abandon();
    }

    fn feed(&mut self, chunk: &[u8], end: bool) -> Result<BuildStatus, BuildError> {
        if self.image.is_cancelled() {
            self.abandon();
        }
        let status = self.image.status();
        if status.is_terminal() {
            return Err(BuildError::Closed { status });
        }

        self.image.mark_started();
        self.image.add_supplied(chunk.len());

        let result = self
            .decoder
            .feed(&mut self.cursor, chunk, end, &mut self.sink);
        self.sink.sync_stats();

        match result {
            Ok(Progress::NeedMore) if end => {
                let height = self.decoder.image().map_or(0, |image| image.height);
                self.fail(
                    DecodeError::Truncated {
                        decoded: self.cursor.rows_emitted(),
                        expected: height,
                    }
                    .into(),
                )
            }
            Ok(Progress::NeedMore) => Ok(BuildStatus::Decoding),
            Ok(Progress::Done) => self.complete(),
            Ok(Progress::Stopped) => {
                self.image.cancel();
                self.abandon();
                Ok(BuildStatus::Cancelled)
            }
            Err(e) => self.fail(e),
        }
    }

    fn complete(&mut self) -> Result<BuildStatus, BuildError> {
        let Some(mut compositor) = self.sink.compositor.take() else {
            return self.fail(
                DecodeError::MissingHeader {
                    received: self.cursor.bytes_received(),
                }
                .into(),
            );
        };

        if let Err(e) = compositor.finish() {
            return self.fail(e.into());
        }
        let stats = compositor.stats();
        self.image.set_write_stats(stats.tiles_written, stats.flushes);
        drop(compositor);

        if self.image.finish() {
            let stats = self.image.stats();
            info!(
                levels = self.image.level_count(),
                scanlines = stats.scanlines,
                bytes = stats.bytes_supplied,
                tiles = stats.tiles_written,
                flushes = stats.flushes,
                elapsed_ms = stats.elapsed_ms.unwrap_or(0),
                "Pyramid build finished"
            );
        }
        Ok(self.image.status())
    }

    fn fail(&mut self, error: BuildError) -> Result<BuildStatus, BuildError> {
        let rows = self.cursor.rows_emitted();
        let bytes = self.cursor.bytes_received();
        if matches!(error, BuildError::Decode(DecodeError::Truncated { .. })) {
            warn!(error = %error, rows, bytes, "Premature end of JPEG data");
        } else {
            error!(error = %error, rows, bytes, "Pyramid build failed");
        }
        self.image.fail(error.clone());
        self.release();
        Err(error)
    }

    fn abandon(&mut self) {
        if self.sink.compositor.is_some() {
            debug!(
                rows = self.cursor.rows_emitted(),
                "Tearing down cancelled build"
            );
        }
        self.release();
    }

    /// Drop the compositor and delete the level files.
    fn release(&mut self) {
        if let Some(compositor) = self.sink.compositor.take() {
            compositor.pyramid().remove_files();
        }
    }
}

// =============================================================================
// File input
// =============================================================================

/// Build a pyramid from a local file, reading it in chunks.
///
/// # Errors
///
/// Returns [`BuildError::Io`] if the file cannot be opened or read, or the
/// build's own error.
pub fn build_from_file(config: TilerConfig, path: &Path) -> Result<Arc<TiledImage>, BuildError> {
    let mut builder = PyramidBuilder::new(config)?;
    let read_error = |e: std::io::Error| IoError::Access {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
    debug!(path = %path.display(), "Building pyramid from file");

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                builder.cancel();
                return Err(read_error(e).into());
            }
        };
        if builder.supply(&buf[..n])? == BuildStatus::Finished {
            break;
        }
    }
    builder.end_of_input()?;
    Ok(builder.image())
}

// =============================================================================
// Tests
// =============================================================================
