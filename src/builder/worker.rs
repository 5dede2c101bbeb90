use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BuildStatus, PyramidBuilder, TiledImage};
use crate::config::TilerConfig;
use crate::error::BuildError;

enum Input {
    Chunk(Bytes),
    End,
}

/// Async front of a builder running on a blocking worker thread.
///
/// Chunks queue on a bounded channel, so a producer that outruns the decoder
/// waits for queue space but never for a tile flush. Dropping the handle
/// without calling [`end_of_input`](Self::end_of_input) cancels the build.
pub struct BuilderHandle {
    image: Arc<TiledImage>,
    sender: mpsc::Sender<Input>,
    task: JoinHandle<Result<BuildStatus, BuildError>>,
}

/// Start a pyramid build on a dedicated blocking worker.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`BuildError::Geometry`] if the configuration is invalid.
pub fn spawn_builder(config: TilerConfig) -> Result<BuilderHandle, BuildError> {
    let capacity = config.channel_capacity;
    let builder = PyramidBuilder::new(config)?;
    Ok(BuilderHandle::spawn(builder, capacity))
}

impl BuilderHandle {
    /// Run an existing builder on a blocking worker.
    pub fn spawn(builder: PyramidBuilder, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let image = builder.image();
        let task = tokio::task::spawn_blocking(move || run(builder, receiver));
        Self {
            image,
            sender,
            task,
        }
    }

    /// The query side of this build.
    pub fn image(&self) -> Arc<TiledImage> {
        Arc::clone(&self.image)
    }

    pub fn status(&self) -> BuildStatus {
        self.image.status()
    }

    /// Queue the next chunk of compressed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Closed`] once the worker has stopped taking input
    /// (the build finished, failed or was cancelled).
    pub async fn supply(&self, bytes: Bytes) -> Result<(), BuildError> {
        self.sender
            .send(Input::Chunk(bytes))
            .await
            .map_err(|_| BuildError::Closed {
                status: self.image.status(),
            })
    }

    /// Signal the end of input and wait for the build to complete.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the build, or [`BuildError::Worker`] if
    /// the worker thread panicked.
    pub async fn end_of_input(self) -> Result<BuildStatus, BuildError> {
        // A closed channel means the worker already stopped; its result says why
        let _ = self.sender.send(Input::End).await;
        drop(self.sender);
        self.task.await.map_err(|e| BuildError::Worker {
            message: e.to_string(),
        })?
    }

    /// Cancel the build. Tiles become unavailable immediately.
    pub fn cancel(&self) {
        self.image.cancel();
    }
}

fn run(
    mut builder: PyramidBuilder,
    mut receiver: mpsc::Receiver<Input>,
) -> Result<BuildStatus, BuildError> {
    while let Some(input) = receiver.blocking_recv() {
        match input {
            Input::Chunk(bytes) => {
                let status = builder.supply(&bytes)?;
                if status.is_terminal() {
                    return Ok(status);
                }
            }
            Input::End => return builder.end_of_input(),
        }
    }

    debug!("Input closed without end of stream; cancelling build");
    builder.cancel();
    Ok(BuildStatus::Cancelled)
}

// =============================================================================
// Tests
// =============================================================================
