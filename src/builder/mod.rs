//! Builder façade.
//!
//! A [`PyramidBuilder`] owns the decoder and the compositor for one image and
//! is driven by pushing compressed bytes into it. The [`TiledImage`] it
//! publishes is the read side: viewer threads query geometry, status and
//! finished tiles while the build is still running.
//!
//! ```text
//!  producer ──supply()──► PyramidBuilder ──rows──► Compositor ──► level files
//!                              │                                     ▲
//!                              └── status / stats ──► TiledImage ────┘ tile()
//! ```
//!
//! [`spawn_builder`] moves a builder onto a blocking worker so async
//! producers hand chunks over a bounded channel and never wait on flushes.

mod image;
mod pyramid_builder;
mod worker;

use std::fmt;

use serde::Serialize;

pub use image::{BuildStats, TiledImage};
pub use pyramid_builder::{build_from_file, PyramidBuilder};
pub use worker::{spawn_builder, BuilderHandle};

/// Lifecycle of a build.
///
/// ```text
/// NotStarted ──► Decoding ──┬──► Finished
///                           ├──► Failed
///                           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    NotStarted,
    Decoding,
    Finished,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Whether no further input is accepted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Finished | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStatus::NotStarted => "not started",
            BuildStatus::Decoding => "decoding",
            BuildStatus::Finished => "finished",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
