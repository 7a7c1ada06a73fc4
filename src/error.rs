//! Typed failures of the pipeline.
//!
//! Most functions return [`anyhow::Result`]; the variants
//! here are wrapped into it where a caller needs to tell
//! the failure apart (via `downcast_ref`), e.g. to decide
//! whether a run must stop or only one folder is skipped.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// External executable missing or not runnable.
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: &'static str, reason: String },

    #[error("root directory not found: {0}")]
    RootNotFound(PathBuf),

    /// A directory or file a stage consumes does not exist.
    #[error("missing {what}: {path}")]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("invalid metadata file {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("raw buffer is empty")]
    EmptyBuffer,

    #[error("raw buffer has odd length {0} (expected 16-bit samples)")]
    OddBufferLength(u64),

    #[error("invalid declared dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("no factorization found for {0} samples")]
    Unfactorable(usize),
}
