//! Error types for the archive engine
//!
//! One taxonomy for the whole crate. The split that matters at query time is
//! session-fatal (`ArchiveUnavailable`, `InvalidPattern`) versus per-channel
//! (`ChannelNotFound`, `IndexCorrupt`, `BlockCorrupt`, `DeadlineExceeded`):
//! the latter degrade a single channel's result and never abort the batch.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the catalog, index, codec, and query layers
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index artifact cannot be opened (missing, unreadable, bad header)
    #[error("archive unavailable: {path}: {reason}")]
    ArchiveUnavailable { path: PathBuf, reason: String },

    /// Requested channel does not exist in the catalog
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// Channel listing pattern failed to compile
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Structural violation in the interval tree
    #[error("corrupt index node at offset {node_offset}: {reason}")]
    IndexCorrupt { node_offset: u64, reason: String },

    /// Structural violation in a data block
    #[error("corrupt block at byte {offset}: {reason}")]
    BlockCorrupt { offset: usize, reason: String },

    /// Query deadline elapsed; partial results were returned
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Shorthand used throughout the codec
    pub(crate) fn block(offset: usize, reason: impl Into<String>) -> Self {
        ArchiveError::BlockCorrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// Shorthand used throughout the index reader
    pub(crate) fn index(node_offset: u64, reason: impl Into<String>) -> Self {
        ArchiveError::IndexCorrupt {
            node_offset,
            reason: reason.into(),
        }
    }

    /// True for errors that poison a single channel rather than the session
    pub fn is_per_channel(&self) -> bool {
        matches!(
            self,
            ArchiveError::ChannelNotFound(_)
                | ArchiveError::IndexCorrupt { .. }
                | ArchiveError::BlockCorrupt { .. }
                | ArchiveError::DeadlineExceeded
                | ArchiveError::Io(_)
        )
    }
}

/// Result type alias for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
