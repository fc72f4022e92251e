//! Error types for slotq

use std::io;
use thiserror::Error;

use crate::config::SegmentKey;

/// Result type for slotq operations
pub type Result<T> = std::result::Result<T, SlotqError>;

/// Errors that can occur while managing the shared queue
#[derive(Debug, Error)]
pub enum SlotqError {
    /// Shared memory could not be created or opened
    #[error("Shared segment {key} is unavailable: {source}")]
    SegmentUnavailable {
        key: SegmentKey,
        #[source]
        source: io::Error,
    },

    /// Mapping the segment into this process was refused
    #[error("Failed to attach shared segment: {0}")]
    AttachFailed(#[source] io::Error),

    /// Unmapping the segment failed
    #[error("Failed to detach shared segment: {0}")]
    DetachFailed(#[source] io::Error),

    /// Releasing the segment failed
    #[error("Failed to destroy shared segment {key}: {source}")]
    DestroyFailed {
        key: SegmentKey,
        #[source]
        source: io::Error,
    },

    /// The platform could not create the consumer
    #[error("Failed to spawn consumer: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Waiting for the consumer failed
    #[error("Failed to join consumer: {0}")]
    JoinFailed(#[source] io::Error),

    /// An existing segment is too small to hold the queue
    #[error("Shared segment layout mismatch: expected {expected} bytes, got {got} bytes")]
    LayoutMismatch { expected: usize, got: usize },

    /// An existing segment holds a count outside the queue's range
    #[error("Shared queue is corrupt: count {count} exceeds capacity {capacity}")]
    CorruptQueue { count: u32, capacity: usize },

    /// The collaborator could not produce a valid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SlotqError {
    /// Whether this error must terminate the current process
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SlotqError::DetachFailed(_)
                | SlotqError::DestroyFailed { .. }
                | SlotqError::InvalidInput(_)
        )
    }
}
