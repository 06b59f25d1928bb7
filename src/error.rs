//! Error types for click detection and repair

use thiserror::Error;

/// Repair error types
#[derive(Error, Debug)]
pub enum RepairError {
    /// Invalid settings
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Buffer length mismatch
    #[error("Buffer length mismatch: expected {expected}, got {got}")]
    BufferLength { expected: usize, got: usize },

    /// Position or range outside the usable sample span
    #[error("Position {position} out of range (channel length {length})")]
    OutOfRange { position: usize, length: usize },

    /// Fragment constructed with zero length
    #[error("Fragment at position {start} must contain at least one sample")]
    ZeroLengthFragment { start: usize },

    /// No patch starts at the given position
    #[error("No patch found at position {start}")]
    PatchNotFound { start: usize },

    /// Two accepted patches cover the same position
    #[error("Patch at position {start} overlaps an accepted patch")]
    OverlappingPatch { start: usize },

    /// Operation requires prediction errors that were never computed
    #[error("Channel was not scanned yet")]
    NotPreprocessed,
}

/// Result type for repair operations
pub type RepairResult<T> = Result<T, RepairError>;
