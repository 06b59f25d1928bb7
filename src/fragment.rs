//! Positioned sample buffers
//!
//! A [`Fragment`] is a mutable buffer addressed in the coordinate space of
//! the channel it belongs to. The patch maker probes candidate repairs as
//! throwaway fragments; the winning candidate is promoted to a [`Patch`],
//! which adds the quality metrics and the reviewer's approval flag.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::error::{RepairError, RepairResult};

/// Prediction error reported for any patched position.
///
/// Regenerated samples fit the local model by construction, so the error
/// overlay treats them as error-free.
pub const MINIMAL_PREDICTION_ERROR: f64 = 0.0;

/// A positioned, mutable run of samples.
///
/// Positions passed to [`value_at`]/[`set_value`] are absolute channel
/// indices and must lie within `[start_position, end_position]`; out-of-range
/// positions are a logic error and panic like slice indexing.
///
/// [`value_at`]: Fragment::value_at
/// [`set_value`]: Fragment::set_value
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    start_position: usize,
    data: Vec<f64>,
}

impl Fragment {
    /// Creates a zero-filled fragment of `length` samples at `start_position`.
    pub fn new(start_position: usize, length: usize) -> RepairResult<Self> {
        if length == 0 {
            return Err(RepairError::ZeroLengthFragment {
                start: start_position,
            });
        }
        Ok(Self {
            start_position,
            data: vec![0.0; length],
        })
    }

    /// Wraps an existing buffer.
    pub fn from_data(start_position: usize, data: Vec<f64>) -> RepairResult<Self> {
        if data.is_empty() {
            return Err(RepairError::ZeroLengthFragment {
                start: start_position,
            });
        }
        Ok(Self {
            start_position,
            data,
        })
    }

    /// Absolute position of the first sample.
    pub fn start_position(&self) -> usize {
        self.start_position
    }

    /// Absolute position of the last sample.
    pub fn end_position(&self) -> usize {
        self.start_position + self.data.len() - 1
    }

    /// Number of samples in the fragment.
    #[allow(clippy::len_without_is_empty)] // length >= 1 by construction
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Sample value at an absolute position.
    pub fn value_at(&self, position: usize) -> f64 {
        self.data[position - self.start_position]
    }

    /// Overwrites the sample at an absolute position.
    pub fn set_value(&mut self, position: usize, value: f64) {
        self.data[position - self.start_position] = value;
    }

    /// The underlying samples, first to last.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable access to the underlying samples.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// Quality metrics of a regenerated patch.
///
/// All three are produced by one regenerator run; lower is better.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatchMetrics {
    /// Error level at the patch start, with the patch in place.
    pub error_level_at_start: f64,
    /// Mean disagreement between the forward and backward tracks.
    pub connection_error: f64,
    /// Mean error level over the three positions after the patch end.
    pub error_level_after_end: f64,
}

/// An accepted repair: regenerated samples plus quality metrics.
///
/// Ordered by start position; equality and hashing use
/// `(start_position, len)`. Apart from the reviewer's approval toggle,
/// patches are immutable once built; a resize produces a new `Patch` through
/// the regenerator rather than mutating in place.
#[derive(Debug)]
pub struct Patch {
    fragment: Fragment,
    error_level_at_detection: f64,
    metrics: PatchMetrics,
    approved: AtomicBool,
}

impl Patch {
    /// Builds a patch from a regenerated fragment.
    pub fn new(fragment: Fragment, error_level_at_detection: f64, metrics: PatchMetrics) -> Self {
        Self {
            fragment,
            error_level_at_detection,
            metrics,
            approved: AtomicBool::new(true),
        }
    }

    /// Absolute position of the first repaired sample.
    pub fn start_position(&self) -> usize {
        self.fragment.start_position()
    }

    /// Absolute position of the last repaired sample.
    pub fn end_position(&self) -> usize {
        self.fragment.end_position()
    }

    /// Number of repaired samples.
    #[allow(clippy::len_without_is_empty)] // length >= 1 by construction
    pub fn len(&self) -> usize {
        self.fragment.len()
    }

    /// Repaired sample value at an absolute position.
    pub fn value_at(&self, position: usize) -> f64 {
        self.fragment.value_at(position)
    }

    /// The error level that flagged this damage during detection.
    pub fn error_level_at_detection(&self) -> f64 {
        self.error_level_at_detection
    }

    /// Quality metrics from the accepting regeneration.
    pub fn metrics(&self) -> PatchMetrics {
        self.metrics
    }

    /// Whether the reviewer currently accepts this repair.
    pub fn is_approved(&self) -> bool {
        self.approved.load(AtomicOrdering::Relaxed)
    }

    /// Flips the approval flag and returns the new state.
    pub fn toggle_approved(&self) -> bool {
        !self.approved.fetch_not(AtomicOrdering::Relaxed)
    }

    /// Sets the approval flag.
    pub fn set_approved(&self, approved: bool) {
        self.approved.store(approved, AtomicOrdering::Relaxed);
    }

    /// Whether the patch covers an absolute position.
    pub fn covers(&self, position: usize) -> bool {
        position >= self.start_position() && position <= self.end_position()
    }

    /// Whether the patch intersects `[start, end]` (inclusive).
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start_position() <= end && self.end_position() >= start
    }
}

impl PartialEq for Patch {
    fn eq(&self, other: &Self) -> bool {
        self.start_position() == other.start_position() && self.len() == other.len()
    }
}

impl Eq for Patch {}

impl Hash for Patch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start_position().hash(state);
        self.len().hash(state);
    }
}

impl PartialOrd for Patch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Patch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_position()
            .cmp(&other.start_position())
            .then_with(|| self.len().cmp(&other.len()))
    }
}
