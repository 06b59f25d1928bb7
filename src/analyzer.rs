//! Normal prediction error estimation
//!
//! Reduces a window of raw prediction errors to a single "normal error"
//! scalar. The damage detector divides the error at a position by this norm
//! to get a dimensionless error level.

use crate::error::{RepairError, RepairResult};

/// Estimator for the local noise floor of prediction errors.
pub trait Analyzer: Send + Sync {
    /// Number of prediction errors consumed per estimate.
    fn input_data_size(&self) -> usize;

    /// Value callers substitute when there is not enough history.
    fn default_result(&self) -> f64;

    /// Reduces `errors` to one normal-error scalar.
    ///
    /// Fails if `errors` is not exactly [`input_data_size`] long.
    ///
    /// [`input_data_size`]: Analyzer::input_data_size
    fn compute_norm(&self, errors: &[f64]) -> RepairResult<f64>;
}

/// Block size for [`AveragedMaxAnalyzer`].
const BLOCK_SIZE: usize = 16;

/// Number of blocks for [`AveragedMaxAnalyzer`].
const BLOCK_COUNT: usize = 16;

/// Averaged block-maximum estimator.
///
/// Partitions the error window into contiguous blocks, takes the maximum
/// absolute value per block and averages the maxima. A single outlier spike
/// can dominate at most one block, so the estimate tracks the local noise
/// floor instead of the damage being measured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AveragedMaxAnalyzer;

impl AveragedMaxAnalyzer {
    /// Creates the estimator.
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for AveragedMaxAnalyzer {
    fn input_data_size(&self) -> usize {
        BLOCK_SIZE * BLOCK_COUNT
    }

    fn default_result(&self) -> f64 {
        0.0
    }

    fn compute_norm(&self, errors: &[f64]) -> RepairResult<f64> {
        if errors.len() != self.input_data_size() {
            return Err(RepairError::BufferLength {
                expected: self.input_data_size(),
                got: errors.len(),
            });
        }

        let sum: f64 = errors
            .chunks_exact(BLOCK_SIZE)
            .map(|block| block.iter().fold(0.0f64, |max, e| max.max(e.abs())))
            .sum();

        Ok(sum / BLOCK_COUNT as f64)
    }
}
