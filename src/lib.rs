//! Autoregressive click detection and repair
//!
//! Detects and repairs localized digital-audio damage: short runs of
//! samples that deviate sharply from the signal's local autoregressive
//! behavior.
//!
//! ## Pipeline
//! - Burg linear predictor trained per position
//! - Averaged block-maximum error normalization
//! - Error-level damage detection over the patched view of the channel
//! - Candidate patch search across shifted starts and swept lengths
//! - Two-sided autoregressive regeneration with a cross-fade blend
//!
//! ## Operation
//! A [`Channel`] owns one stream of samples and scans it in three parallel
//! fork-join stages (preparation, detection, restoration). Accepted repairs
//! land in a patch collection with `O(log n)` interval queries once the scan
//! finalizes; every read near a previous repair sees already-patched
//! samples, never the raw damage. Reviewer hosts can toggle and resize
//! individual patches afterwards, each resize regenerating content and
//! quality metrics synchronously.
//!
//! File I/O, channel de-interleaving and review UIs are hosts' concerns;
//! this crate only ever sees one channel of `f64` samples.

#![warn(missing_docs)]

pub mod analyzer;
pub mod channel;
pub mod collection;
pub mod detector;
pub mod fragment;
pub mod patch_maker;
pub mod patcher;
pub mod predictor;
pub mod regenerator;
pub mod report;

mod error;
mod scanner;

pub use analyzer::{Analyzer, AveragedMaxAnalyzer};
pub use channel::Channel;
pub use collection::PatchCollection;
pub use error::{RepairError, RepairResult};
pub use fragment::{Fragment, Patch, PatchMetrics, MINIMAL_PREDICTION_ERROR};
pub use patcher::Patcher;
pub use predictor::{BurgPredictor, Predictor};
pub use report::{NullReporter, ScanReporter};
pub use scanner::ScanState;

use serde::{Deserialize, Serialize};

/// Per-channel processing configuration.
///
/// Immutable for the duration of a scan; create a new [`Channel`] to change
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Samples the predictor trains on per prediction.
    pub history_length_samples: usize,
    /// Autoregressive model order.
    pub coefficients_number: usize,
    /// Error level above which a position counts as damaged.
    pub threshold_for_detection: f64,
    /// Upper bound on the length of one repair.
    pub max_length_of_correction: usize,
    /// Sample rate in Hz; metadata only, -1 when unset.
    pub sample_rate: i32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            history_length_samples: 512,
            coefficients_number: 4,
            threshold_for_detection: 7.0,
            max_length_of_correction: 150,
            sample_rate: -1,
        }
    }
}

impl ProcessingSettings {
    /// Checks the settings describe a runnable scan.
    pub fn validate(&self) -> RepairResult<()> {
        if self.history_length_samples == 0 {
            return Err(RepairError::InvalidSettings(
                "history length must be at least one sample".into(),
            ));
        }
        if self.coefficients_number == 0 {
            return Err(RepairError::InvalidSettings(
                "AR model needs at least one coefficient".into(),
            ));
        }
        if self.coefficients_number >= self.history_length_samples {
            return Err(RepairError::InvalidSettings(format!(
                "AR order {} does not fit history of {} samples",
                self.coefficients_number, self.history_length_samples
            )));
        }
        if !(self.threshold_for_detection > 0.0) {
            return Err(RepairError::InvalidSettings(
                "detection threshold must be positive".into(),
            ));
        }
        if self.max_length_of_correction == 0 {
            return Err(RepairError::InvalidSettings(
                "max correction length must be at least one sample".into(),
            ));
        }
        Ok(())
    }
}
