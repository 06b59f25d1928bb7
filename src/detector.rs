//! Damaged sample detection
//!
//! Error level of a position = |actual prediction error| / normal error,
//! where the normal error is estimated from the prediction errors just
//! before the position. Both reads go through the patch overlays, so
//! detection near an accepted repair sees repaired data, never the raw
//! damage.

use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::error::{RepairError, RepairResult};
use crate::fragment::Patch;
use crate::patcher::Patcher;
use crate::predictor::Predictor;

/// Error-level calculator combining predictor, analyzer and patch overlays.
#[derive(Clone)]
pub struct DamageDetector {
    prediction_err_patcher: Patcher,
    input_patcher: Patcher,
    analyzer: Arc<dyn Analyzer>,
    predictor: Arc<dyn Predictor>,
}

impl DamageDetector {
    /// Wires the detector to its collaborators.
    pub fn new(
        prediction_err_patcher: Patcher,
        input_patcher: Patcher,
        analyzer: Arc<dyn Analyzer>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            prediction_err_patcher,
            input_patcher,
            analyzer,
            predictor,
        }
    }

    /// History the detection sweep leaves before its first evaluation.
    pub fn input_data_size(&self) -> usize {
        self.predictor.input_data_size() + self.analyzer.input_data_size()
    }

    /// Error level at `position`, optionally as if `extra` were accepted.
    ///
    /// Fails when either the error window or the sample window would reach
    /// before the channel start; sweeping callers skip such positions.
    pub fn error_level(&self, position: usize, extra: Option<&Patch>) -> RepairResult<f64> {
        let needed = self
            .predictor
            .input_data_size()
            .max(self.analyzer.input_data_size());
        if position < needed {
            return Err(RepairError::OutOfRange {
                position,
                length: self.input_patcher.len(),
            });
        }

        let norm_size = self.analyzer.input_data_size();
        let errors = self
            .prediction_err_patcher
            .range_at(position - norm_size, norm_size, extra)?;
        let normal_error = self.analyzer.compute_norm(&errors)?;

        let history = self.predictor.input_data_size();
        let window = self
            .input_patcher
            .range_at(position - history, history, extra)?;

        let error_at_position = (self.predictor.predict_forward(&window)?
            - self.input_patcher.value_at(position, extra)?)
        .abs();

        Ok(error_at_position / normal_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PatchCollection;
    use crate::fragment::{Fragment, PatchMetrics};
    use approx::assert_abs_diff_eq;

    /// Predictor stub: always predicts zero, window of 8.
    struct ZeroPredictor;

    impl Predictor for ZeroPredictor {
        fn input_data_size(&self) -> usize {
            8
        }

        fn predict_forward(&self, samples: &[f64]) -> RepairResult<f64> {
            assert_eq!(samples.len(), 8);
            Ok(0.0)
        }

        fn predict_backward(&self, samples: &[f64]) -> RepairResult<f64> {
            assert_eq!(samples.len(), 8);
            Ok(0.0)
        }
    }

    /// Analyzer stub: fixed norm, window of 4.
    struct FixedNorm(f64);

    impl Analyzer for FixedNorm {
        fn input_data_size(&self) -> usize {
            4
        }

        fn default_result(&self) -> f64 {
            0.0
        }

        fn compute_norm(&self, errors: &[f64]) -> RepairResult<f64> {
            assert_eq!(errors.len(), 4);
            Ok(self.0)
        }
    }

    fn detector_over(input: Vec<f64>, norm: f64) -> DamageDetector {
        let collection = Arc::new(PatchCollection::new());
        let len = input.len();
        let input = Arc::new(input);
        let errors = Arc::new(vec![0.0; len]);

        DamageDetector::new(
            Patcher::for_prediction_errors(errors, Arc::clone(&collection)),
            Patcher::for_samples(input, collection),
            Arc::new(FixedNorm(norm)),
            Arc::new(ZeroPredictor),
        )
    }

    #[test]
    fn input_data_size_sums_collaborators() {
        let detector = detector_over(vec![0.0; 64], 1.0);
        assert_eq!(detector.input_data_size(), 12);
    }

    #[test]
    fn error_level_is_actual_over_norm() {
        let mut input = vec![0.0; 64];
        input[20] = 6.0;
        let detector = detector_over(input, 2.0);

        // Prediction is 0, actual is 6, norm is 2.
        assert_abs_diff_eq!(detector.error_level(20, None).unwrap(), 3.0);
        assert_abs_diff_eq!(detector.error_level(21, None).unwrap(), 0.0);
    }

    #[test]
    fn extra_patch_masks_the_damage() {
        let mut input = vec![0.0; 64];
        input[20] = 6.0;
        let detector = detector_over(input, 2.0);

        let patch = Patch::new(Fragment::new(20, 1).unwrap(), 0.0, PatchMetrics::default());
        assert_abs_diff_eq!(detector.error_level(20, Some(&patch)).unwrap(), 0.0);
    }

    #[test]
    fn insufficient_history_is_rejected() {
        let detector = detector_over(vec![0.0; 64], 1.0);
        assert!(matches!(
            detector.error_level(7, None),
            Err(RepairError::OutOfRange { position: 7, .. })
        ));
        // One predictor window of history is enough for a point evaluation.
        assert!(detector.error_level(8, None).is_ok());
    }
}
