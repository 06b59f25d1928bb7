//! Sample regeneration
//!
//! Synthesizes replacement samples for a fragment by extrapolating into it
//! from both sides and cross-fading the two tracks. The forward track is
//! most trustworthy near the fragment start (closest to real preceding
//! context) and degrades toward the end; the backward track is the mirror.
//! The linear cross-fade keeps both boundaries seamless.

use std::sync::Arc;

use crate::detector::DamageDetector;
use crate::error::{RepairError, RepairResult};
use crate::fragment::{Fragment, Patch, PatchMetrics};
use crate::patcher::Patcher;
use crate::predictor::Predictor;

/// Positions past the fragment end probed for residual damage.
const AFTER_END_PROBES: usize = 3;

/// Two-sided autoregressive regenerator.
#[derive(Clone)]
pub struct Regenerator {
    input_patcher: Patcher,
    predictor: Arc<dyn Predictor>,
    detector: DamageDetector,
}

impl Regenerator {
    /// Wires the regenerator to its collaborators.
    pub fn new(input_patcher: Patcher, predictor: Arc<dyn Predictor>, detector: DamageDetector) -> Self {
        Self {
            input_patcher,
            predictor,
            detector,
        }
    }

    /// Context needed on each side of a fragment.
    pub fn input_data_size(&self) -> usize {
        self.predictor.input_data_size()
    }

    /// Fills `fragment` with regenerated samples and reports quality.
    ///
    /// Preceding and succeeding context is read through the patch overlay,
    /// so neighbors repaired earlier feed the extrapolations. Fails when the
    /// fragment does not leave a full context window on its left or the
    /// residual-damage probes on its right.
    pub fn restore(&self, fragment: &mut Fragment) -> RepairResult<PatchMetrics> {
        let history = self.predictor.input_data_size();
        let start = fragment.start_position();
        let length = fragment.len();

        if start < history
            || fragment.end_position() + AFTER_END_PROBES >= self.input_patcher.len()
        {
            return Err(RepairError::OutOfRange {
                position: start,
                length: self.input_patcher.len(),
            });
        }

        let forward = self.forward_track(start, length)?;
        let backward = self.backward_track(start, length)?;

        cross_fade(&forward, &backward, fragment.as_mut_slice());

        self.measure(fragment, &forward, &backward)
    }

    /// Extrapolates left-to-right; samples already predicted in this pass
    /// feed back as if they were real data.
    fn forward_track(&self, start: usize, length: usize) -> RepairResult<Vec<f64>> {
        let history = self.predictor.input_data_size();
        let mut samples = self
            .input_patcher
            .range_at(start - history, history + length, None)?;

        for index in history..samples.len() {
            samples[index] = self
                .predictor
                .predict_forward(&samples[index - history..index])?;
        }

        samples.drain(..history);
        Ok(samples)
    }

    /// Mirror of [`forward_track`], scanning right-to-left.
    ///
    /// [`forward_track`]: Regenerator::forward_track
    fn backward_track(&self, start: usize, length: usize) -> RepairResult<Vec<f64>> {
        let history = self.predictor.input_data_size();
        let mut samples = self.input_patcher.range_at(start, length + history, None)?;

        for index in (0..length).rev() {
            samples[index] = self
                .predictor
                .predict_backward(&samples[index + 1..=index + history])?;
        }

        samples.truncate(length);
        Ok(samples)
    }

    fn measure(
        &self,
        fragment: &Fragment,
        forward: &[f64],
        backward: &[f64],
    ) -> RepairResult<PatchMetrics> {
        // Evaluated as if the candidate were already accepted.
        let candidate = Patch::new(fragment.clone(), 0.0, PatchMetrics::default());
        let extra = Some(&candidate);

        let error_level_at_start = self
            .detector
            .error_level(fragment.start_position(), extra)?;

        let connection_error = forward
            .iter()
            .zip(backward)
            .map(|(f, b)| (f - b).abs())
            .sum::<f64>()
            / forward.len() as f64;

        let mut after_end = 0.0;
        for probe in 1..=AFTER_END_PROBES {
            after_end += self
                .detector
                .error_level(fragment.end_position() + probe, extra)?;
        }
        let error_level_after_end = after_end / AFTER_END_PROBES as f64;

        Ok(PatchMetrics {
            error_level_at_start,
            connection_error,
            error_level_after_end,
        })
    }
}

/// Linear ramp blend: index `i` of `L` weighs the forward track by
/// `1 - i/(L-1)` and the backward track by `i/(L-1)`; a single-sample
/// fragment takes the arithmetic mean.
fn cross_fade(forward: &[f64], backward: &[f64], out: &mut [f64]) {
    let length = out.len();

    if length == 1 {
        out[0] = (forward[0] + backward[0]) / 2.0;
        return;
    }

    let increment = 1.0 / (length - 1) as f64;

    for (index, value) in out.iter_mut().enumerate() {
        let backward_weight = index as f64 * increment;
        let forward_weight = 1.0 - backward_weight;
        *value = forward[index] * forward_weight + backward[index] * backward_weight;
    }
}
