//! Autoregressive sample prediction
//!
//! Fits a Burg all-pole model on a window of samples and extrapolates one
//! sample past either end of the window. Every call retrains from scratch,
//! so predictions are a pure function of the window.

use crate::error::{RepairError, RepairResult};

/// One-sample autoregressive extrapolator.
pub trait Predictor: Send + Sync {
    /// Number of samples consumed per prediction.
    fn input_data_size(&self) -> usize;

    /// Predicts the sample immediately following `samples`.
    ///
    /// Fails unless `samples` is exactly [`input_data_size`] long.
    ///
    /// [`input_data_size`]: Predictor::input_data_size
    fn predict_forward(&self, samples: &[f64]) -> RepairResult<f64>;

    /// Predicts the sample immediately preceding `samples`.
    fn predict_backward(&self, samples: &[f64]) -> RepairResult<f64>;
}

/// Burg-method linear predictor.
///
/// Trains an AR model of order `coefficients_number` on a window of
/// `history_length` samples. Constant and silent windows are tolerated: when
/// a reflection-coefficient denominator collapses the coefficient is zeroed,
/// and any non-finite extrapolation clamps to 0.
#[derive(Debug, Clone)]
pub struct BurgPredictor {
    coefficients_number: usize,
    history_length: usize,
}

impl BurgPredictor {
    /// Creates a predictor with the given AR order and training window.
    pub fn new(coefficients_number: usize, history_length: usize) -> Self {
        Self {
            coefficients_number,
            history_length,
        }
    }

    fn check_window(&self, samples: &[f64]) -> RepairResult<()> {
        if samples.len() != self.history_length {
            return Err(RepairError::BufferLength {
                expected: self.history_length,
                got: samples.len(),
            });
        }
        Ok(())
    }

    /// Burg recursion: returns AR coefficients `c` such that the one-step
    /// forward prediction is `sum(c[j] * x[n - 1 - j])`.
    fn fit(&self, samples: &[f64]) -> Vec<f64> {
        let order = self.coefficients_number;
        let n = samples.len();

        let mut a = vec![0.0f64; order + 1];
        a[0] = 1.0;

        let mut ef = samples.to_vec();
        let mut eb = samples.to_vec();

        for k in 1..=order {
            let mut num = 0.0f64;
            let mut den = 0.0f64;

            for j in k..n {
                num += ef[j] * eb[j - 1];
                den += ef[j] * ef[j] + eb[j - 1] * eb[j - 1];
            }

            let rc = if den > 1e-10 { -2.0 * num / den } else { 0.0 };

            let prev = a.clone();
            for j in 1..=k {
                a[j] = prev[j] + rc * prev[k - j];
            }

            // Descending order keeps eb[j - 1] untouched until it is read.
            for j in (k..n).rev() {
                let ef_old = ef[j];
                ef[j] = ef_old + rc * eb[j - 1];
                eb[j] = eb[j - 1] + rc * ef_old;
            }
        }

        (0..order).map(|i| -a[i + 1]).collect()
    }

    fn extrapolate(&self, samples: &[f64]) -> f64 {
        let coeffs = self.fit(samples);
        let n = samples.len();

        let prediction: f64 = coeffs
            .iter()
            .enumerate()
            .map(|(lag, c)| c * samples[n - 1 - lag])
            .sum();

        if prediction.is_finite() {
            prediction
        } else {
            0.0
        }
    }
}

impl Predictor for BurgPredictor {
    fn input_data_size(&self) -> usize {
        self.history_length
    }

    fn predict_forward(&self, samples: &[f64]) -> RepairResult<f64> {
        self.check_window(samples)?;
        Ok(self.extrapolate(samples))
    }

    fn predict_backward(&self, samples: &[f64]) -> RepairResult<f64> {
        self.check_window(samples)?;
        let reversed: Vec<f64> = samples.iter().rev().copied().collect();
        Ok(self.extrapolate(&reversed))
    }
}
