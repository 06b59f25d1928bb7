//! Candidate patch search
//!
//! For one suspect position, probes a grid of candidate patch geometries
//! (a handful of left-shifted starts crossed with a range of lengths) and
//! regenerates each candidate to measure how well it would fit. The winner
//! minimizes an equal-weight combination of the three quality metrics,
//! min-max normalized across the whole candidate set.

use crate::error::RepairResult;
use crate::fragment::{Fragment, Patch, PatchMetrics};
use crate::regenerator::Regenerator;

/// How far a candidate start may precede the suspect position.
const MAX_LEFT_SHIFT: usize = 10;

/// Candidates per trend window; a length sweep may stop early only once two
/// full windows exist to compare.
const TREND_WINDOW: usize = 5;

/// Residual error level under which the region counts as probably clean.
const CLEAN_ERROR_LEVEL: f64 = 1.5;

/// One probed geometry with its measured quality.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    length: usize,
    metrics: PatchMetrics,
}

/// Search procedure producing the best-fitting patch for a suspect.
#[derive(Clone)]
pub struct PatchMaker {
    regenerator: Regenerator,
}

impl PatchMaker {
    /// Wraps a regenerator.
    pub fn new(regenerator: Regenerator) -> Self {
        Self { regenerator }
    }

    /// Context needed before a suspect position can be searched.
    pub fn input_data_size(&self) -> usize {
        self.regenerator.input_data_size() + MAX_LEFT_SHIFT
    }

    /// Finds the best patch for damage detected at `position`.
    ///
    /// `error_level_at_detection` is stamped onto the returned patch
    /// unchanged; it is the caller's record of why the search ran.
    pub fn make_patch(
        &self,
        position: usize,
        max_length_of_correction: usize,
        error_level_at_detection: f64,
    ) -> RepairResult<Patch> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for left_shift in 0..=MAX_LEFT_SHIFT {
            let start = position - left_shift;

            // A patch that starts before the damage cannot also end before
            // it, so the minimum length grows with the shift.
            let min_length = 1 + left_shift;
            let sweep_base = candidates.len();

            for length in min_length..=max_length_of_correction {
                let mut fragment = Fragment::new(start, length)?;
                let metrics = self.regenerator.restore(&mut fragment)?;
                candidates.push(Candidate {
                    start,
                    length,
                    metrics,
                });

                if sweep_exhausted(&candidates[sweep_base..]) {
                    break;
                }
            }
        }

        let winner = candidates[select_best(&candidates)];

        // Deterministic re-run; cheaper than keeping every probed buffer.
        let mut fragment = Fragment::new(winner.start, winner.length)?;
        let metrics = self.regenerator.restore(&mut fragment)?;

        Ok(Patch::new(fragment, error_level_at_detection, metrics))
    }
}

/// Whether a length sweep may stop: enough candidates tried, neither
/// connection error nor residual error trending down over the last
/// five-vs-previous-five window, and the latest residual already clean.
fn sweep_exhausted(sweep: &[Candidate]) -> bool {
    if sweep.len() < 2 * TREND_WINDOW {
        return false;
    }

    let split = sweep.len() - TREND_WINDOW;
    let (previous, last) = sweep[split - TREND_WINDOW..].split_at(TREND_WINDOW);

    let mean = |window: &[Candidate], f: fn(&PatchMetrics) -> f64| {
        window.iter().map(|c| f(&c.metrics)).sum::<f64>() / window.len() as f64
    };

    let connection_improving = mean(last, |m| m.connection_error)
        < mean(previous, |m| m.connection_error);
    let residual_improving = mean(last, |m| m.error_level_after_end)
        < mean(previous, |m| m.error_level_after_end);

    let latest = sweep[sweep.len() - 1].metrics.error_level_after_end;

    !connection_improving && !residual_improving && latest < CLEAN_ERROR_LEVEL
}

/// Index of the candidate minimizing the combined score. Each metric is
/// min-max normalized over the candidate set; a metric with no spread
/// contributes zero. Ties resolve to the earliest-generated candidate.
fn select_best(candidates: &[Candidate]) -> usize {
    let spread = |f: fn(&PatchMetrics) -> f64| {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for candidate in candidates {
            let value = f(&candidate.metrics);
            if value.is_finite() {
                min = min.min(value);
                max = max.max(value);
            }
        }
        (min, max)
    };

    let metrics: [(fn(&PatchMetrics) -> f64, (f64, f64)); 3] = [
        ((|m| m.error_level_at_start), spread(|m| m.error_level_at_start)),
        ((|m| m.connection_error), spread(|m| m.connection_error)),
        (
            (|m| m.error_level_after_end),
            spread(|m| m.error_level_after_end),
        ),
    ];

    let score = |candidate: &Candidate| -> f64 {
        metrics
            .iter()
            .map(|(f, (min, max))| {
                let value = f(&candidate.metrics);
                if !value.is_finite() {
                    // Degenerate regeneration ranks behind everything.
                    1.0
                } else if max > min {
                    (value - min) / (max - min)
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / 3.0
    };

    let mut best = 0;
    let mut best_score = score(&candidates[0]);

    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let candidate_score = score(candidate);
        if candidate_score < best_score {
            best = index;
            best_score = candidate_score;
        }
    }

    best
}
