//! Channel scan orchestration
//!
//! Drives one channel through the three scan stages, each a rayon fork-join
//! over disjoint position ranges with a full barrier between stages:
//!
//! 1. **Preparation**: prediction error for every position, computed from
//!    raw input only (no patch can exist yet, so chunks are independent).
//! 2. **Detection**: error-level sweep collecting suspect positions.
//! 3. **Restoration**: one worker per suspect group; each worker repairs
//!    sequentially with worker-local tools so its own patches are visible
//!    to every later read, then the local results are merged, sorted and
//!    finalized.
//!
//! Re-running a scan keeps the prediction errors (they depend on raw input
//! only) but clears all patches and redoes detection and restoration.

use std::sync::Arc;

use rayon::prelude::*;

use crate::analyzer::{Analyzer, AveragedMaxAnalyzer};
use crate::collection::PatchCollection;
use crate::detector::DamageDetector;
use crate::error::{RepairError, RepairResult};
use crate::fragment::Patch;
use crate::patch_maker::PatchMaker;
use crate::patcher::Patcher;
use crate::predictor::{BurgPredictor, Predictor};
use crate::regenerator::Regenerator;
use crate::report::ScanReporter;
use crate::ProcessingSettings;

/// Positions between progress reports.
const PROGRESS_THROTTLE: usize = 1000;

/// Scan progress of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No prediction errors computed yet.
    Fresh,
    /// Prediction errors ready, no accepted patches.
    Preprocessed,
    /// Detection and restoration complete, collection finalized.
    Scanned,
}

/// A position flagged by the detection stage.
#[derive(Debug, Clone, Copy)]
struct Suspect {
    position: usize,
    /// How far past the position follow-up scanning extends.
    skip: usize,
    error_level: f64,
}

/// Everything the restoration stages need, wired over one patch collection.
///
/// The scanner owns one set over the channel's main collection; every
/// restoration worker builds its own set over a worker-local collection.
struct Stages {
    prediction_err: Arc<Vec<f64>>,
    err_patcher: Patcher,
    detector: DamageDetector,
    regenerator: Regenerator,
    patch_maker: PatchMaker,
}

impl Stages {
    fn new(
        input: Arc<Vec<f64>>,
        prediction_err: Arc<Vec<f64>>,
        collection: Arc<PatchCollection>,
        predictor: Arc<dyn Predictor>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let input_patcher = Patcher::for_samples(input, Arc::clone(&collection));
        let err_patcher = Patcher::for_prediction_errors(Arc::clone(&prediction_err), collection);

        let detector = DamageDetector::new(
            err_patcher.clone(),
            input_patcher.clone(),
            analyzer,
            Arc::clone(&predictor),
        );
        let regenerator = Regenerator::new(input_patcher, predictor, detector.clone());
        let patch_maker = PatchMaker::new(regenerator.clone());

        Self {
            prediction_err,
            err_patcher,
            detector,
            regenerator,
            patch_maker,
        }
    }
}

/// One channel's scan pipeline and its accumulated state.
pub(crate) struct Scanner {
    input: Arc<Vec<f64>>,
    settings: ProcessingSettings,
    collection: Arc<PatchCollection>,
    predictor: Arc<dyn Predictor>,
    analyzer: Arc<dyn Analyzer>,
    stages: Option<Stages>,
    state: ScanState,
}

impl Scanner {
    pub(crate) fn new(input: Arc<Vec<f64>>, settings: ProcessingSettings) -> RepairResult<Self> {
        settings.validate()?;

        let collection = Arc::new(PatchCollection::new());
        let predictor: Arc<dyn Predictor> = Arc::new(BurgPredictor::new(
            settings.coefficients_number,
            settings.history_length_samples,
        ));
        let analyzer: Arc<dyn Analyzer> = Arc::new(AveragedMaxAnalyzer::new());

        Ok(Self {
            input,
            settings,
            collection,
            predictor,
            analyzer,
            stages: None,
            state: ScanState::Fresh,
        })
    }

    pub(crate) fn input(&self) -> &Arc<Vec<f64>> {
        &self.input
    }

    pub(crate) fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    pub(crate) fn collection(&self) -> &Arc<PatchCollection> {
        &self.collection
    }

    pub(crate) fn state(&self) -> ScanState {
        self.state
    }

    pub(crate) fn err_patcher(&self) -> Option<&Patcher> {
        self.stages.as_ref().map(|s| &s.err_patcher)
    }

    pub(crate) fn regenerator(&self) -> Option<&Regenerator> {
        self.stages.as_ref().map(|s| &s.regenerator)
    }

    /// Runs one full scan; re-entrant from the `Scanned` state.
    pub(crate) fn scan(&mut self, reporter: &dyn ScanReporter) -> RepairResult<()> {
        if self.stages.is_none() {
            self.prepare(reporter)?;
        }

        self.collection.clear();

        let suspects = self.detect(reporter)?;
        log::debug!("detection found {} suspects", suspects.len());

        if !suspects.is_empty() {
            self.restore_all(&suspects, reporter)?;
        }

        self.collection.finalize()?;
        self.state = ScanState::Scanned;
        log::info!(
            "scan complete: {} patches over {} samples",
            self.collection.len(),
            self.input.len()
        );

        reporter.phase("");
        reporter.progress(100.0);
        Ok(())
    }

    /// `Fresh -> Preprocessed`: prediction errors over the whole channel.
    fn prepare(&mut self, reporter: &dyn ScanReporter) -> RepairResult<()> {
        reporter.phase("Preparation");
        reporter.progress(0.0);

        let history = self.predictor.input_data_size();
        let len = self.input.len();
        let mut errors = vec![0.0f64; len];

        if history < len {
            let workers = rayon::current_num_threads().max(1);
            let chunk = ((len - history) / workers).max(history);
            let input = &self.input;
            let predictor = &self.predictor;

            errors[history..]
                .par_chunks_mut(chunk)
                .enumerate()
                .try_for_each(|(chunk_index, out)| -> RepairResult<()> {
                    let base = history + chunk_index * chunk;
                    let total = out.len();

                    for (offset, error) in out.iter_mut().enumerate() {
                        let position = base + offset;
                        // Raw input only; no patch exists before the first
                        // scan, so chunks stay independent.
                        let window = &input[position - history..position];
                        *error = input[position] - predictor.predict_forward(window)?;

                        if chunk_index == 0 && position % PROGRESS_THROTTLE == 0 {
                            reporter.progress(100.0 * offset as f64 / total as f64);
                        }
                    }

                    Ok(())
                })?;
        }

        self.stages = Some(Stages::new(
            Arc::clone(&self.input),
            Arc::new(errors),
            Arc::clone(&self.collection),
            Arc::clone(&self.predictor),
            Arc::clone(&self.analyzer),
        ));
        self.state = ScanState::Preprocessed;

        reporter.progress(100.0);
        Ok(())
    }

    /// Bounds of the position range the detection stage may evaluate.
    fn detection_bounds(&self, stages: &Stages) -> (usize, usize) {
        let start = stages
            .patch_maker
            .input_data_size()
            .max(stages.detector.input_data_size());
        let end = self.input.len().saturating_sub(
            stages.patch_maker.input_data_size() + self.settings.max_length_of_correction,
        );
        (start, end)
    }

    /// Detection stage: parallel error-level sweep.
    fn detect(&self, reporter: &dyn ScanReporter) -> RepairResult<Vec<Suspect>> {
        reporter.phase("Detection");
        reporter.progress(0.0);

        let stages = self.stages.as_ref().ok_or(RepairError::NotPreprocessed)?;
        let (start, end) = self.detection_bounds(stages);

        if start >= end {
            reporter.progress(100.0);
            return Ok(Vec::new());
        }

        let skip = self.settings.max_length_of_correction + stages.detector.input_data_size();
        let threshold = self.settings.threshold_for_detection;
        let workers = rayon::current_num_threads().max(1);
        let ranges = split_range(start, end, workers);

        let per_chunk: Vec<Vec<Suspect>> = ranges
            .into_par_iter()
            .enumerate()
            .map(|(chunk_index, (from, to))| -> RepairResult<Vec<Suspect>> {
                let mut suspects = Vec::new();
                let mut position = from;

                while position < to {
                    let error_level = stages.detector.error_level(position, None)?;

                    if error_level > threshold {
                        suspects.push(Suspect {
                            position,
                            skip,
                            error_level,
                        });
                        // One suspect per damage run; follow-up damage is
                        // found again during restoration.
                        position += skip;
                    } else {
                        position += 1;
                    }

                    if chunk_index == 0 && position % PROGRESS_THROTTLE == 0 {
                        reporter.progress(100.0 * (position - from) as f64 / (to - from) as f64);
                    }
                }

                Ok(suspects)
            })
            .collect::<RepairResult<_>>()?;

        let mut suspects: Vec<Suspect> = per_chunk.into_iter().flatten().collect();
        suspects.sort_unstable_by_key(|s| s.position);

        // Chunk boundaries ignore the skip-ahead of the previous chunk;
        // dropping suspects inside an earlier suspect's window restores the
        // single-flag-per-run rule and makes the output deterministic.
        let mut deduped: Vec<Suspect> = Vec::with_capacity(suspects.len());
        for suspect in suspects {
            match deduped.last() {
                Some(last) if suspect.position < last.position + last.skip => {}
                _ => deduped.push(suspect),
            }
        }

        reporter.progress(100.0);
        Ok(deduped)
    }

    /// Restoration stage: parallel over suspects, sequential per suspect.
    fn restore_all(&self, suspects: &[Suspect], reporter: &dyn ScanReporter) -> RepairResult<()> {
        reporter.phase("Restoration");
        reporter.progress(0.0);

        let stages = self.stages.as_ref().ok_or(RepairError::NotPreprocessed)?;
        let (_, detect_end) = self.detection_bounds(stages);
        let workers = rayon::current_num_threads().max(1);
        let per_worker = suspects.len().div_ceil(workers);

        let per_chunk: Vec<Vec<Arc<Patch>>> = suspects
            .par_chunks(per_worker)
            .enumerate()
            .map(|(chunk_index, group)| -> RepairResult<Vec<Arc<Patch>>> {
                // Worker-local collection: this worker's accepted patches
                // must be visible to its own later reads.
                let local = Arc::new(PatchCollection::new());
                let tools = Stages::new(
                    Arc::clone(&self.input),
                    Arc::clone(&stages.prediction_err),
                    Arc::clone(&local),
                    Arc::clone(&self.predictor),
                    Arc::clone(&self.analyzer),
                );

                for (index, suspect) in group.iter().enumerate() {
                    self.check_suspect(&tools, &local, suspect, detect_end)?;

                    if chunk_index == 0 {
                        reporter.progress(100.0 * index as f64 / group.len() as f64);
                    }
                }

                Ok(local.sorted_patches())
            })
            .collect::<RepairResult<_>>()?;

        let mut patches: Vec<Arc<Patch>> = per_chunk.into_iter().flatten().collect();
        patches.sort_unstable_by_key(|p| (p.start_position(), p.len()));

        // Workers cannot see each other's patches, so two adjacent suspect
        // groups can occasionally repair overlapping runs. First one wins.
        let mut last_end: Option<usize> = None;
        for patch in patches {
            if last_end.is_some_and(|end| patch.start_position() <= end) {
                log::warn!(
                    "dropping overlapping patch at {} (length {})",
                    patch.start_position(),
                    patch.len()
                );
                continue;
            }
            last_end = Some(patch.end_position());
            self.collection.insert(patch)?;
        }

        reporter.progress(100.0);
        Ok(())
    }

    /// Repairs one suspect, then re-scans downstream for damage runs longer
    /// than a single patch, extending the window when more damage appears.
    fn check_suspect(
        &self,
        tools: &Stages,
        local: &Arc<PatchCollection>,
        suspect: &Suspect,
        detect_end: usize,
    ) -> RepairResult<()> {
        let max_length = self.settings.max_length_of_correction;
        let threshold = self.settings.threshold_for_detection;

        let first = Arc::new(tools.patch_maker.make_patch(
            suspect.position,
            max_length,
            suspect.error_level,
        )?);
        let mut position = first.end_position() + 1;
        local.insert(first)?;

        let mut end = suspect.position + suspect.skip;

        while position < end.min(detect_end) {
            let error_level = tools.detector.error_level(position, None)?;

            if error_level > threshold {
                let patch = Arc::new(tools.patch_maker.make_patch(
                    position,
                    max_length,
                    suspect.error_level,
                )?);
                end = end.max(patch.start_position() + suspect.skip);
                position = patch.end_position() + 1;
                local.insert(patch)?;
            } else {
                position += 1;
            }
        }

        Ok(())
    }
}

/// Splits `[start, end)` into up to `parts` contiguous ranges.
fn split_range(start: usize, end: usize, parts: usize) -> Vec<(usize, usize)> {
    let span = end - start;
    let size = span.div_ceil(parts).max(1);

    (0..span.div_ceil(size))
        .map(|i| {
            let from = start + i * size;
            (from, (from + size).min(end))
        })
        .collect()
}
