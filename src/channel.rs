//! Public channel facade
//!
//! One [`Channel`] owns the immutable samples of a single audio channel,
//! runs scans over them and exposes the accepted patches to the host:
//! enumeration, point lookup, patched output reads and the reviewer
//! operations (approval toggling and patch resizing).

use std::sync::Arc;

use crate::error::{RepairError, RepairResult};
use crate::fragment::{Fragment, Patch};
use crate::report::ScanReporter;
use crate::scanner::{ScanState, Scanner};
use crate::ProcessingSettings;

/// A single audio channel with its repair state.
///
/// Channels are repaired fully independently; hosts de-interleave their
/// audio and construct one `Channel` per stream.
pub struct Channel {
    scanner: Scanner,
}

impl Channel {
    /// Wraps one channel of samples. Settings are validated here and stay
    /// fixed for the channel's lifetime.
    pub fn new(samples: Vec<f64>, settings: ProcessingSettings) -> RepairResult<Self> {
        Ok(Self {
            scanner: Scanner::new(Arc::new(samples), settings)?,
        })
    }

    /// Detects and repairs damage across the whole channel.
    ///
    /// Synchronous; hosts needing a non-blocking scan run it on their own
    /// worker. Re-running clears all previous patches and repeats detection
    /// and restoration (prediction errors are reused).
    pub fn scan(&mut self, reporter: &dyn ScanReporter) -> RepairResult<()> {
        self.scanner.scan(reporter)
    }

    /// Channel length in samples.
    pub fn len_samples(&self) -> usize {
        self.scanner.input().len()
    }

    /// Whether prediction errors have been computed.
    pub fn is_preprocessed(&self) -> bool {
        self.scanner.state() != ScanState::Fresh
    }

    /// The settings this channel was created with.
    pub fn settings(&self) -> &ProcessingSettings {
        self.scanner.settings()
    }

    /// Number of accepted patches.
    pub fn patch_count(&self) -> usize {
        self.scanner.collection().len()
    }

    /// All accepted patches ordered by start position.
    pub fn patches(&self) -> Vec<Arc<Patch>> {
        self.scanner.collection().sorted_patches()
    }

    /// The patch covering `position`, if any.
    pub fn patch_at(&self, position: usize) -> Option<Arc<Patch>> {
        self.scanner.collection().patch_at(position)
    }

    /// Raw input sample at `position`.
    pub fn input_sample(&self, position: usize) -> RepairResult<f64> {
        let input = self.scanner.input();
        input
            .get(position)
            .copied()
            .ok_or(RepairError::OutOfRange {
                position,
                length: input.len(),
            })
    }

    /// Post-repair sample at `position`.
    ///
    /// A patch the reviewer has unapproved reads through to the raw input.
    pub fn output_sample(&self, position: usize) -> RepairResult<f64> {
        match self.scanner.collection().patch_at(position) {
            Some(patch) if patch.is_approved() => Ok(patch.value_at(position)),
            _ => self.input_sample(position),
        }
    }

    /// Materializes the whole repaired channel.
    pub fn output(&self) -> Vec<f64> {
        (0..self.len_samples())
            .map(|position| match self.scanner.collection().patch_at(position) {
                Some(patch) if patch.is_approved() => patch.value_at(position),
                _ => self.scanner.input()[position],
            })
            .collect()
    }

    /// Prediction error at `position` (patched positions read zero).
    ///
    /// Fails until the first scan has computed prediction errors.
    pub fn prediction_error(&self, position: usize) -> RepairResult<f64> {
        let patcher = self
            .scanner
            .err_patcher()
            .ok_or(RepairError::NotPreprocessed)?;
        patcher.value_at(position, None)
    }

    /// Flips approval of the patch starting at `start`; returns the new
    /// state.
    pub fn toggle_approved(&self, start: usize) -> RepairResult<bool> {
        let patch = self
            .scanner
            .collection()
            .patch_at(start)
            .filter(|p| p.start_position() == start)
            .ok_or(RepairError::PatchNotFound { start })?;
        Ok(patch.toggle_approved())
    }

    /// Grows the patch starting at `start` one sample to the left.
    pub fn expand_left(&self, start: usize) -> RepairResult<Arc<Patch>> {
        let (start, length) = self.patch_geometry(start)?;
        let new_start = start.checked_sub(1).ok_or(RepairError::OutOfRange {
            position: start,
            length: self.len_samples(),
        })?;
        self.resize_patch(start, new_start, length + 1)
    }

    /// Shrinks the patch starting at `start` one sample from the left.
    pub fn shrink_left(&self, start: usize) -> RepairResult<Arc<Patch>> {
        let (start, length) = self.patch_geometry(start)?;
        self.resize_patch(start, start + 1, length.saturating_sub(1))
    }

    /// Grows the patch starting at `start` one sample to the right.
    pub fn expand_right(&self, start: usize) -> RepairResult<Arc<Patch>> {
        let (start, length) = self.patch_geometry(start)?;
        self.resize_patch(start, start, length + 1)
    }

    /// Shrinks the patch starting at `start` one sample from the right.
    pub fn shrink_right(&self, start: usize) -> RepairResult<Arc<Patch>> {
        let (start, length) = self.patch_geometry(start)?;
        self.resize_patch(start, start, length.saturating_sub(1))
    }

    /// Moves the patch starting at `start` to a new geometry, regenerating
    /// its content and quality metrics synchronously.
    ///
    /// On any failure the original patch stays in the collection untouched.
    pub fn resize_patch(
        &self,
        start: usize,
        new_start: usize,
        new_length: usize,
    ) -> RepairResult<Arc<Patch>> {
        let regenerator = self
            .scanner
            .regenerator()
            .ok_or(RepairError::NotPreprocessed)?;

        if new_length == 0 {
            return Err(RepairError::ZeroLengthFragment { start: new_start });
        }

        let old = self
            .scanner
            .collection()
            .remove(start)
            .ok_or(RepairError::PatchNotFound { start })?;

        // The old patch is out of the collection, so regeneration reads its
        // neighborhood without the stale content.
        let result = Fragment::new(new_start, new_length).and_then(|mut fragment| {
            let metrics = regenerator.restore(&mut fragment)?;
            Ok(Patch::new(
                fragment,
                old.error_level_at_detection(),
                metrics,
            ))
        });

        let new_patch = match result {
            Ok(patch) => {
                patch.set_approved(old.is_approved());
                Arc::new(patch)
            }
            Err(error) => {
                self.scanner.collection().insert(old)?;
                return Err(error);
            }
        };

        // Insert can still fail when the new geometry runs into a neighbor.
        if let Err(error) = self.scanner.collection().insert(Arc::clone(&new_patch)) {
            self.scanner.collection().insert(old)?;
            return Err(error);
        }
        Ok(new_patch)
    }

    fn patch_geometry(&self, start: usize) -> RepairResult<(usize, usize)> {
        let patch = self
            .scanner
            .collection()
            .patch_at(start)
            .filter(|p| p.start_position() == start)
            .ok_or(RepairError::PatchNotFound { start })?;
        Ok((patch.start_position(), patch.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullReporter;

    #[test]
    fn samples_read_back_raw_before_any_scan() {
        let samples: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let channel = Channel::new(samples, ProcessingSettings::default()).unwrap();

        assert_eq!(channel.len_samples(), 100);
        assert!(!channel.is_preprocessed());
        assert_eq!(channel.input_sample(42).unwrap(), 42.0);
        assert_eq!(channel.output_sample(42).unwrap(), 42.0);
        assert!(channel.input_sample(100).is_err());
        assert!(channel.prediction_error(42).is_err());
    }

    #[test]
    fn patch_operations_require_a_patch() {
        let mut channel =
            Channel::new(vec![0.0; 2000], ProcessingSettings::default()).unwrap();
        channel.scan(&NullReporter).unwrap();

        assert!(matches!(
            channel.toggle_approved(10),
            Err(RepairError::PatchNotFound { start: 10 })
        ));
        assert!(matches!(
            channel.expand_right(10),
            Err(RepairError::PatchNotFound { start: 10 })
        ));
    }
}
