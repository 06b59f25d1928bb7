//! Read-through patch overlay
//!
//! Presents an immutable sample array with every accepted repair applied on
//! read. The same overlay serves two arrays: the input samples (patched
//! positions read the regenerated values) and the prediction-error array
//! (patched positions read [`MINIMAL_PREDICTION_ERROR`]). The optional
//! extra patch lets the detector evaluate a candidate repair as if it were
//! accepted, without touching the collection; the patch maker's search
//! depends on that speculative read.

use std::sync::Arc;

use crate::collection::PatchCollection;
use crate::error::{RepairError, RepairResult};
use crate::fragment::{Patch, MINIMAL_PREDICTION_ERROR};

/// Maps a covering patch and an absolute position to the overlay value.
pub type PatchValueFn = fn(&Patch, usize) -> f64;

fn patched_sample(patch: &Patch, position: usize) -> f64 {
    patch.value_at(position)
}

fn patched_error(_patch: &Patch, _position: usize) -> f64 {
    MINIMAL_PREDICTION_ERROR
}

/// Pure read-through decorator over an immutable array.
///
/// Stateless per call and cheap to clone; safe to share across scan workers.
#[derive(Clone)]
pub struct Patcher {
    source: Arc<Vec<f64>>,
    patches: Arc<PatchCollection>,
    value_fn: PatchValueFn,
}

impl Patcher {
    /// Overlay with an explicit value function.
    pub fn new(source: Arc<Vec<f64>>, patches: Arc<PatchCollection>, value_fn: PatchValueFn) -> Self {
        Self {
            source,
            patches,
            value_fn,
        }
    }

    /// Overlay for input samples: patched positions read the repair.
    pub fn for_samples(source: Arc<Vec<f64>>, patches: Arc<PatchCollection>) -> Self {
        Self::new(source, patches, patched_sample)
    }

    /// Overlay for prediction errors: patched positions read
    /// [`MINIMAL_PREDICTION_ERROR`].
    pub fn for_prediction_errors(source: Arc<Vec<f64>>, patches: Arc<PatchCollection>) -> Self {
        Self::new(source, patches, patched_error)
    }

    /// Length of the underlying array.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Whether the underlying array is empty.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Value at `position`, patched if a patch (or `extra`) covers it.
    ///
    /// `extra` wins over collection patches.
    pub fn value_at(&self, position: usize, extra: Option<&Patch>) -> RepairResult<f64> {
        if position >= self.source.len() {
            return Err(RepairError::OutOfRange {
                position,
                length: self.source.len(),
            });
        }

        if let Some(extra) = extra {
            if extra.covers(position) {
                return Ok((self.value_fn)(extra, position));
            }
        }

        Ok(match self.patches.patch_at(position) {
            Some(patch) => (self.value_fn)(&patch, position),
            None => self.source[position],
        })
    }

    /// Materializes `[start, start + length - 1]` with every covering patch
    /// (and `extra`, applied last) written over the raw values.
    ///
    /// Cost is `O(length + overlapping patches)`.
    pub fn range_at(
        &self,
        start: usize,
        length: usize,
        extra: Option<&Patch>,
    ) -> RepairResult<Vec<f64>> {
        let Some(end) = start.checked_add(length).and_then(|e| e.checked_sub(1)) else {
            return Err(RepairError::OutOfRange {
                position: start,
                length: self.source.len(),
            });
        };

        if length == 0 || end >= self.source.len() {
            return Err(RepairError::OutOfRange {
                position: end.max(start),
                length: self.source.len(),
            });
        }

        let mut range = self.source[start..=end].to_vec();

        for patch in self.patches.patches_for_range(start, end) {
            self.overlay(&mut range, start, end, &patch);
        }

        if let Some(extra) = extra {
            self.overlay(&mut range, start, end, extra);
        }

        Ok(range)
    }

    fn overlay(&self, range: &mut [f64], start: usize, end: usize, patch: &Patch) {
        let from = patch.start_position().max(start);
        let to = patch.end_position().min(end);

        for position in from..=to {
            range[position - start] = (self.value_fn)(patch, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{Fragment, PatchMetrics};

    const TEST_LEN: usize = 1000;

    fn index_valued_patcher(patches: Arc<PatchCollection>) -> Patcher {
        let source: Vec<f64> = (0..TEST_LEN).map(|i| i as f64).collect();
        Patcher::for_samples(Arc::new(source), patches)
    }

    /// Patch whose samples are the sign-flipped source values.
    fn sign_flip_patch(start: usize, length: usize) -> Arc<Patch> {
        let data = (start..start + length).map(|p| -(p as f64)).collect();
        let fragment = Fragment::from_data(start, data).unwrap();
        Arc::new(Patch::new(fragment, 0.0, PatchMetrics::default()))
    }

    fn assert_overlay(patcher: &Patcher, range_start: usize, range_len: usize, covered: &[Arc<Patch>]) {
        let range = patcher.range_at(range_start, range_len, None).unwrap();

        for position in range_start..range_start + range_len {
            let patched = covered.iter().any(|p| p.covers(position));
            let expected = if patched {
                -(position as f64)
            } else {
                position as f64
            };
            assert_eq!(range[position - range_start], expected, "position {position}");
        }
    }

    #[test]
    fn single_patch_overlay_geometries() {
        // (patch start, patch length) against the range [100, 199]:
        // fully left, clipping the start, inside, clipping the end,
        // fully right, covering the whole range.
        for (patch_start, patch_len) in [(45, 10), (95, 10), (145, 10), (195, 10), (245, 10), (95, 110)] {
            let collection = Arc::new(PatchCollection::new());
            let patch = sign_flip_patch(patch_start, patch_len);
            collection.insert(Arc::clone(&patch)).unwrap();

            let patcher = index_valued_patcher(collection);
            assert_overlay(&patcher, 100, 100, &[patch]);
        }
    }

    #[test]
    fn two_patch_overlay() {
        let collection = Arc::new(PatchCollection::new());
        let first = sign_flip_patch(110, 10);
        let second = sign_flip_patch(150, 10);
        collection.insert(Arc::clone(&first)).unwrap();
        collection.insert(Arc::clone(&second)).unwrap();

        let patcher = index_valued_patcher(collection);
        assert_overlay(&patcher, 100, 100, &[first, second]);
    }

    #[test]
    fn extra_patch_applies_without_insertion() {
        let collection = Arc::new(PatchCollection::new());
        let patcher = index_valued_patcher(Arc::clone(&collection));
        let extra = sign_flip_patch(120, 5);

        let range = patcher.range_at(100, 50, Some(&extra)).unwrap();
        assert_eq!(range[20], -120.0);
        assert_eq!(range[25], 125.0);
        assert!(collection.is_empty());

        assert_eq!(patcher.value_at(121, Some(&extra)).unwrap(), -121.0);
        assert_eq!(patcher.value_at(121, None).unwrap(), 121.0);
    }

    #[test]
    fn value_at_prefers_patch_over_source() {
        let collection = Arc::new(PatchCollection::new());
        collection.insert(sign_flip_patch(42, 1)).unwrap();
        let patcher = index_valued_patcher(collection);

        assert_eq!(patcher.value_at(42, None).unwrap(), -42.0);
        assert_eq!(patcher.value_at(43, None).unwrap(), 43.0);
    }

    #[test]
    fn prediction_error_overlay_reads_zero() {
        let collection = Arc::new(PatchCollection::new());
        collection.insert(sign_flip_patch(10, 3)).unwrap();
        let source: Vec<f64> = vec![5.0; 100];
        let patcher = Patcher::for_prediction_errors(Arc::new(source), collection);

        let range = patcher.range_at(8, 8, None).unwrap();
        assert_eq!(range, vec![5.0, 5.0, 0.0, 0.0, 0.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        let patcher = index_valued_patcher(Arc::new(PatchCollection::new()));
        assert!(patcher.range_at(TEST_LEN - 5, 10, None).is_err());
        assert!(patcher.range_at(0, 0, None).is_err());
        assert!(patcher.value_at(TEST_LEN, None).is_err());
    }
}
