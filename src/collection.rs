//! Accepted patch store
//!
//! Holds every accepted patch for one channel. During an active scan the
//! collection is *open*: inserts append and queries scan linearly, because
//! patches arrive out of order from parallel workers. Once scanning ends the
//! collection is *finalized* into a start-position-sorted index with
//! `O(log n)` point and range queries. A new scan clears back to open mode.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RepairError, RepairResult};
use crate::fragment::Patch;

#[derive(Debug, Default)]
struct Inner {
    /// Sorted by start position when `finalized` is set.
    patches: Vec<Arc<Patch>>,
    finalized: bool,
}

/// Store of all accepted patches for one channel.
///
/// Safe for concurrent append during restoration and concurrent reads
/// during detection. In finalized mode at most one patch covers any given
/// position; inserts that would break that invariant are rejected.
#[derive(Debug, Default)]
pub struct PatchCollection {
    inner: RwLock<Inner>,
}

impl PatchCollection {
    /// Creates an empty, open collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a patch.
    ///
    /// In open mode this is append-only. In finalized mode the sorted index
    /// is maintained and an insert overlapping an existing patch fails.
    pub fn insert(&self, patch: Arc<Patch>) -> RepairResult<()> {
        let mut inner = self.inner.write();

        if inner.finalized {
            let overlapping = inner
                .patches
                .iter()
                .any(|p| p.overlaps(patch.start_position(), patch.end_position()));
            if overlapping {
                return Err(RepairError::OverlappingPatch {
                    start: patch.start_position(),
                });
            }
            let index = inner
                .patches
                .partition_point(|p| p.start_position() < patch.start_position());
            inner.patches.insert(index, patch);
        } else {
            inner.patches.push(patch);
        }

        Ok(())
    }

    /// Removes and returns the patch starting exactly at `start`.
    pub fn remove(&self, start: usize) -> Option<Arc<Patch>> {
        let mut inner = self.inner.write();
        let index = inner
            .patches
            .iter()
            .position(|p| p.start_position() == start)?;
        Some(inner.patches.remove(index))
    }

    /// Drops all patches and returns to open mode.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.patches.clear();
        inner.finalized = false;
    }

    /// Builds the sorted query index.
    ///
    /// Fails if two accepted patches overlap; the collection is left open in
    /// that case.
    pub fn finalize(&self) -> RepairResult<()> {
        let mut inner = self.inner.write();
        inner
            .patches
            .sort_unstable_by_key(|p| (p.start_position(), p.len()));

        for pair in inner.patches.windows(2) {
            if pair[1].start_position() <= pair[0].end_position() {
                return Err(RepairError::OverlappingPatch {
                    start: pair[1].start_position(),
                });
            }
        }

        inner.finalized = true;
        Ok(())
    }

    /// Whether the sorted index is built.
    pub fn is_finalized(&self) -> bool {
        self.inner.read().finalized
    }

    /// Number of patches.
    pub fn len(&self) -> usize {
        self.inner.read().patches.len()
    }

    /// Whether the collection holds no patches.
    pub fn is_empty(&self) -> bool {
        self.inner.read().patches.is_empty()
    }

    /// The patch covering `position`, if any.
    pub fn patch_at(&self, position: usize) -> Option<Arc<Patch>> {
        let inner = self.inner.read();

        if inner.finalized {
            let index = inner
                .patches
                .partition_point(|p| p.start_position() <= position);
            let candidate = inner.patches.get(index.checked_sub(1)?)?;
            candidate.covers(position).then(|| Arc::clone(candidate))
        } else {
            inner
                .patches
                .iter()
                .find(|p| p.covers(position))
                .map(Arc::clone)
        }
    }

    /// All patches intersecting `[start, end]` (inclusive), ascending by
    /// start position.
    pub fn patches_for_range(&self, start: usize, end: usize) -> Vec<Arc<Patch>> {
        let inner = self.inner.read();

        if inner.finalized {
            // Walk left from the last patch starting on or before `end`.
            let upper = inner.patches.partition_point(|p| p.start_position() <= end);
            let mut hits: Vec<Arc<Patch>> = Vec::new();

            for patch in inner.patches[..upper].iter().rev() {
                if patch.end_position() >= start {
                    hits.push(Arc::clone(patch));
                } else {
                    break;
                }
            }

            hits.reverse();
            hits
        } else {
            let mut hits: Vec<Arc<Patch>> = inner
                .patches
                .iter()
                .filter(|p| p.overlaps(start, end))
                .map(Arc::clone)
                .collect();
            hits.sort_unstable_by_key(|p| (p.start_position(), p.len()));
            hits
        }
    }

    /// All patches sorted by start position, regardless of mode.
    pub fn sorted_patches(&self) -> Vec<Arc<Patch>> {
        let inner = self.inner.read();
        let mut patches = inner.patches.clone();
        if !inner.finalized {
            patches.sort_unstable_by_key(|p| (p.start_position(), p.len()));
        }
        patches
    }
}
