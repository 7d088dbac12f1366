//! Dirty-region queue feeding texel updates to an external renderer.
//!
//! Edits record exact per-mip texel rectangles here instead of re-uploading
//! whole textures. The renderer host drains the queue, uploads the listed
//! regions, and acknowledges the fence; `is_idle` is the single
//! synchronization point polled before CPU readback (collision rebuilds).

use std::collections::HashMap;

use crate::atlas::AtlasId;
use crate::math::GridRect;

/// One rectangle of texels to re-upload at a given mip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRegion {
    pub atlas: AtlasId,
    pub mip: u8,
    pub rect: GridRect,
}

/// Accumulates dirty regions between renderer drains.
#[derive(Debug, Default)]
pub struct UploadQueue {
    /// Merged dirty rect per (atlas, mip). One rect per mip keeps the upload
    /// count bounded; strokes are spatially coherent so the union stays tight.
    pending: HashMap<(AtlasId, u8), GridRect>,
    fence_issued: u64,
    fence_completed: u64,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dirty texel rect at a mip level of an atlas.
    pub fn add_mip_region(&mut self, atlas: AtlasId, mip: u8, rect: GridRect) {
        self.pending
            .entry((atlas, mip))
            .and_modify(|r| *r = r.union(&rect))
            .or_insert(rect);
    }

    /// Forget pending regions for an atlas that no longer exists.
    pub fn retire_atlas(&mut self, atlas: AtlasId) {
        self.pending.retain(|(a, _), _| *a != atlas);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take all pending regions for upload, ordered by atlas then mip, and
    /// advance the fence. Returns the regions with the fence value the
    /// consumer must acknowledge via [`complete`](Self::complete).
    pub fn drain(&mut self) -> (Vec<UploadRegion>, u64) {
        let mut regions: Vec<UploadRegion> = self
            .pending
            .drain()
            .map(|((atlas, mip), rect)| UploadRegion { atlas, mip, rect })
            .collect();
        regions.sort_by_key(|r| (r.atlas, r.mip));
        if !regions.is_empty() {
            self.fence_issued += 1;
        }
        (regions, self.fence_issued)
    }

    /// Renderer-side acknowledgement that uploads up to `fence` finished.
    pub fn complete(&mut self, fence: u64) {
        self.fence_completed = self.fence_completed.max(fence.min(self.fence_issued));
    }

    /// True when every drained batch has been acknowledged and nothing is
    /// pending. Callers needing CPU readback poll this after draining.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.fence_completed == self.fence_issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_merge_per_mip() {
        let mut q = UploadQueue::new();
        let a = AtlasId(0);
        q.add_mip_region(a, 0, GridRect::new(0, 0, 3, 3));
        q.add_mip_region(a, 0, GridRect::new(2, 2, 5, 5));
        q.add_mip_region(a, 1, GridRect::new(0, 0, 1, 1));

        let (regions, _) = q.drain();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].rect, GridRect::new(0, 0, 5, 5));
        assert_eq!(regions[1].mip, 1);
    }

    #[test]
    fn test_fence_lifecycle() {
        let mut q = UploadQueue::new();
        assert!(q.is_idle());

        q.add_mip_region(AtlasId(2), 0, GridRect::point(0, 0));
        assert!(!q.is_idle());

        let (regions, fence) = q.drain();
        assert_eq!(regions.len(), 1);
        assert!(!q.is_idle());

        q.complete(fence);
        assert!(q.is_idle());
    }

    #[test]
    fn test_retire_atlas_drops_regions() {
        let mut q = UploadQueue::new();
        q.add_mip_region(AtlasId(0), 0, GridRect::point(0, 0));
        q.add_mip_region(AtlasId(1), 0, GridRect::point(0, 0));
        q.retire_atlas(AtlasId(0));
        let (regions, _) = q.drain();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].atlas, AtlasId(1));
    }
}
