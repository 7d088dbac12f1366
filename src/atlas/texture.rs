//! CPU-side RGBA8 atlas textures with full mip chains.
//!
//! Height data packs a 16-bit height into R/G and an encoded surface normal
//! into B/A. Weight data uses all four channels as independent blend layers,
//! one owning component per channel.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::core::Error;
use crate::terrain::component::ComponentId;

use super::usage::ChannelUsage;

/// Largest atlas edge in texels. Import packs as many components per atlas
/// as fit under this limit.
pub const MAX_ATLAS_SIZE: usize = 512;

/// One RGBA8 texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Texel(pub [u8; 4]);

impl Texel {
    /// Pack a 16-bit height and an encoded normal into R/G/B/A.
    pub fn from_height(height: u16, normal_x: u8, normal_y: u8) -> Self {
        Texel([(height >> 8) as u8, (height & 255) as u8, normal_x, normal_y])
    }

    pub fn height(&self) -> u16 {
        ((self.0[0] as u16) << 8) | self.0[1] as u16
    }

    pub fn set_height(&mut self, height: u16) {
        self.0[0] = (height >> 8) as u8;
        self.0[1] = (height & 255) as u8;
    }

    pub fn set_normal(&mut self, normal_x: u8, normal_y: u8) {
        self.0[2] = normal_x;
        self.0[3] = normal_y;
    }
}

/// Encode one component of a unit normal into a byte.
pub fn pack_normal(n: f32) -> u8 {
    (127.5 * (n + 1.0)).round().clamp(0.0, 255.0) as u8
}

/// What an atlas stores. Weight atlases carry a channel ownership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtlasKind {
    Height,
    Weight,
}

/// Stable handle to an atlas within an [`AtlasSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtlasId(pub u32);

/// A single atlas texture: base level plus a full mip chain down to 1x1.
#[derive(Debug, Clone)]
pub struct AtlasTexture {
    size_x: usize,
    size_y: usize,
    /// mips[0] is the base level.
    mips: Vec<Vec<Texel>>,
}

impl AtlasTexture {
    /// Allocate a zeroed texture with its full mip chain. Dimensions must be
    /// powers of two.
    pub fn new(size_x: usize, size_y: usize) -> Self {
        debug_assert!(size_x.is_power_of_two() && size_y.is_power_of_two());
        let mut mips = Vec::new();
        let (mut mx, mut my) = (size_x, size_y);
        loop {
            mips.push(vec![Texel::default(); mx * my]);
            if mx == 1 && my == 1 {
                break;
            }
            mx = (mx / 2).max(1);
            my = (my / 2).max(1);
        }
        Self { size_x, size_y, mips }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.size_x, self.size_y)
    }

    pub fn num_mips(&self) -> usize {
        self.mips.len()
    }

    pub fn mip_size(&self, mip: usize) -> (usize, usize) {
        ((self.size_x >> mip).max(1), (self.size_y >> mip).max(1))
    }

    pub fn texel(&self, mip: usize, x: usize, y: usize) -> Texel {
        let (mx, _) = self.mip_size(mip);
        self.mips[mip][y * mx + x]
    }

    pub fn texel_mut(&mut self, mip: usize, x: usize, y: usize) -> &mut Texel {
        let mx = (self.size_x >> mip).max(1);
        &mut self.mips[mip][y * mx + x]
    }

    pub fn mip_data(&self, mip: usize) -> &[Texel] {
        &self.mips[mip]
    }

    pub fn base_data(&self) -> &[Texel] {
        &self.mips[0]
    }

    pub fn base_data_mut(&mut self) -> &mut [Texel] {
        &mut self.mips[0]
    }

    /// Overwrite the base level from raw texels. Used by the persistence
    /// loader; the caller regenerates mips afterwards.
    pub fn set_base_data(&mut self, data: Vec<Texel>) -> Result<()> {
        if data.len() != self.size_x * self.size_y {
            return Err(Error::Persist(format!(
                "atlas payload size {} does not match {}x{}",
                data.len(),
                self.size_x,
                self.size_y
            )));
        }
        self.mips[0] = data;
        Ok(())
    }

    /// Borrow mip `mip - 1` immutably and mip `mip` mutably, with their row
    /// widths. Used by mip generation, which reads each level while writing
    /// the next.
    pub(crate) fn mip_pair_mut(&mut self, mip: usize) -> (&[Texel], &mut [Texel], usize, usize) {
        debug_assert!(mip >= 1 && mip < self.mips.len());
        let prev_w = (self.size_x >> (mip - 1)).max(1);
        let cur_w = (self.size_x >> mip).max(1);
        let (head, tail) = self.mips.split_at_mut(mip);
        (&head[mip - 1], &mut tail[0], prev_w, cur_w)
    }

    /// Zero one channel over the whole base level.
    pub fn zero_channel(&mut self, channel: usize) {
        for t in &mut self.mips[0] {
            t.0[channel] = 0;
        }
    }
}

/// Arena of atlas textures. Ids stay stable across removals.
#[derive(Debug, Default)]
pub struct AtlasSet {
    slots: Vec<Option<AtlasSlot>>,
}

#[derive(Debug)]
struct AtlasSlot {
    texture: AtlasTexture,
    kind: AtlasKind,
    usage: ChannelUsage,
}

impl AtlasSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, texture: AtlasTexture, kind: AtlasKind) -> AtlasId {
        let slot = AtlasSlot { texture, kind, usage: ChannelUsage::default() };
        for (i, s) in self.slots.iter_mut().enumerate() {
            if s.is_none() {
                *s = Some(slot);
                return AtlasId(i as u32);
            }
        }
        self.slots.push(Some(slot));
        AtlasId((self.slots.len() - 1) as u32)
    }

    pub fn remove(&mut self, id: AtlasId) -> Option<AtlasTexture> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.take())
            .map(|s| s.texture)
    }

    pub fn contains(&self, id: AtlasId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Some(_)))
    }

    fn slot(&self, id: AtlasId) -> &AtlasSlot {
        match &self.slots[id.0 as usize] {
            Some(s) => s,
            None => panic!("stale atlas id {:?}", id),
        }
    }

    fn slot_mut(&mut self, id: AtlasId) -> &mut AtlasSlot {
        match &mut self.slots[id.0 as usize] {
            Some(s) => s,
            None => panic!("stale atlas id {:?}", id),
        }
    }

    pub fn kind(&self, id: AtlasId) -> AtlasKind {
        self.slot(id).kind
    }

    pub fn texture(&self, id: AtlasId) -> &AtlasTexture {
        &self.slot(id).texture
    }

    pub fn texture_mut(&mut self, id: AtlasId) -> &mut AtlasTexture {
        &mut self.slot_mut(id).texture
    }

    pub fn usage(&self, id: AtlasId) -> &ChannelUsage {
        &self.slot(id).usage
    }

    pub fn usage_mut(&mut self, id: AtlasId) -> &mut ChannelUsage {
        &mut self.slot_mut(id).usage
    }

    /// Ids of all live atlases of a kind.
    pub fn ids_of_kind(&self, kind: AtlasKind) -> Vec<AtlasId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(slot) if slot.kind == kind => Some(AtlasId(i as u32)),
                _ => None,
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<AtlasId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| AtlasId(i as u32)))
            .collect()
    }

    /// Copy one channel of the base level from one atlas to another, then
    /// zero the source channel. Source and destination may be the same atlas.
    pub fn move_channel(
        &mut self,
        from: AtlasId,
        from_channel: usize,
        to: AtlasId,
        to_channel: usize,
        owner: ComponentId,
    ) {
        if from == to {
            let tex = self.texture_mut(from);
            for t in tex.base_data_mut() {
                t.0[to_channel] = t.0[from_channel];
                t.0[from_channel] = 0;
            }
        } else {
            let src: Vec<u8> = self
                .texture(from)
                .base_data()
                .iter()
                .map(|t| t.0[from_channel])
                .collect();
            let dst = self.texture_mut(to);
            for (t, v) in dst.base_data_mut().iter_mut().zip(src) {
                t.0[to_channel] = v;
            }
            self.texture_mut(from).zero_channel(from_channel);
        }
        self.usage_mut(from).release(from_channel);
        self.usage_mut(to).claim(to_channel, owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_packing() {
        let t = Texel::from_height(0x1234, 10, 20);
        assert_eq!(t.height(), 0x1234);
        assert_eq!(t.0, [0x12, 0x34, 10, 20]);
    }

    #[test]
    fn test_pack_normal_range() {
        assert_eq!(pack_normal(-1.0), 0);
        assert_eq!(pack_normal(1.0), 255);
        assert_eq!(pack_normal(0.0), 128);
    }

    #[test]
    fn test_mip_chain_length() {
        let t = AtlasTexture::new(256, 256);
        assert_eq!(t.num_mips(), 9);
        assert_eq!(t.mip_size(0), (256, 256));
        assert_eq!(t.mip_size(8), (1, 1));

        let t = AtlasTexture::new(512, 256);
        assert_eq!(t.num_mips(), 10);
        assert_eq!(t.mip_size(9), (1, 1));
    }

    #[test]
    fn test_atlas_set_reuses_slots() {
        let mut set = AtlasSet::new();
        let a = set.insert(AtlasTexture::new(64, 64), AtlasKind::Weight);
        let b = set.insert(AtlasTexture::new(64, 64), AtlasKind::Weight);
        assert_ne!(a, b);
        set.remove(a);
        assert!(!set.contains(a));
        let c = set.insert(AtlasTexture::new(64, 64), AtlasKind::Height);
        assert_eq!(c, a);
    }

    #[test]
    fn test_move_channel_across_atlases() {
        let mut set = AtlasSet::new();
        let a = set.insert(AtlasTexture::new(4, 4), AtlasKind::Weight);
        let b = set.insert(AtlasTexture::new(4, 4), AtlasKind::Weight);
        let owner = ComponentId(0);
        set.usage_mut(a).claim(1, owner);
        set.texture_mut(a).texel_mut(0, 2, 2).0[1] = 99;

        set.move_channel(a, 1, b, 3, owner);

        assert_eq!(set.texture(b).texel(0, 2, 2).0[3], 99);
        assert_eq!(set.texture(a).texel(0, 2, 2).0[1], 0);
        assert_eq!(set.usage(a).free_channel_count(), 4);
        assert_eq!(set.usage(b).owner(3), Some(owner));
    }

    #[test]
    fn test_move_channel_same_atlas() {
        let mut set = AtlasSet::new();
        let a = set.insert(AtlasTexture::new(4, 4), AtlasKind::Weight);
        let owner = ComponentId(5);
        set.usage_mut(a).claim(0, owner);
        set.texture_mut(a).texel_mut(0, 1, 1).0[0] = 42;

        set.move_channel(a, 0, a, 2, owner);

        assert_eq!(set.texture(a).texel(0, 1, 1).0[2], 42);
        assert_eq!(set.texture(a).texel(0, 1, 1).0[0], 0);
        assert_eq!(set.usage(a).owner(2), Some(owner));
        assert_eq!(set.usage(a).owner(0), None);
    }
}
