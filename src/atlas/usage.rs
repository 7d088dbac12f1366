//! Channel ownership tracking for weight atlases.

use serde::{Deserialize, Serialize};

use crate::terrain::component::ComponentId;

/// Which component owns each of a weight atlas's four channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUsage {
    channels: [Option<ComponentId>; 4],
}

impl ChannelUsage {
    pub fn free_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.free_channel_count() == 4
    }

    pub fn owner(&self, channel: usize) -> Option<ComponentId> {
        self.channels[channel]
    }

    /// Lowest free channel, if any.
    pub fn find_free(&self) -> Option<usize> {
        self.channels.iter().position(|c| c.is_none())
    }

    pub fn claim(&mut self, channel: usize, owner: ComponentId) {
        debug_assert!(self.channels[channel].is_none() || self.channels[channel] == Some(owner));
        self.channels[channel] = Some(owner);
    }

    pub fn release(&mut self, channel: usize) {
        self.channels[channel] = None;
    }

    pub fn clear(&mut self) {
        self.channels = [None; 4];
    }

    /// Channels owned by a given component.
    pub fn channels_of(&self, owner: ComponentId) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, c)| (*c == Some(owner)).then_some(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_release() {
        let mut u = ChannelUsage::default();
        assert_eq!(u.free_channel_count(), 4);
        u.claim(2, ComponentId(7));
        assert_eq!(u.free_channel_count(), 3);
        assert_eq!(u.owner(2), Some(ComponentId(7)));
        assert_eq!(u.find_free(), Some(0));
        u.release(2);
        assert!(u.is_empty());
    }

    #[test]
    fn test_find_free_skips_claimed() {
        let mut u = ChannelUsage::default();
        u.claim(0, ComponentId(1));
        u.claim(1, ComponentId(1));
        assert_eq!(u.find_free(), Some(2));
        assert_eq!(u.channels_of(ComponentId(1)), vec![0, 1]);
    }
}
