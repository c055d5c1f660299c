use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::Channel;

/// Maps channel numbers to live channels.
///
/// Channel 0 carries connection-level traffic. It is registered at construction and is never
/// handed out or released.
#[derive(Debug)]
pub(crate) struct ChannelAllocator {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    channels: BTreeMap<u16, Channel>,
    /// Allocation order, channel 0 first
    order: Vec<u16>,
    channel_max: u16,
}

impl ChannelAllocator {
    pub fn new(control: Channel, channel_max: u16) -> Self {
        let id = control.id();
        let mut channels = BTreeMap::new();
        channels.insert(id, control);
        Self {
            inner: Mutex::new(Inner {
                channels,
                order: vec![id],
                channel_max,
            }),
        }
    }

    /// Registers a channel under the lowest free non-zero number. Returns `None` once every
    /// number up to channel-max is taken.
    pub fn allocate(&self, make: impl FnOnce(u16) -> Channel) -> Option<Channel> {
        let mut inner = self.inner.lock();
        let max = match inner.channel_max {
            0 => u16::MAX,
            n => n,
        };

        let mut candidate: u16 = 1;
        for &id in inner.channels.keys() {
            if id == 0 || id < candidate {
                continue;
            }
            if id != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        if candidate > max {
            return None;
        }

        let channel = make(candidate);
        inner.channels.insert(candidate, channel.clone());
        inner.order.push(candidate);
        Some(channel)
    }

    /// All registered channels in allocation order, channel 0 included
    pub fn all_channels(&self) -> Vec<Channel> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.channels.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: u16) -> Option<Channel> {
        self.inner.lock().channels.get(&id).cloned()
    }

    /// Frees the number of a user channel for reuse
    pub fn release(&self, id: u16) -> Option<Channel> {
        if id == 0 {
            return None;
        }
        let mut inner = self.inner.lock();
        inner.order.retain(|&other| other != id);
        inner.channels.remove(&id)
    }

    pub fn set_channel_max(&self, channel_max: u16) {
        self.inner.lock().channel_max = channel_max;
    }

    pub fn channel_max(&self) -> u16 {
        self.inner.lock().channel_max
    }
}
