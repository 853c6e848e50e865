//! Per-channel hand-off lanes.
//!
//! A lane lets exactly one worker at a time own a channel. A worker that
//! receives an event for a channel somebody else already owns does not wait:
//! it parks the event in that lane's FIFO and goes back to the queue. The
//! owner drains the FIFO in arrival order before giving the lane up.
//!
//! Claiming and releasing happen under the map's shard lock, so an item can
//! never be left behind in a lane nobody owns.

use std::collections::VecDeque;

use dashmap::DashMap;

/// What [`ChannelLanes::admit`] did with an item.
#[derive(Debug)]
pub enum Admission<T> {
    /// The lane was free: the caller now owns it and must run this item, then
    /// call [`ChannelLanes::next`] until it returns `None`.
    Run(T),
    /// Parked behind the current owner. `shed` is the oldest parked item,
    /// pushed out because the lane was full.
    Parked { shed: Option<T> },
}

#[derive(Debug)]
struct Lane<T> {
    owned: bool,
    parked: VecDeque<T>,
}

impl<T> Default for Lane<T> {
    fn default() -> Self {
        Self {
            owned: false,
            parked: VecDeque::new(),
        }
    }
}

/// Channel id → lane.
pub struct ChannelLanes<T> {
    lanes: DashMap<String, Lane<T>>,
    limit: usize,
}

impl<T> ChannelLanes<T> {
    /// `limit` bounds the parked items per channel (at least 1).
    pub fn new(limit: usize) -> Self {
        Self {
            lanes: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Claim `channel`'s lane for `item`, or park `item` behind its owner.
    pub fn admit(&self, channel: &str, item: T) -> Admission<T> {
        let mut lane = self.lanes.entry(channel.to_string()).or_default();
        if !lane.owned {
            lane.owned = true;
            return Admission::Run(item);
        }
        let shed = if lane.parked.len() >= self.limit {
            lane.parked.pop_front()
        } else {
            None
        };
        lane.parked.push_back(item);
        Admission::Parked { shed }
    }

    /// Owner side: take the next parked item, or give the lane up when
    /// there is none.
    pub fn next(&self, channel: &str) -> Option<T> {
        {
            let mut lane = self.lanes.get_mut(channel)?;
            if let Some(item) = lane.parked.pop_front() {
                return Some(item);
            }
            lane.owned = false;
        }
        self.lanes
            .remove_if(channel, |_, lane| !lane.owned && lane.parked.is_empty());
        None
    }

    pub fn is_owned(&self, channel: &str) -> bool {
        self.lanes.get(channel).is_some_and(|lane| lane.owned)
    }

    pub fn parked(&self, channel: &str) -> usize {
        self.lanes.get(channel).map_or(0, |lane| lane.parked.len())
    }

    /// Channels with an owner or parked items.
    pub fn active(&self) -> usize {
        self.lanes.len()
    }
}
