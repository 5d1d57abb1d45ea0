use std::collections::VecDeque;

use crate::{BandLevels, BeatEvent};

/// Notification raised by [`crate::AudioEngine`] during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Smoothed band levels, raised once per tick.
    LevelsUpdated(BandLevels),
    BeatDetected(BeatEvent),
}

/// Single-consumer queue drained by the host once per tick.
#[derive(Debug)]
pub struct EventQueue {
    pending: VecDeque<EngineEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    /// Events retained when the host stops draining the queue.
    pub const DEFAULT_CAPACITY: usize = 1_024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queues an event, discarding the oldest one when full.
    pub fn push(&mut self, event: EngineEvent) {
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
            self.dropped += 1;
        }
        self.pending.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Events discarded because the queue overflowed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(bass: f32) -> EngineEvent {
        EngineEvent::LevelsUpdated(BandLevels {
            bass,
            ..Default::default()
        })
    }

    #[test]
    fn drains_in_order() {
        let mut queue = EventQueue::new();
        queue.push(levels(0.1));
        queue.push(levels(0.2));

        assert_eq!(queue.drain(), vec![levels(0.1), levels(0.2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = EventQueue::with_capacity(2);
        for bass in [0.1, 0.2, 0.3] {
            queue.push(levels(bass));
        }

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec![levels(0.2), levels(0.3)]);
    }
}
