use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::StateConflict, sources::Track};

/// Pending tracks for one guild, strictly FIFO.
///
/// Holds no lock of its own: it is only reachable through the guild guard,
/// which also covers the now-playing slot, so "pop head" and "set now
/// playing" happen in one critical section.
#[derive(Debug)]
pub struct GuildQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a track and returns its 1-based position in the queue.
    pub fn enqueue(&mut self, track: Track) -> Result<usize, StateConflict> {
        if self.items.len() >= self.max_size {
            return Err(StateConflict::QueueFull(self.max_size));
        }

        info!("➕ Added to queue: {}", track.title());
        self.items.push_back(track);

        Ok(self.items.len())
    }

    /// Takes the next track (first in, first out).
    pub fn dequeue_next(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => debug!("➡️ Next in queue: {}", track.title()),
            None => debug!("📭 Queue empty, nothing to dequeue"),
        }
        next
    }

    /// Snapshot of pending tracks in play order.
    pub fn peek_all(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    /// Drops every pending track and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Queue cleared: {} tracks removed", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
