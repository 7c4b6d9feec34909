use std::{collections::VecDeque, sync::Arc};

use crate::protocol::Track;

/// FIFO of pending tracks for one session. Duplicates are allowed and
/// insertion order is play order.
///
/// The queue has no locking of its own; it lives inside the session state
/// and is only touched while that state is locked.
#[derive(Debug, Clone, Default)]
pub struct TrackQueue {
    tracks: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    pub fn enqueue_all<I>(&mut self, tracks: I)
    where
        I: IntoIterator<Item = Track>,
    {
        self.tracks.extend(tracks);
    }

    /// Removes and returns the head. `None` means the queue is exhausted.
    pub fn dequeue(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn peek(&self) -> Option<&Track> {
        self.tracks.front()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Puts a track that was dequeued but could not be started back at the head.
    pub(crate) fn restore_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Point-in-time copy for display. Later mutations are not reflected.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.iter().cloned().collect(),
        }
    }
}

/// Immutable copy of a queue. Cheap to clone; every call to `iter` starts
/// again from the head.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    tracks: Arc<[Track]>,
}

impl QueueSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Total length of the non-stream tracks, in milliseconds.
    pub fn total_length(&self) -> u64 {
        self.tracks
            .iter()
            .filter(|t| !t.is_stream)
            .map(|t| t.length)
            .sum()
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
