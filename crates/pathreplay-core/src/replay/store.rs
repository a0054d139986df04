//! Bounded in-memory frame store

use std::time::Duration;

use super::error::StoreError;
use super::Waypoint;

/// Default maximum number of frames (~2 minutes at 25 ms)
pub const DEFAULT_MAX_FRAMES: usize = 5000;

/// Time-ordered sequence of waypoints with a hard capacity
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStore {
    frames: Vec<Waypoint>,
    capacity: usize,
}

impl FrameStore {
    /// Create an empty store that holds at most `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity.min(DEFAULT_MAX_FRAMES)),
            capacity,
        }
    }

    /// Maximum number of frames
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a frame
    ///
    /// Fails once the store is full; the recorder treats that as the signal to
    /// stop.
    ///
    /// # Panics
    /// If `frame` is earlier than the last stored frame. Recording only ever
    /// appends later samples, so this is a caller bug.
    pub fn append(&mut self, frame: Waypoint) -> Result<(), StoreError> {
        if self.frames.len() >= self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if let Some(last) = self.frames.last() {
            assert!(
                frame.timestamp >= last.timestamp,
                "waypoint at {}us appended after {}us",
                frame.timestamp,
                last.timestamp
            );
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Remove all frames
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Replace the contents wholesale
    ///
    /// The incoming sequence is checked first; on error the store is left
    /// untouched.
    pub fn replace_all(&mut self, frames: Vec<Waypoint>) -> Result<(), StoreError> {
        if frames.len() > self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if let Some(index) = first_out_of_order(&frames) {
            return Err(StoreError::OutOfOrder { index });
        }
        self.frames = frames;
        Ok(())
    }

    /// Frame at `index`
    pub fn at(&self, index: usize) -> Option<&Waypoint> {
        self.frames.get(index)
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether another append would fail
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Timestamp of the last frame in microseconds
    pub fn last_timestamp(&self) -> Option<u64> {
        self.frames.last().map(|f| f.timestamp)
    }

    /// Length of the recording
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.last_timestamp().unwrap_or_default())
    }

    /// All frames in time order
    pub fn frames(&self) -> &[Waypoint] {
        &self.frames
    }

    /// Number of frames flagged as actions
    pub fn action_count(&self) -> usize {
        self.frames.iter().filter(|f| f.has_action).count()
    }

    /// Index of the earliest frame with `timestamp >= time`
    ///
    /// Returns the last index when `time` is past every frame and `None` only
    /// for an empty store. O(log n).
    pub fn find_index_at_time(&self, time: u64) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let index = self.frames.partition_point(|f| f.timestamp < time);
        Some(index.min(self.frames.len() - 1))
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_FRAMES)
    }
}

fn first_out_of_order(frames: &[Waypoint]) -> Option<usize> {
    frames
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
        .map(|i| i + 1)
}
