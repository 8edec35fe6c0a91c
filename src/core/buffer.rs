//! Fixed-capacity rolling windows of recent samples.
//!
//! Each measurement series keeps the most recent samples for display. When a
//! push would exceed the capacity the oldest sample is evicted, so the window
//! always holds the newest samples in arrival order.

use std::collections::VecDeque;

/// Default number of samples retained per series.
pub const DEFAULT_CAPACITY: usize = 60;

/// A bounded FIFO window of samples.
#[derive(Debug, Clone)]
pub struct TelemetryBuffer<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> TelemetryBuffer<T> {
    /// Create an empty buffer holding at most `capacity` samples.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted sample if the window was full.
    pub fn push(&mut self, sample: T) -> Option<T> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// The most recently pushed sample.
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<T: Clone> TelemetryBuffer<T> {
    /// Copy out the window, oldest first, for charting.
    ///
    /// The returned vector is detached from the buffer.
    pub fn snapshot(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

impl<T> Default for TelemetryBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
