use crate::models::PriceSample;
use std::collections::VecDeque;

/// Rolling, timestamp-ordered window of samples for one asset
///
/// Holds at most `capacity` samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Build a history from already ordered samples, keeping the newest `capacity`
    pub fn from_samples(samples: impl IntoIterator<Item = PriceSample>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        for sample in samples {
            history.push(sample);
        }
        history
    }

    /// Append a sample.
    ///
    /// Returns false (and keeps the history unchanged) when the sample is not
    /// strictly newer than the last one held.
    pub fn push(&mut self, sample: PriceSample) -> bool {
        if let Some(last) = self.samples.back() {
            if sample.timestamp <= last.timestamp {
                return false;
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.samples.make_contiguous();
        true
    }

    /// Samples oldest first
    pub fn as_slice(&self) -> &[PriceSample] {
        // push() keeps the deque contiguous
        self.samples.as_slices().0
    }

    /// The `n` most recent samples, oldest first
    pub fn recent(&self, n: usize) -> &[PriceSample] {
        let slice = self.as_slice();
        &slice[slice.len().saturating_sub(n)..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.close).collect()
    }

    pub fn last(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.samples.back().map(|s| s.close)
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
}
