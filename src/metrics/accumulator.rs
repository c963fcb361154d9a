use super::report::{reduce, FinalReport};
use super::Sample;
use crate::error::Result;

/// Every sample a job produced, in arrival order.
///
/// Owned by exactly one stream consumer; the reducer reads it once the
/// stream has stopped.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    samples: Vec<Sample>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Reduce without consuming, e.g. for partial results after a job failure.
    pub fn reduce(&self) -> Result<FinalReport> {
        reduce(&self.samples)
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
