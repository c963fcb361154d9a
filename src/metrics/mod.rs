pub mod accumulator;
pub mod buffer;
pub mod percentiles;
pub mod report;

pub use accumulator::Accumulator;
pub use buffer::{AxisBounds, Point, VisualizationBuffer};
pub use percentiles::{LiveLatency, PercentileSet};
pub use report::{reduce, FinalReport, LatencyStats, ThroughputStats};

use serde::{Deserialize, Serialize};

/// One observed unit of benchmarked work.
/// Timestamps are milliseconds since an arbitrary (server-side) epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub start_time: i64,
    pub end_time: i64,
}

impl Sample {
    pub fn new(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    /// Negative for malformed samples; the consumer rejects those.
    pub fn latency(&self) -> i64 {
        self.end_time - self.start_time
    }
}
