use hdrhistogram::Histogram;
use serde::Serialize;

// 1 ms → 1 h at 3 significant figures
const LOWEST_MS: u64 = 1;
const HIGHEST_MS: u64 = 3_600_000;
const SIGFIG: u8 = 3;

/// Rough latency quantiles of a job that is still running, in ms.
/// Zeroed until the first sample arrives.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PercentileSet {
    pub count: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
}

/// Running latency histogram for a job that is still streaming.
///
/// Cheap to update per sample; the exact numbers come from the reducer
/// once the stream is done.
#[derive(Debug, Clone)]
pub struct LiveLatency {
    hist: Histogram<u64>,
}

impl LiveLatency {
    pub fn new() -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(LOWEST_MS, HIGHEST_MS, SIGFIG)
                .expect("histogram creation"),
        }
    }

    /// Clamped into the histogram range (zero-latency samples count as 1 ms).
    pub fn record(&mut self, latency_ms: i64) {
        let v = (latency_ms.max(0) as u64).clamp(LOWEST_MS, HIGHEST_MS);
        let _ = self.hist.record(v);
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn percentiles(&self) -> PercentileSet {
        let h = &self.hist;
        if h.len() == 0 {
            return PercentileSet::default();
        }
        PercentileSet {
            count: h.len(),
            mean: h.mean(),
            p50: h.value_at_quantile(0.5),
            p90: h.value_at_quantile(0.9),
            p99: h.value_at_quantile(0.99),
            max: h.max(),
        }
    }
}

impl Default for LiveLatency {
    fn default() -> Self {
        Self::new()
    }
}
