use std::fmt;

use serde::Serialize;

use super::Sample;
use crate::error::{Result, StreamError};

/// Number of equal-width time buckets in the throughput series
pub const BUCKET_COUNT: usize = 100;

// ─── Public types ────────────────────────────────────────────────

/// Exact latency distribution, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub p99: i64,
}

/// Throughput time-series and its distribution, in samples per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub bucket_count: usize,
    /// Bucket width in milliseconds
    pub bucket_width_ms: i64,
    /// Per-bucket rates in time order
    pub buckets: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p99: f64,
    /// Samples over the whole job span
    pub total: f64,
}

/// Final statistics for one job. Built once by [`reduce`], never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    pub latency: LatencyStats,
    pub throughput: ThroughputStats,
}

// ─── Reduction ───────────────────────────────────────────────────

/// Reduce a job's full sample set into its final report.
///
/// Pure function of the sample sequence: reducing the same slice twice
/// yields identical reports.
pub fn reduce(samples: &[Sample]) -> Result<FinalReport> {
    if samples.is_empty() {
        return Err(StreamError::EmptyResult);
    }

    Ok(FinalReport {
        latency: latency_stats(samples),
        throughput: throughput_stats(samples),
    })
}

/// Nearest-rank index for the 99th percentile: `floor(0.99 * n)`,
/// kept inside the slice.
fn p99_index(n: usize) -> usize {
    (n * 99 / 100).min(n - 1)
}

fn latency_stats(samples: &[Sample]) -> LatencyStats {
    let mut latencies: Vec<i64> = samples.iter().map(Sample::latency).collect();
    latencies.sort_unstable();

    let n = latencies.len();
    let sum: f64 = latencies.iter().map(|&v| v as f64).sum();

    LatencyStats {
        count: n,
        min: latencies[0],
        max: latencies[n - 1],
        mean: sum / n as f64,
        p99: latencies[p99_index(n)],
    }
}

fn throughput_stats(samples: &[Sample]) -> ThroughputStats {
    let start = samples.iter().map(|s| s.start_time).min().unwrap_or(0);
    let end = samples.iter().map(|s| s.end_time).max().unwrap_or(start);

    // Zero-length span still gets 1 ms buckets
    let span = (end - start).max(1);
    let width = (span + BUCKET_COUNT as i64 - 1) / BUCKET_COUNT as i64;

    let mut counts = [0u64; BUCKET_COUNT];
    for s in samples {
        let offset = s.start_time - start;
        let idx = (offset / width) as usize;
        // A start exactly at the right edge of the last bucket falls outside
        if idx < BUCKET_COUNT {
            counts[idx] += 1;
        }
    }

    let buckets: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 / width as f64 * 1000.0)
        .collect();

    // Descending: p99 lands near the slowest buckets
    let mut sorted = buckets.clone();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));

    let mean = sorted.iter().sum::<f64>() / BUCKET_COUNT as f64;

    ThroughputStats {
        bucket_count: BUCKET_COUNT,
        bucket_width_ms: width,
        min: sorted[BUCKET_COUNT - 1],
        max: sorted[0],
        mean,
        p99: sorted[p99_index(BUCKET_COUNT)],
        total: samples.len() as f64 / span as f64 * 1000.0,
        buckets,
    }
}

// ─── Display ─────────────────────────────────────────────────────

/// Round for display; stored values keep full precision.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l = &self.latency;
        let t = &self.throughput;
        writeln!(f, "latency (ms)       count={}", l.count)?;
        writeln!(
            f,
            "  min {:.3}  max {:.3}  mean {:.3}  p99 {:.3}",
            l.min as f64, l.max as f64, l.mean, l.p99 as f64
        )?;
        writeln!(
            f,
            "throughput (ops/s) buckets={} width={}ms",
            t.bucket_count, t.bucket_width_ms
        )?;
        write!(
            f,
            "  min {:.3}  max {:.3}  mean {:.3}  p99 {:.3}  total {:.3}",
            t.min, t.max, t.mean, t.p99, t.total
        )
    }
}
