pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

pub use http::HttpJobService;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::Sample;

// ─── Wire types ──────────────────────────────────────────────────

/// One `{startTime, endTime}` entry of a result page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSample {
    pub start_time: i64,
    pub end_time: i64,
}

impl From<WireSample> for Sample {
    fn from(w: WireSample) -> Self {
        Sample::new(w.start_time, w.end_time)
    }
}

/// Raw response of the paginated results endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePage {
    /// 0 (or negative) until the job knows how many samples it will produce
    #[serde(default)]
    pub total: i64,
    /// Samples recorded by the server so far; informational only
    #[serde(default)]
    pub completed: i64,
    #[serde(default)]
    pub start_end_times: Vec<WireSample>,
    /// Empty string when the job has not failed; anything else is terminal
    #[serde(default)]
    pub exception: String,
}

/// A result page after decoding the wire sentinels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub total: Option<u64>,
    pub samples: Vec<Sample>,
    pub exception: Option<String>,
}

impl ResultPage {
    pub fn new(total: Option<u64>, samples: Vec<Sample>) -> Self {
        Self {
            total,
            samples,
            exception: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            total: None,
            samples: Vec::new(),
            exception: Some(message.into()),
        }
    }
}

impl From<WirePage> for ResultPage {
    fn from(w: WirePage) -> Self {
        Self {
            total: (w.total > 0).then_some(w.total as u64),
            samples: w.start_end_times.into_iter().map(Sample::from).collect(),
            exception: Some(w.exception).filter(|e| !e.is_empty()),
        }
    }
}

/// Parameters of a perf job, as the service's start form expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub primitive: String,
    pub provider: String,
    pub bytes: u32,
    pub iterations: u32,
    pub threads: u32,
}

impl JobParams {
    /// Samples the job will produce, used to size the chart window.
    pub fn expected_samples(&self) -> u64 {
        self.iterations as u64 * self.threads as u64
    }
}

/// Response of the job start call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedJob {
    pub id: u64,
    #[serde(default)]
    pub summary: String,
}

/// What the service can benchmark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Primitive key → display name
    #[serde(default)]
    pub primitives: BTreeMap<String, String>,
    #[serde(default)]
    pub providers: Vec<String>,
}

// ─── Correctness jobs ────────────────────────────────────────────

/// Parameters of a correctness job: every provider pairing is cross-checked
/// `iterations` times on each of `threads` threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectnessParams {
    pub iterations: u32,
    pub threads: u32,
}

impl CorrectnessParams {
    /// Iterations the server counts in `completed` once the job is finished.
    pub fn expected_iterations(&self) -> u64 {
        self.iterations as u64 * self.threads as u64
    }
}

/// One primitive/encrypting provider/decrypting provider combination
/// the job verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectnessCheck {
    pub primitive: String,
    pub enc: String,
    pub dec: String,
}

/// Raw response of the correctness results endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireCorrectness {
    #[serde(default)]
    pub results: Vec<CorrectnessCheck>,
    #[serde(default)]
    pub exception: String,
    #[serde(default)]
    pub completed: i64,
}

/// A correctness poll after decoding the wire sentinels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectnessStatus {
    pub checks: Vec<CorrectnessCheck>,
    /// Iterations finished across all threads
    pub completed: u64,
    pub exception: Option<String>,
}

impl From<WireCorrectness> for CorrectnessStatus {
    fn from(w: WireCorrectness) -> Self {
        Self {
            checks: w.results,
            completed: w.completed.max(0) as u64,
            exception: Some(w.exception).filter(|e| !e.is_empty()),
        }
    }
}

// ─── Service seam ────────────────────────────────────────────────

/// The remote job/result service.
///
/// Only `result_page` is needed to stream a perf job. The rest start jobs,
/// describe what can be started, and report on correctness runs.
#[async_trait]
pub trait ResultService: Send + Sync {
    /// Fetch up to `count` samples of `job_id` starting at `offset`.
    async fn result_page(&self, job_id: u64, offset: u64, count: u64) -> Result<ResultPage>;

    async fn start_job(&self, params: &JobParams) -> Result<StartedJob>;

    async fn list_catalog(&self) -> Result<Catalog>;

    async fn start_correctness(&self, params: &CorrectnessParams) -> Result<StartedJob>;

    /// Progress of a correctness job; unlike perf results this is not paged.
    async fn correctness_result(&self, job_id: u64) -> Result<CorrectnessStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_reference_payload() {
        let json = r#"{
            "total": 0,
            "completed": 2,
            "startEndTimes": [
                {"startTime": 10, "endTime": 14},
                {"startTime": 11, "endTime": 19}
            ],
            "exception": ""
        }"#;
        let wire: WirePage = serde_json::from_str(json).unwrap();
        let page = ResultPage::from(wire);
        assert_eq!(page.total, None);
        assert_eq!(page.exception, None);
        assert_eq!(page.samples, vec![Sample::new(10, 14), Sample::new(11, 19)]);
    }

    #[test]
    fn test_known_total_and_exception() {
        let json = r#"{"total": 500, "startEndTimes": [], "exception": "java.lang.Boom"}"#;
        let page = ResultPage::from(serde_json::from_str::<WirePage>(json).unwrap());
        assert_eq!(page.total, Some(500));
        assert_eq!(page.exception.as_deref(), Some("java.lang.Boom"));
    }

    #[test]
    fn test_whitespace_exception_is_still_an_exception() {
        let json = r#"{"total": 0, "startEndTimes": [], "exception": "\n"}"#;
        let page = ResultPage::from(serde_json::from_str::<WirePage>(json).unwrap());
        assert_eq!(page.exception.as_deref(), Some("\n"));
    }

    #[test]
    fn test_decodes_correctness_payload() {
        let json = r#"{
            "results": [
                {"primitive": "AES128GCM", "enc": "bc", "dec": "jce"},
                {"primitive": "HKDF", "enc": "bc", "dec": "bc"}
            ],
            "exception": "",
            "completed": 12
        }"#;
        let status = CorrectnessStatus::from(serde_json::from_str::<WireCorrectness>(json).unwrap());
        assert_eq!(status.completed, 12);
        assert_eq!(status.exception, None);
        assert_eq!(status.checks.len(), 2);
        assert_eq!(status.checks[0].dec, "jce");
    }

    #[test]
    fn test_expected_samples() {
        let params = JobParams {
            primitive: "AES_GCM_ENCRYPT".into(),
            provider: "bc".into(),
            bytes: 10,
            iterations: 1000,
            threads: 100,
        };
        assert_eq!(params.expected_samples(), 100_000);
    }
}
