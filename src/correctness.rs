//! Watching correctness jobs.
//!
//! A correctness job cross-checks every encrypting provider against every
//! decrypting one. Its results are not paged: each poll returns the whole
//! list of checks plus an iteration counter, and the job is finished once
//! the counter reaches `iterations * threads` or an exception shows up.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::service::{CorrectnessCheck, CorrectnessStatus, ResultService};
use crate::stream::consumer::backoff;
use crate::stream::CancelHandle;

/// Outcome of a correctness job that ran to the end without an exception.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectnessReport {
    pub job_id: u64,
    pub completed: u64,
    pub expected: u64,
    pub checks: Vec<CorrectnessCheck>,
}

impl fmt::Display for CorrectnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{} iterations without a mismatch",
            self.completed, self.expected
        )?;
        for check in &self.checks {
            writeln!(f, "  {:<20} {} -> {}", check.primitive, check.enc, check.dec)?;
        }
        Ok(())
    }
}

/// Polls one correctness job until it finishes, fails or is cancelled.
pub struct CorrectnessWatcher {
    job_id: u64,
    service: Arc<dyn ResultService>,
    config: StreamConfig,
    expected: u64,
    completed: u64,
    cancel: CancelHandle,
}

impl CorrectnessWatcher {
    pub fn new(
        job_id: u64,
        service: Arc<dyn ResultService>,
        config: StreamConfig,
        expected: u64,
    ) -> Self {
        Self {
            job_id,
            service,
            config,
            expected,
            completed: 0,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Iterations the server had finished at the last poll.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// One status request. `Some` once the job has finished cleanly.
    pub async fn poll(&mut self) -> Result<Option<CorrectnessReport>> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled(self.job_id));
        }

        let request = tokio::time::timeout(
            self.config.request_timeout(),
            self.service.correctness_result(self.job_id),
        );
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled(self.job_id)),
            fetched = request => fetched,
        };
        let status = fetched.map_err(|_| {
            StreamError::Transport(format!(
                "request timed out after {}ms",
                self.config.request_timeout_ms
            ))
        })??;

        self.apply(status)
    }

    fn apply(&mut self, status: CorrectnessStatus) -> Result<Option<CorrectnessReport>> {
        if let Some(message) = status.exception {
            warn!(job_id = self.job_id, completed = self.completed, "correctness job failed");
            return Err(StreamError::JobException {
                job_id: self.job_id,
                message,
            });
        }
        if status.completed < self.completed {
            return Err(StreamError::MalformedPage {
                job_id: self.job_id,
                offset: self.completed,
                reason: format!(
                    "completed went back from {} to {}",
                    self.completed, status.completed
                ),
            });
        }

        self.completed = status.completed;
        debug!(job_id = self.job_id, completed = self.completed, expected = self.expected, "correctness progress");

        if self.completed < self.expected {
            return Ok(None);
        }
        Ok(Some(CorrectnessReport {
            job_id: self.job_id,
            completed: self.completed,
            expected: self.expected,
            checks: status.checks,
        }))
    }

    /// Poll every `poll_interval` until the job is finished. Transport
    /// failures are retried like a stream's.
    pub async fn run(&mut self) -> Result<CorrectnessReport> {
        info!(job_id = self.job_id, expected = self.expected, "watching correctness job");
        let cancel = self.cancel.clone();
        let mut attempt = 0u32;

        loop {
            let pause = match self.poll().await {
                Ok(Some(report)) => {
                    info!(job_id = self.job_id, checks = report.checks.len(), "correctness job complete");
                    return Ok(report);
                }
                Ok(None) => {
                    attempt = 0;
                    self.config.poll_interval()
                }
                Err(e) if e.is_recoverable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(job_id = self.job_id, attempt, "correctness poll failed, retrying: {e}");
                    backoff(self.config.retry_backoff(), attempt)
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled(self.job_id)),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::scripted::ScriptedService;
    use std::time::Duration;

    fn config() -> StreamConfig {
        StreamConfig {
            poll_interval_ms: 1,
            request_timeout_ms: 1_000,
            ..StreamConfig::default()
        }
    }

    fn check(primitive: &str, enc: &str, dec: &str) -> CorrectnessCheck {
        CorrectnessCheck {
            primitive: primitive.into(),
            enc: enc.into(),
            dec: dec.into(),
        }
    }

    fn status(completed: u64) -> CorrectnessStatus {
        CorrectnessStatus {
            checks: vec![check("HKDF", "bc", "bc"), check("AES128GCM", "bc", "jce")],
            completed,
            exception: None,
        }
    }

    #[tokio::test]
    async fn test_runs_until_expected_iterations() {
        let svc = Arc::new(ScriptedService::pages(vec![]).with_correctness(vec![
            Ok(status(0)),
            Ok(status(3)),
            Ok(status(8)),
        ]));
        let mut watcher = CorrectnessWatcher::new(5, svc.clone(), config(), 8);

        let report = watcher.run().await.unwrap();
        assert_eq!(report.completed, 8);
        assert_eq!(report.checks.len(), 2);
        assert_eq!(svc.requests().len(), 3);
        assert!(report.to_string().starts_with("8/8 iterations"));
    }

    #[tokio::test]
    async fn test_exception_stops_the_watch() {
        let svc = Arc::new(ScriptedService::pages(vec![]).with_correctness(vec![
            Ok(status(2)),
            Ok(CorrectnessStatus {
                exception: Some("javax.crypto.AEADBadTagException".into()),
                ..status(4)
            }),
            Ok(status(8)),
        ]));
        let mut watcher = CorrectnessWatcher::new(5, svc.clone(), config(), 8);

        let err = watcher.run().await.unwrap_err();
        assert!(matches!(err, StreamError::JobException { job_id: 5, .. }));
        assert_eq!(watcher.completed(), 2);
        assert_eq!(svc.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_counter_going_back_is_malformed() {
        let svc = Arc::new(
            ScriptedService::pages(vec![]).with_correctness(vec![Ok(status(6)), Ok(status(2))]),
        );
        let mut watcher = CorrectnessWatcher::new(1, svc, config(), 10);
        assert!(watcher.poll().await.unwrap().is_none());
        let err = watcher.poll().await.unwrap_err();
        assert!(err.to_string().contains("from 6 to 2"));
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let svc = Arc::new(ScriptedService::pages(vec![]).with_correctness(vec![
            Err(StreamError::Transport("503".into())),
            Ok(status(4)),
        ]));
        let mut cfg = config();
        cfg.max_retries = 1;
        cfg.retry_backoff_ms = 1;
        let mut watcher = CorrectnessWatcher::new(1, svc.clone(), cfg, 4);
        assert_eq!(watcher.run().await.unwrap().completed, 4);

        // script exhausted: transport errors with no retries left
        let mut watcher = CorrectnessWatcher::new(1, svc, config(), 4);
        assert!(watcher.run().await.unwrap_err().is_recoverable());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_the_wait() {
        let svc = Arc::new(
            ScriptedService::pages(vec![])
                .with_correctness(vec![Ok(status(1))])
                .with_delay(Duration::from_secs(5)),
        );
        let mut watcher = CorrectnessWatcher::new(2, svc, config(), 10);
        let cancel = watcher.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(watcher.run().await.unwrap_err(), StreamError::Cancelled(2));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
