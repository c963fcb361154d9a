use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::board::LiveBoard;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::metrics::FinalReport;
use crate::service::ResultService;
use crate::stream::{CancelHandle, StreamConsumer};

/// A job the runner should stream.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: u64,
    pub summary: String,
    /// Chart window; usually `min(iterations * threads, 50_000)`
    pub window: usize,
}

/// How one job's stream ended.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: u64,
    pub result: Result<FinalReport>,
    /// Report over the samples received before the stream stopped, if any
    pub partial: Option<FinalReport>,
    /// The stopped consumer, handed back after a recoverable failure so
    /// [`JobRunner::resume`] can continue from its cursor
    pub resume: Option<StreamConsumer>,
}

impl JobOutcome {
    pub fn is_resumable(&self) -> bool {
        self.resume.is_some()
    }
}

/// A spawned stream: its cancel flag and the task producing the outcome.
pub struct JobHandle {
    pub job_id: u64,
    pub cancel: CancelHandle,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Wait for the stream to finish. A panicking task is reported as
    /// [`StreamError::Task`] for this job only.
    pub async fn join(self) -> JobOutcome {
        let job_id = self.job_id;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome {
                job_id,
                result: Err(StreamError::Task {
                    job_id,
                    message: e.to_string(),
                }),
                partial: None,
                resume: None,
            },
        }
    }
}

/// Streams any number of jobs concurrently, one Tokio task per job.
///
/// Jobs share the service client and the live board, nothing else: each
/// task owns its consumer (state, buffer, accumulator).
#[derive(Clone)]
pub struct JobRunner {
    service: Arc<dyn ResultService>,
    config: StreamConfig,
    board: Arc<LiveBoard>,
}

impl JobRunner {
    pub fn new(service: Arc<dyn ResultService>, config: StreamConfig, board: Arc<LiveBoard>) -> Self {
        Self {
            service,
            config,
            board,
        }
    }

    pub fn board(&self) -> &Arc<LiveBoard> {
        &self.board
    }

    pub fn spawn(&self, spec: JobSpec) -> JobHandle {
        self.spawn_with_cancel(spec, CancelHandle::new())
    }

    /// Like [`spawn`](Self::spawn), but the job obeys an existing cancel flag.
    pub fn spawn_with_cancel(&self, spec: JobSpec, cancel: CancelHandle) -> JobHandle {
        let observer = self.board.register(spec.job_id, spec.summary.clone());

        let mut config = self.config.clone();
        config.window = spec.window.min(config.window).max(1);

        let consumer = StreamConsumer::new(spec.job_id, self.service.clone(), config)
            .with_observer(observer)
            .with_cancel(cancel);

        info!(job_id = spec.job_id, summary = %spec.summary, "spawning stream");
        launch(consumer)
    }

    /// Continue a stream that stopped on a recoverable failure. The
    /// consumer keeps its cursor, samples, observer and cancel flag.
    pub fn resume(&self, consumer: StreamConsumer) -> JobHandle {
        info!(
            job_id = consumer.job_id(),
            cursor = consumer.state().cursor,
            "resuming stream"
        );
        launch(consumer)
    }

    /// Stream every job and wait for all of them. Results come back in the
    /// order of `specs`; one job failing does not affect the others.
    /// Cancelling `cancel_all` stops every job.
    pub async fn run_all(
        &self,
        specs: Vec<JobSpec>,
        cancel_all: CancelHandle,
    ) -> Vec<JobOutcome> {
        let handles: Vec<JobHandle> = specs
            .into_iter()
            .map(|s| self.spawn_with_cancel(s, cancel_all.clone()))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for h in handles {
            outcomes.push(h.join().await);
        }
        outcomes
    }
}

fn launch(mut consumer: StreamConsumer) -> JobHandle {
    let job_id = consumer.job_id();
    let cancel = consumer.cancel_handle();
    let task = tokio::spawn(async move {
        let result = consumer.run().await;
        // Samples delivered before the stream stopped are still valid
        let partial = match &result {
            Err(_) if !consumer.accumulator().is_empty() => consumer.accumulator().reduce().ok(),
            _ => None,
        };
        let resume = match &result {
            Err(e) if e.is_recoverable() => Some(consumer),
            _ => None,
        };
        JobOutcome {
            job_id,
            result,
            partial,
            resume,
        }
    });

    JobHandle {
        job_id,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Sample;
    use crate::service::scripted::ScriptedService;
    use crate::service::ResultPage;
    use crate::stream::StreamStatus;
    use std::time::Duration;

    fn config() -> StreamConfig {
        StreamConfig {
            page_size: 10,
            ..StreamConfig::default()
        }
    }

    fn spec(job_id: u64) -> JobSpec {
        JobSpec {
            job_id,
            summary: format!("job {job_id}"),
            window: 5,
        }
    }

    #[tokio::test]
    async fn test_spawned_job_reports_to_board() {
        let samples: Vec<Sample> = (0..35).map(|i| Sample::new(i, i + 2)).collect();
        let svc = Arc::new(ScriptedService::job(samples));
        let runner = JobRunner::new(svc, config(), Arc::new(LiveBoard::new()));

        let outcome = runner.spawn(spec(7)).join().await;
        assert_eq!(outcome.job_id, 7);
        let report = outcome.result.unwrap();
        assert_eq!(report.latency.count, 35);

        let snap = runner.board().snapshot(7).unwrap();
        assert_eq!(snap.status, StreamStatus::Done);
        assert_eq!(snap.cursor, 35);
        assert_eq!(snap.points.len(), 6);
        assert!(snap.report.is_some());
    }

    #[tokio::test]
    async fn test_jobs_fail_independently() {
        let ok = Arc::new(ScriptedService::job(vec![Sample::new(0, 1); 20]));
        let bad = Arc::new(ScriptedService::pages(vec![
            Ok(ResultPage::new(None, vec![Sample::new(0, 8); 3])),
            Ok(ResultPage::failed("oom")),
        ]));
        let board = Arc::new(LiveBoard::new());

        let a = JobRunner::new(ok, config(), board.clone()).spawn(spec(1));
        let b = JobRunner::new(bad, config(), board.clone()).spawn(spec(2));

        let a = a.join().await;
        assert!(a.result.is_ok());
        assert!(a.partial.is_none());

        let b = b.join().await;
        assert!(matches!(
            b.result,
            Err(StreamError::JobException { job_id: 2, .. })
        ));
        assert!(!b.is_resumable());
        assert_eq!(b.partial.unwrap().latency.count, 3);
        assert_eq!(board.snapshot(1).unwrap().status, StreamStatus::Done);
        assert_eq!(board.snapshot(2).unwrap().status, StreamStatus::Failed);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_samples_and_resumes() {
        let svc = Arc::new(ScriptedService::pages(vec![
            Ok(ResultPage::new(None, vec![Sample::new(0, 2); 10])),
            Err(StreamError::Transport("connection reset".into())),
            Ok(ResultPage::new(Some(15), vec![Sample::new(5, 9); 5])),
        ]));
        let runner = JobRunner::new(svc.clone(), config(), Arc::new(LiveBoard::new()));

        let mut outcome = runner.spawn(spec(4)).join().await;
        assert_eq!(
            outcome.result.unwrap_err(),
            StreamError::Transport("connection reset".into())
        );
        assert_eq!(outcome.partial.unwrap().latency.count, 10);
        assert_eq!(runner.board().snapshot(4).unwrap().status, StreamStatus::Failed);

        let consumer = outcome.resume.take().unwrap();
        assert_eq!(consumer.state().cursor, 10);

        let resumed = runner.resume(consumer).join().await;
        assert_eq!(resumed.result.unwrap().latency.count, 15);
        assert!(resumed.resume.is_none());
        let offsets: Vec<u64> = svc.requests().iter().map(|r| r.1).collect();
        assert_eq!(offsets, vec![0, 10, 10]);

        let snap = runner.board().snapshot(4).unwrap();
        assert_eq!(snap.status, StreamStatus::Done);
        assert_eq!(snap.cursor, 15);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_every_job() {
        // Never-ending job: total stays unknown
        let pages: Vec<Result<ResultPage>> = (0..1000)
            .map(|_| Ok(ResultPage::new(None, vec![])))
            .collect();
        let svc = Arc::new(ScriptedService::pages(pages).with_delay(Duration::from_millis(5)));
        let runner = JobRunner::new(svc, config(), Arc::new(LiveBoard::new()));

        let cancel_all = CancelHandle::new();
        let trigger = cancel_all.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let outcomes = runner.run_all(vec![spec(1), spec(2)], cancel_all).await;
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert_eq!(outcome.result.unwrap_err(), StreamError::Cancelled(outcome.job_id));
            assert!(outcome.partial.is_none());
            assert!(outcome.resume.is_none());
        }
    }
}
