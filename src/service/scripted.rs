//! In-memory job service for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    Catalog, CorrectnessParams, CorrectnessStatus, JobParams, ResultPage, ResultService,
    StartedJob,
};
use crate::error::{Result, StreamError};
use crate::metrics::Sample;
use crate::stream::CancelHandle;

enum Source {
    /// Replay canned responses in order
    Script(VecDeque<Result<ResultPage>>),
    /// Serve slices of a finished job with a known total
    Job(Vec<Sample>),
}

pub(crate) struct ScriptedService {
    source: Mutex<Source>,
    requests: Mutex<Vec<(u64, u64, u64)>>,
    correctness: Mutex<VecDeque<Result<CorrectnessStatus>>>,
    delay: Option<Duration>,
    cancel_on_request: Option<CancelHandle>,
}

impl ScriptedService {
    pub fn pages(pages: Vec<Result<ResultPage>>) -> Self {
        Self::from_source(Source::Script(pages.into()))
    }

    pub fn job(samples: Vec<Sample>) -> Self {
        Self::from_source(Source::Job(samples))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source: Mutex::new(source),
            requests: Mutex::new(Vec::new()),
            correctness: Mutex::new(VecDeque::new()),
            delay: None,
            cancel_on_request: None,
        }
    }

    /// Replay these correctness polls in order.
    pub fn with_correctness(self, polls: Vec<Result<CorrectnessStatus>>) -> Self {
        *self.correctness.lock() = polls.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancel `handle` while a request is in flight.
    pub fn cancelling(mut self, handle: CancelHandle) -> Self {
        self.cancel_on_request = Some(handle);
        self
    }

    /// `(job_id, offset, count)` of every request received.
    pub fn requests(&self) -> Vec<(u64, u64, u64)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ResultService for ScriptedService {
    async fn result_page(&self, job_id: u64, offset: u64, count: u64) -> Result<ResultPage> {
        self.requests.lock().push((job_id, offset, count));
        if let Some(handle) = &self.cancel_on_request {
            handle.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &mut *self.source.lock() {
            Source::Script(pages) => pages
                .pop_front()
                .unwrap_or_else(|| Err(StreamError::Transport("script exhausted".into()))),
            Source::Job(samples) => {
                let len = samples.len() as u64;
                let from = offset.min(len) as usize;
                let to = (offset + count).min(len) as usize;
                Ok(ResultPage::new(Some(len), samples[from..to].to_vec()))
            }
        }
    }

    async fn start_job(&self, params: &JobParams) -> Result<StartedJob> {
        Ok(StartedJob {
            id: 1,
            summary: format!("perf {} using {}", params.primitive, params.provider),
        })
    }

    async fn list_catalog(&self) -> Result<Catalog> {
        Ok(Catalog::default())
    }

    async fn start_correctness(&self, params: &CorrectnessParams) -> Result<StartedJob> {
        Ok(StartedJob {
            id: 1,
            summary: format!(
                "correctness ({} iterations, {} threads)",
                params.iterations, params.threads
            ),
        })
    }

    async fn correctness_result(&self, job_id: u64) -> Result<CorrectnessStatus> {
        self.requests.lock().push((job_id, 0, 0));
        if let Some(handle) = &self.cancel_on_request {
            handle.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.correctness
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StreamError::Transport("script exhausted".into())))
    }
}
