use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use super::observer::{NoopObserver, RefreshView, StreamObserver};
use super::state::{CancelHandle, StreamState, StreamStatus};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::metrics::{Accumulator, FinalReport, LiveLatency, VisualizationBuffer};
use crate::service::{ResultPage, ResultService};

/// Pulls one job's results page by page and owns everything derived from
/// them: stream state, live chart buffer, full sample accumulator.
///
/// One consumer per job. Requests are strictly sequential: the next page is
/// asked for only after the previous one has been applied.
pub struct StreamConsumer {
    job_id: u64,
    service: Arc<dyn ResultService>,
    config: StreamConfig,
    state: StreamState,
    buffer: VisualizationBuffer,
    accumulator: Accumulator,
    live: LiveLatency,
    observer: Box<dyn StreamObserver>,
    cancel: CancelHandle,
}

impl StreamConsumer {
    pub fn new(job_id: u64, service: Arc<dyn ResultService>, config: StreamConfig) -> Self {
        let buffer = VisualizationBuffer::new(config.window);
        Self {
            job_id,
            service,
            config,
            state: StreamState::new(),
            buffer,
            accumulator: Accumulator::new(),
            live: LiveLatency::new(),
            observer: Box::new(NoopObserver),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl StreamObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Share an existing cancel flag instead of the consumer's own.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn buffer(&self) -> &VisualizationBuffer {
        &self.buffer
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> Accumulator {
        self.accumulator
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    // ─── One poll ────────────────────────────────────────────────

    /// Request the next page and apply it.
    ///
    /// A no-op once the stream is terminal. Transport failures (timeouts
    /// included) leave the state untouched. Cancelling abandons the request
    /// in flight; a response that still comes back after cancellation is
    /// dropped.
    ///
    /// Job exceptions and rejected pages are reported to the observer here,
    /// so callers driving `poll` themselves see them too.
    pub async fn poll(&mut self) -> Result<StreamStatus> {
        if self.state.done {
            return Ok(self.state.status());
        }
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled(self.job_id));
        }

        let offset = self.state.cursor;
        let count = self.config.page_size;
        let request = tokio::time::timeout(
            self.config.request_timeout(),
            self.service.result_page(self.job_id, offset, count),
        );
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(job_id = self.job_id, offset, "request abandoned after cancel");
                return Err(StreamError::Cancelled(self.job_id));
            }
            fetched = request => fetched,
        };

        if cancel.is_cancelled() {
            debug!(job_id = self.job_id, offset, "discarding page after cancel");
            return Err(StreamError::Cancelled(self.job_id));
        }

        let page = match fetched {
            Ok(page) => page?,
            Err(_) => {
                return Err(StreamError::Transport(format!(
                    "request timed out after {}ms",
                    self.config.request_timeout_ms
                )))
            }
        };

        self.apply(page)
    }

    fn apply(&mut self, mut page: ResultPage) -> Result<StreamStatus> {
        if let Some(message) = page.exception.take() {
            warn!(job_id = self.job_id, cursor = self.state.cursor, "job reported exception");
            self.state.fail(message.clone());
            self.refresh();
            self.observer.on_error(
                self.job_id,
                &StreamError::JobException {
                    job_id: self.job_id,
                    message,
                },
            );
            return Ok(self.state.status());
        }

        if let Err(reason) = self.check_page(&page) {
            let err = StreamError::MalformedPage {
                job_id: self.job_id,
                offset: self.state.cursor,
                reason,
            };
            error!(job_id = self.job_id, "page rejected: {err}");
            self.state.fail(err.to_string());
            self.refresh();
            self.observer.on_error(self.job_id, &err);
            return Err(err);
        }

        let received = page.samples.len() as u64;
        let mut index = self.state.cursor;
        for sample in page.samples {
            let latency = sample.latency();
            self.buffer.push(index, latency);
            self.live.record(latency);
            self.accumulator.push(sample);
            index += 1;
        }
        self.state.advance(received, page.total);

        debug!(
            job_id = self.job_id,
            received,
            cursor = self.state.cursor,
            total = ?self.state.total,
            "page applied"
        );
        self.refresh();
        Ok(self.state.status())
    }

    /// Offset/ordering contract: no more than asked for, never past a known
    /// total, total never shrinks, no negative latencies.
    fn check_page(&self, page: &ResultPage) -> std::result::Result<(), String> {
        let received = page.samples.len() as u64;
        if received > self.config.page_size {
            return Err(format!(
                "{received} samples returned, at most {} requested",
                self.config.page_size
            ));
        }

        if let Some(prev) = self.state.total {
            match page.total {
                Some(t) if t < prev => {
                    return Err(format!("total decreased from {prev} to {t}"))
                }
                None => return Err(format!("total {prev} became unknown")),
                _ => {}
            }
        }

        if let Some(total) = page.total {
            if self.state.cursor + received > total {
                return Err(format!(
                    "{received} samples at offset {} run past total {total}",
                    self.state.cursor
                ));
            }
        }

        if let Some(i) = page.samples.iter().position(|s| s.latency() < 0) {
            return Err(format!("sample {i} ends before it starts"));
        }

        Ok(())
    }

    fn refresh(&mut self) {
        self.observer.on_refresh(&RefreshView {
            job_id: self.job_id,
            state: &self.state,
            buffer: &self.buffer,
            live: &self.live,
        });
    }

    // ─── Full run ────────────────────────────────────────────────

    /// Poll until the job is done, then reduce.
    ///
    /// Transport failures are retried up to `max_retries` times with
    /// exponential backoff. Once retries are used up the error is returned
    /// with the cursor intact, so calling `run` again resumes where the
    /// stream stopped. After a job exception the samples received so far
    /// stay available through [`accumulator`](Self::accumulator).
    pub async fn run(&mut self) -> Result<FinalReport> {
        info!(
            job_id = self.job_id,
            page_size = self.config.page_size,
            window = self.buffer.window(),
            "streaming results"
        );

        let cancel = self.cancel.clone();
        let mut attempt = 0u32;
        while !self.state.done {
            match self.poll().await {
                Ok(_) => attempt = 0,
                Err(e) if e.is_recoverable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = backoff(self.config.retry_backoff(), attempt);
                    warn!(
                        job_id = self.job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "poll failed, retrying: {e}"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(self.stop_with(StreamError::Cancelled(self.job_id)));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                // apply() has already told the observer
                Err(e @ StreamError::MalformedPage { .. }) => return Err(e),
                Err(e) => return Err(self.stop_with(e)),
            }
        }

        if let Some(message) = self.state.error.clone() {
            return Err(StreamError::JobException {
                job_id: self.job_id,
                message,
            });
        }

        let report = self.accumulator.reduce().map_err(|e| self.stop_with(e))?;
        info!(
            job_id = self.job_id,
            samples = report.latency.count,
            p99_ms = report.latency.p99,
            throughput = report.throughput.total,
            "job complete"
        );
        self.observer.on_complete(self.job_id, &report);
        Ok(report)
    }

    fn stop_with(&mut self, err: StreamError) -> StreamError {
        match &err {
            StreamError::Cancelled(_) => info!(job_id = self.job_id, "stream cancelled"),
            _ => error!(job_id = self.job_id, cursor = self.state.cursor, "stream stopped: {err}"),
        }
        self.observer.on_error(self.job_id, &err);
        err
    }
}

impl fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("job_id", &self.job_id)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("accumulated", &self.accumulator.len())
            .finish_non_exhaustive()
    }
}

/// `base * 2^(attempt-1)` plus up to half of `base` of jitter.
pub(crate) fn backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exp = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let jitter = if base_ms > 1 {
        rand::thread_rng().gen_range(0..=base_ms / 2)
    } else {
        0
    };
    Duration::from_millis(exp + jitter)
}
