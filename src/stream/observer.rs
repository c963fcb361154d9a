use crate::error::StreamError;
use crate::metrics::{FinalReport, LiveLatency, VisualizationBuffer};

use super::state::StreamState;

/// Everything a renderer may read after a page has been applied.
/// Borrowed: the consumer is not mutating anything while this exists.
pub struct RefreshView<'a> {
    pub job_id: u64,
    pub state: &'a StreamState,
    pub buffer: &'a VisualizationBuffer,
    pub live: &'a LiveLatency,
}

/// Callbacks a consumer fires while it streams one job.
pub trait StreamObserver: Send {
    /// After every page, empty and rejected pages included.
    fn on_refresh(&mut self, _view: &RefreshView<'_>) {}

    /// Once, with the final report.
    fn on_complete(&mut self, _job_id: u64, _report: &FinalReport) {}

    /// Once, when the stream stops on an error: a job exception or a
    /// rejected page as soon as it is seen, anything else when `run` gives up.
    fn on_error(&mut self, _job_id: u64, _err: &StreamError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}
