use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::StreamError;
use crate::metrics::{AxisBounds, FinalReport, PercentileSet, Point};
use crate::stream::{RefreshView, StreamObserver, StreamStatus};

/// Complete picture of one job, shipped to the dashboard on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: u64,
    pub summary: String,
    pub status: StreamStatus,
    pub cursor: u64,
    pub total: Option<u64>,

    // Chart data
    pub points: Vec<Point>,
    pub max_value: i64,
    pub axis: AxisBounds,

    /// Approximate, from the running histogram
    pub live: PercentileSet,

    pub error: Option<String>,
    pub report: Option<FinalReport>,
}

impl JobSnapshot {
    fn new(job_id: u64, summary: String) -> Self {
        Self {
            job_id,
            summary,
            status: StreamStatus::Active,
            cursor: 0,
            total: None,
            points: Vec::new(),
            max_value: 0,
            axis: AxisBounds {
                x_min: 0,
                x_max: 0,
                y_min: 0,
                y_max: 0,
            },
            live: PercentileSet::default(),
            error: None,
            report: None,
        }
    }
}

/// Thread-safe registry of job snapshots.
///
/// Stream tasks write through a [`BoardObserver`]; the observatory reads
/// copies. The mutex is the only hand-off point between the two.
#[derive(Default)]
pub struct LiveBoard {
    jobs: Mutex<BTreeMap<u64, JobSnapshot>>,
}

impl LiveBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or reset) a job and return the observer that keeps it current.
    pub fn register(self: &Arc<Self>, job_id: u64, summary: impl Into<String>) -> BoardObserver {
        self.jobs
            .lock()
            .insert(job_id, JobSnapshot::new(job_id, summary.into()));
        BoardObserver {
            job_id,
            board: Arc::clone(self),
        }
    }

    pub fn snapshot(&self, job_id: u64) -> Option<JobSnapshot> {
        self.jobs.lock().get(&job_id).cloned()
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Drop a finished job, e.g. once its report has been written out.
    pub fn remove(&self, job_id: u64) -> Option<JobSnapshot> {
        self.jobs.lock().remove(&job_id)
    }

    fn update(&self, job_id: u64, f: impl FnOnce(&mut JobSnapshot)) {
        if let Some(snap) = self.jobs.lock().get_mut(&job_id) {
            f(snap);
        }
    }
}

/// Observer that mirrors one job's stream onto the [`LiveBoard`].
pub struct BoardObserver {
    job_id: u64,
    board: Arc<LiveBoard>,
}

impl StreamObserver for BoardObserver {
    fn on_refresh(&mut self, view: &RefreshView<'_>) {
        // Copy outside the lock; pages can carry tens of thousands of points
        let points: Vec<Point> = view.buffer.points().copied().collect();
        let axis = view.buffer.axis_bounds(view.state.cursor);
        let live = view.live.percentiles();

        self.board.update(self.job_id, |snap| {
            snap.status = view.state.status();
            snap.cursor = view.state.cursor;
            snap.total = view.state.total;
            snap.points = points;
            snap.max_value = view.buffer.max_value();
            snap.axis = axis;
            snap.live = live;
            snap.error = view.state.error.clone();
        });
    }

    fn on_complete(&mut self, _job_id: u64, report: &FinalReport) {
        let report = report.clone();
        self.board.update(self.job_id, |snap| {
            snap.status = StreamStatus::Done;
            snap.report = Some(report);
        });
    }

    fn on_error(&mut self, _job_id: u64, err: &StreamError) {
        let message = err.to_string();
        self.board.update(self.job_id, |snap| {
            snap.status = StreamStatus::Failed;
            snap.error = Some(message);
        });
    }
}
