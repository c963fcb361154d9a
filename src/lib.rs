//! Client for a remote benchmark-execution service.
//!
//! Streams a job's timing samples page by page (resumable, duplicate-free,
//! cancellable), keeps a bounded window of recent latencies for live charts,
//! and reduces the full sample set into exact latency and throughput
//! statistics once the job is done. Correctness jobs, which only report
//! provider cross-checks, are watched until they finish.
//!
//! ```ignore
//! let service = Arc::new(HttpJobService::new("http://127.0.0.1:8080")?);
//! let mut consumer = StreamConsumer::new(job_id, service, StreamConfig::default());
//! let report = consumer.run().await?;
//! println!("{report}");
//! ```

pub mod board;
pub mod config;
pub mod correctness;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod runner;
pub mod server;
pub mod service;
pub mod stream;

pub use board::{BoardObserver, JobSnapshot, LiveBoard};
pub use config::StreamConfig;
pub use correctness::{CorrectnessReport, CorrectnessWatcher};
pub use error::{Result, StreamError};
pub use metrics::{reduce, FinalReport, Sample};
pub use runner::{JobHandle, JobOutcome, JobRunner, JobSpec};
pub use service::{CorrectnessParams, HttpJobService, JobParams, ResultPage, ResultService};
pub use stream::{CancelHandle, StreamConsumer, StreamObserver, StreamState, StreamStatus};
