use thiserror::Error;

/// Result type for streaming and reduction operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Everything that can end (or interrupt) a job's result stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The request failed or timed out before a page was obtained
    #[error("transport error: {0}")]
    Transport(String),

    /// The job reported a failure inside an otherwise valid page
    #[error("job {job_id} failed: {message}")]
    JobException { job_id: u64, message: String },

    /// The page broke the offset/ordering contract
    #[error("malformed page for job {job_id} at offset {offset}: {reason}")]
    MalformedPage {
        job_id: u64,
        offset: u64,
        reason: String,
    },

    /// Nothing to reduce
    #[error("no samples to reduce")]
    EmptyResult,

    /// The caller cancelled the stream
    #[error("job {0} was cancelled")]
    Cancelled(u64),

    /// The task streaming the job panicked or was aborted
    #[error("job {job_id} task failed: {message}")]
    Task { job_id: u64, message: String },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Only transport failures are worth another attempt; everything else
    /// is terminal for the job.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
