use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Where a job's stream stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Still polling
    Active,
    /// Every sample up to `total` has been consumed
    Done,
    /// The job reported an exception, or sent a page we had to reject
    Failed,
}

/// Per-job progress through the result stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamState {
    /// Samples consumed so far; also the next offset to request
    pub cursor: u64,
    /// Last total the server reported, once it knows it
    pub total: Option<u64>,
    pub done: bool,
    pub error: Option<String>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StreamStatus {
        match (self.done, self.error.is_some()) {
            (false, _) => StreamStatus::Active,
            (true, false) => StreamStatus::Done,
            (true, true) => StreamStatus::Failed,
        }
    }

    /// Terminal: no further request may be issued.
    pub(crate) fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.done = true;
    }

    /// Done once the server has a total and we have caught up with it.
    pub(crate) fn advance(&mut self, consumed: u64, total: Option<u64>) {
        self.cursor += consumed;
        if total.is_some() {
            self.total = total;
        }
        if self.total == Some(self.cursor) {
            self.done = true;
        }
    }
}

/// Shared cancel flag for one job (or a group of jobs).
///
/// Clones share the flag. The consumer checks it before every poll and
/// races it against the request in flight and any retry sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let mut state = StreamState::new();
        assert_eq!(state.status(), StreamStatus::Active);

        state.advance(10, None);
        assert_eq!(state.status(), StreamStatus::Active);

        state.advance(5, Some(15));
        assert_eq!(state.cursor, 15);
        assert_eq!(state.status(), StreamStatus::Done);
    }

    #[test]
    fn test_total_is_sticky() {
        let mut state = StreamState::new();
        state.advance(3, Some(10));
        state.advance(7, None);
        assert_eq!(state.total, Some(10));
        assert!(state.done);
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut state = StreamState::new();
        state.advance(4, None);
        state.fail("boom".into());
        assert_eq!(state.status(), StreamStatus::Failed);
        assert_eq!(state.cursor, 4);
    }

    #[test]
    fn test_cancel_is_shared() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
