pub mod consumer;
pub mod observer;
pub mod state;

pub use consumer::StreamConsumer;
pub use observer::{NoopObserver, RefreshView, StreamObserver};
pub use state::{CancelHandle, StreamState, StreamStatus};
