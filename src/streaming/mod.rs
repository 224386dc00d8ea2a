//! Streaming side of the gateway: the bounded session queue, the worker
//! pool that drains it, and the per-session pipeline driver.

pub mod pipeline;
pub mod queue;

pub use pipeline::{CreateSessionRequest, StreamSettings, TtsService};
pub use queue::{SessionWorkItem, StreamingQueue, WorkerPool};
