pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod session;
pub mod state;
pub mod streaming;
pub mod transport;

// Re-export commonly used items for convenience
pub use config::GatewayConfig;
pub use errors::{AdmissionError, StreamError};
pub use metrics::GatewayMetrics;
pub use state::AppState;
pub use streaming::{CreateSessionRequest, SessionWorkItem, StreamingQueue, TtsService, WorkerPool};
