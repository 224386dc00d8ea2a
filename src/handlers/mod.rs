//! HTTP and WebSocket endpoint handlers.

pub mod health;
pub mod metrics;
pub mod sessions;
pub mod stream;
pub mod voices;
