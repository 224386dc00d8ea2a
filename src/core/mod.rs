//! Core building blocks: audio primitives, synthesis providers, the
//! transcoder, and the overload-control services (circuit breaker and
//! rate limiter).

pub mod audio;
pub mod breaker;
pub mod providers;
pub mod rate_limit;
pub mod transcode;

// Re-export commonly used types for convenience
pub use audio::{AudioChunk, AudioFormat};
pub use breaker::{BreakerConfig, BreakerLease, BreakerOpen, BreakerState, CircuitBreakerRegistry};
pub use providers::{
    ChunkReceiver, ProviderError, ProviderRegistry, ProviderVoice, SynthesisRequest, TtsProvider,
};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
pub use transcode::{AudioTranscoder, TranscodeError, TranscodeService};
