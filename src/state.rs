//! Application state shared across handlers.
//!
//! Every component is an injected dependency assembled here at startup;
//! nothing holds process-level static state, so tests can build as many
//! independent gateways as they like.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::core::breaker::{BreakerConfig, CircuitBreakerRegistry};
use crate::core::providers::{
    HttpSpeechProvider, MockToneProvider, ProviderRegistry, TtsProvider,
};
use crate::core::rate_limit::{RateLimitConfig, RateLimiter};
use crate::core::transcode::TranscodeService;
use crate::metrics::GatewayMetrics;
use crate::session::SessionStore;
use crate::streaming::{StreamSettings, StreamingQueue, TtsService, WorkerPool};

pub struct AppState {
    pub config: GatewayConfig,
    pub registry: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub transcoder: Arc<TranscodeService>,
    pub metrics: Arc<GatewayMetrics>,
    pub tts: Arc<TtsService>,
    pub queue: StreamingQueue,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire up all components and start the streaming workers. The
    /// returned [`WorkerPool`] must be shut down when the server stops.
    pub async fn new(config: GatewayConfig) -> (Arc<Self>, WorkerPool) {
        let metrics = Arc::new(GatewayMetrics::new());

        let mut providers: Vec<Arc<dyn TtsProvider>> = Vec::new();
        if config.mock_tone_enabled {
            providers.push(Arc::new(MockToneProvider::default()));
        }
        if let Some(ref http_config) = config.http_speech {
            providers.push(Arc::new(HttpSpeechProvider::new(http_config.clone())));
        }
        let registry = Arc::new(ProviderRegistry::from_providers(providers).await);

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(
            config.session_retention_seconds,
        )));
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests_per_window: config.rate_limit_max_requests_per_window,
            window: Duration::from_secs(config.rate_limit_window_seconds),
        }));
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            reset_timeout: Duration::from_secs(config.circuit_reset_timeout_seconds),
            half_open_max_trials: config.circuit_half_open_max_trials,
        }));
        let transcoder = Arc::new(TranscodeService::new());
        let shutdown = CancellationToken::new();

        let tts = Arc::new(TtsService::new(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            Arc::clone(&transcoder),
            Arc::clone(&breakers),
            Arc::clone(&metrics),
            StreamSettings::from_config(&config),
            shutdown.clone(),
        ));

        let (queue, receiver) = StreamingQueue::new(config.session_queue_maxsize, Arc::clone(&metrics));
        let pool = WorkerPool::spawn(
            config.session_queue_worker_count,
            receiver,
            queue.clone(),
            Arc::clone(&tts),
            Arc::clone(&metrics),
            shutdown.clone(),
        );

        let state = Arc::new(Self {
            config,
            registry,
            sessions,
            rate_limiter,
            breakers,
            transcoder,
            metrics,
            tts,
            queue,
            shutdown,
        });
        (state, pool)
    }
}
