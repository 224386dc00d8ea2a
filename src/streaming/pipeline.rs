//! Session orchestration: admission-time creation and the per-session
//! streaming pipeline.
//!
//! The pipeline is strictly sequential within a session: one outstanding
//! provider pull, one transcode, one transport send. Back-pressure comes
//! from the transport send; the provider channel holds a single chunk, so
//! nothing buffers between the transcoder and the wire.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::core::audio::AudioFormat;
use crate::core::breaker::CircuitBreakerRegistry;
use crate::core::providers::{ProviderError, ProviderRegistry, SynthesisRequest, TtsProvider};
use crate::core::transcode::TranscodeService;
use crate::errors::{AdmissionError, StreamError};
use crate::metrics::GatewayMetrics;
use crate::session::{Session, SessionStatus, SessionStore};
use crate::transport::{StreamFrame, StreamTransport, close_code};

use super::queue::SessionWorkItem;

/// Request body for creating a new streaming session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Provider id, e.g. `mock_tone`.
    pub provider: String,
    /// Voice id within the gateway catalog.
    pub voice: String,
    /// Text to synthesize.
    pub text: String,
    /// Desired output format name, e.g. `pcm16`.
    pub target_format: String,
    /// Desired output sample rate.
    pub sample_rate_hz: u32,
    /// Optional BCP-47 language tag, e.g. `en-US`.
    #[serde(default)]
    pub language: Option<String>,
}

/// Streaming-side tunables, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Per-chunk provider pull timeout.
    pub chunk_timeout: Duration,
    /// Total synthesis attempts before the first byte is sent.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base: Duration,
    /// Reject voices that do not belong to the requested provider.
    pub strict_voice_provider: bool,
}

impl StreamSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            chunk_timeout: Duration::from_millis(config.provider_chunk_timeout_ms),
            max_attempts: config.provider_max_attempts,
            retry_base: Duration::from_millis(config.provider_retry_base_ms),
            strict_voice_provider: config.voice_provider_strict,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_base: Duration::from_millis(100),
            strict_voice_provider: false,
        }
    }
}

/// Orchestrates session creation and drives per-session pipelines.
pub struct TtsService {
    registry: Arc<ProviderRegistry>,
    sessions: Arc<SessionStore>,
    transcoder: Arc<TranscodeService>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<GatewayMetrics>,
    settings: StreamSettings,
    shutdown: CancellationToken,
}

impl TtsService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        sessions: Arc<SessionStore>,
        transcoder: Arc<TranscodeService>,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<GatewayMetrics>,
        settings: StreamSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            sessions,
            transcoder,
            breakers,
            metrics,
            settings,
            shutdown,
        }
    }

    /// Validate a session request and persist a pending session.
    pub fn create_session(&self, req: &CreateSessionRequest) -> Result<Session, AdmissionError> {
        let text = req.text.trim();
        if text.is_empty() {
            return Err(AdmissionError::Validation(
                "text must not be empty".to_string(),
            ));
        }
        if !self.registry.contains(&req.provider) {
            return Err(AdmissionError::UnknownProvider(req.provider.clone()));
        }
        let catalog_entry = self
            .registry
            .find_voice(&req.voice)
            .ok_or_else(|| AdmissionError::UnknownVoice(req.voice.clone()))?;
        if self.settings.strict_voice_provider && catalog_entry.provider_id != req.provider {
            return Err(AdmissionError::UnknownVoice(req.voice.clone()));
        }
        let target_format: AudioFormat = req
            .target_format
            .parse()
            .map_err(|e: crate::core::audio::UnknownFormat| {
                AdmissionError::Validation(e.to_string())
            })?;
        if !self.transcoder.supports(target_format) {
            return Err(AdmissionError::Validation(format!(
                "unsupported target_format '{target_format}'"
            )));
        }
        if req.sample_rate_hz == 0 || req.sample_rate_hz > 192_000 {
            return Err(AdmissionError::Validation(
                "sample_rate_hz must be in (0, 192000]".to_string(),
            ));
        }

        let session = Session::new(
            req.provider.clone(),
            req.voice.clone(),
            req.language.clone(),
            text.to_string(),
            target_format,
            req.sample_rate_hz,
        );
        self.sessions.insert(session.clone());
        GatewayMetrics::inc(&self.metrics.sessions_created_total);
        info!(
            session_id = %session.id,
            provider = %session.provider_id,
            voice = %session.voice_id,
            format = %session.target_format,
            "session created"
        );
        Ok(session)
    }

    /// Drive a dequeued work item to its terminal state, closing the
    /// transport on every exit path.
    pub async fn run(&self, item: SessionWorkItem) {
        let SessionWorkItem {
            session_id,
            mut transport,
            cancel,
        } = item;

        // Client may have disconnected while the item sat in the queue.
        if cancel.is_cancelled() {
            info!(session_id, "client gone before streaming started");
            if self
                .sessions
                .update_status(&session_id, SessionStatus::Cancelled, Some("client_cancelled"))
                .is_ok()
            {
                GatewayMetrics::inc(&self.metrics.sessions_cancelled_total);
            }
            transport.close(close_code::NORMAL).await;
            return;
        }

        match self.stream(&session_id, transport.as_mut(), &cancel).await {
            Ok(frames) => {
                let _ = self
                    .sessions
                    .update_status(&session_id, SessionStatus::Completed, None);
                GatewayMetrics::inc(&self.metrics.sessions_completed_total);
                info!(session_id, frames, "session completed");
                transport.close(close_code::NORMAL).await;
            }
            Err(err) => {
                self.finish_with_error(&session_id, transport.as_mut(), err)
                    .await;
            }
        }
    }

    async fn finish_with_error(
        &self,
        session_id: &str,
        transport: &mut dyn StreamTransport,
        err: StreamError,
    ) {
        match err {
            StreamError::Cancelled => {
                let _ = self.sessions.update_status(
                    session_id,
                    SessionStatus::Cancelled,
                    Some(err.failure_reason()),
                );
                GatewayMetrics::inc(&self.metrics.sessions_cancelled_total);
                info!(session_id, "session cancelled by client");
            }
            StreamError::UnknownSession(_) | StreamError::AlreadyConsumed(_) => {
                // The session record is not ours to move; just report.
                if let Some(frame) = err.terminal_frame() {
                    let _ = transport.send(frame).await;
                }
                warn!(session_id, error = %err, "stream request rejected");
            }
            ref other => {
                if let Some(frame) = other.terminal_frame() {
                    let _ = transport.send(frame).await;
                }
                let _ = self.sessions.update_status(
                    session_id,
                    SessionStatus::Failed,
                    Some(other.failure_reason()),
                );
                GatewayMetrics::inc(&self.metrics.sessions_failed_total);
                warn!(session_id, error = %other, "session failed");
            }
        }
        transport.close(err.close_code()).await;
    }

    /// Run the pipeline for one session. Returns the number of audio
    /// frames delivered on success (the `eos` frame has been sent).
    async fn stream(
        &self,
        session_id: &str,
        transport: &mut dyn StreamTransport,
        cancel: &CancellationToken,
    ) -> Result<u32, StreamError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| StreamError::UnknownSession(session_id.to_string()))?;

        // Claim streaming ownership; losing the race means another worker
        // (or a replayed connect) already consumed the session.
        self.sessions
            .update_status(session_id, SessionStatus::Streaming, None)
            .map_err(|_| StreamError::AlreadyConsumed(session_id.to_string()))?;

        let provider = self.registry.get(&session.provider_id).ok_or_else(|| {
            StreamError::Provider(ProviderError::Request(format!(
                "provider '{}' not registered",
                session.provider_id
            )))
        })?;

        let lease = self
            .breakers
            .permit(&session.provider_id)
            .map_err(|_| StreamError::CircuitOpen)?;

        let result = match self.pump(&session, provider.as_ref(), transport, cancel).await {
            Ok(frames) => match transport.send(StreamFrame::Eos).await {
                Ok(()) => Ok(frames),
                Err(_) => Err(StreamError::Cancelled),
            },
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => lease.record_success(),
            // Client-side cancellation and shutdown are not provider
            // faults; dropping the lease releases it neutrally.
            Err(StreamError::Cancelled) | Err(StreamError::ShuttingDown) => drop(lease),
            Err(_) => lease.record_failure(),
        }
        result
    }

    /// The chunk loop: pull, transcode, send, one chunk at a time.
    async fn pump(
        &self,
        session: &Session,
        provider: &dyn TtsProvider,
        transport: &mut dyn StreamTransport,
        cancel: &CancellationToken,
    ) -> Result<u32, StreamError> {
        let request = SynthesisRequest {
            text: session.text.clone(),
            voice_id: session.voice_id.clone(),
            language: session.language.clone(),
        };

        let mut seq: u32 = 0;
        let mut attempt: u32 = 0;

        'attempt: loop {
            attempt += 1;
            let mut chunks = match provider.stream_synthesize(request.clone()).await {
                Ok(rx) => rx,
                Err(err) => {
                    GatewayMetrics::inc(&self.metrics.provider_failures_total);
                    if seq == 0 && attempt < self.settings.max_attempts {
                        warn!(
                            session_id = %session.id,
                            attempt,
                            error = %err,
                            "provider open failed, retrying"
                        );
                        self.backoff(attempt, cancel).await?;
                        continue 'attempt;
                    }
                    return Err(StreamError::Provider(err));
                }
            };

            loop {
                let pulled = tokio::select! {
                    _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                    _ = self.shutdown.cancelled() => return Err(StreamError::ShuttingDown),
                    pulled = tokio::time::timeout(self.settings.chunk_timeout, chunks.recv()) => pulled,
                };

                let chunk = match pulled {
                    // Per-chunk timeout counts as a provider failure.
                    Err(_elapsed) => {
                        GatewayMetrics::inc(&self.metrics.provider_failures_total);
                        if seq == 0 && attempt < self.settings.max_attempts {
                            warn!(
                                session_id = %session.id,
                                attempt,
                                "provider chunk pull timed out, retrying"
                            );
                            self.backoff(attempt, cancel).await?;
                            continue 'attempt;
                        }
                        if seq > 0 {
                            return Err(StreamError::ProviderMidStream);
                        }
                        return Err(StreamError::Provider(ProviderError::Timeout));
                    }
                    // Natural exhaustion.
                    Ok(None) => return Ok(seq),
                    Ok(Some(Err(err))) => {
                        GatewayMetrics::inc(&self.metrics.provider_failures_total);
                        if seq == 0 && attempt < self.settings.max_attempts {
                            warn!(
                                session_id = %session.id,
                                attempt,
                                error = %err,
                                "provider failed before first frame, retrying"
                            );
                            self.backoff(attempt, cancel).await?;
                            continue 'attempt;
                        }
                        if seq > 0 {
                            // No duplicated audio: once bytes are out we
                            // never restart synthesis.
                            return Err(StreamError::ProviderMidStream);
                        }
                        return Err(StreamError::Provider(err));
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                if cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }

                let encoded = self
                    .transcoder
                    .transcode_chunk(chunk, session.target_format, session.target_sample_rate_hz)
                    .await?;

                if cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }

                seq += 1;
                transport
                    .send(StreamFrame::audio(seq, &encoded))
                    .await
                    .map_err(|_| StreamError::Cancelled)?;
                GatewayMetrics::inc(&self.metrics.stream_chunks_total);
                GatewayMetrics::add(&self.metrics.stream_bytes_total, encoded.len() as u64);
            }
        }
    }

    async fn backoff(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), StreamError> {
        let delay = self.settings.retry_base * 2u32.saturating_pow(attempt.saturating_sub(1));
        tokio::select! {
            _ = cancel.cancelled() => Err(StreamError::Cancelled),
            _ = self.shutdown.cancelled() => Err(StreamError::ShuttingDown),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
