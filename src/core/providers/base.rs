//! Provider contract shared by all synthesis backends.
//!
//! A provider produces a lazy, finite sequence of [`AudioChunk`]s for one
//! utterance. The sequence is exposed as a bounded channel of results:
//! capacity is 1, so the producer only renders the next chunk once the
//! pipeline has pulled the previous one. The channel closing without an
//! error is natural exhaustion.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::audio::{AudioChunk, AudioFormat};

/// Capacity of the per-session chunk channel. One slot makes the transport
/// send the back-pressure point for the whole pipeline.
pub const CHUNK_CHANNEL_CAPACITY: usize = 1;

/// Lazy chunk sequence handed to the streaming pipeline.
pub type ChunkReceiver = mpsc::Receiver<Result<AudioChunk, ProviderError>>;

/// Metadata for a single voice exposed by a provider.
#[derive(Debug, Clone)]
pub struct ProviderVoice {
    pub id: String,
    pub name: String,
    pub language: String,
    pub sample_rate_hz: u32,
    pub base_format: AudioFormat,
}

/// One utterance to synthesize.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub language: Option<String>,
}

/// Errors surfaced by providers, either when opening a stream or through
/// the chunk channel mid-sequence.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("unknown voice '{0}'")]
    UnknownVoice(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider chunk pull timed out")]
    Timeout,
}

/// Interface for TTS providers that stream audio chunks.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Stable identifier used in session requests and breaker keys.
    fn id(&self) -> &str;

    /// Voices supported by this provider. Called once at startup to build
    /// the gateway-wide catalog.
    async fn list_voices(&self) -> Vec<ProviderVoice>;

    /// Open a chunk sequence for the given request.
    ///
    /// Errors returned here are pre-stream failures and may be retried by
    /// the pipeline; errors delivered through the channel after at least
    /// one chunk are mid-stream failures and terminate the session.
    async fn stream_synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<ChunkReceiver, ProviderError>;
}
