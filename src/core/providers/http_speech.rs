//! HTTP synthesis adapter.
//!
//! Talks to an external speech server over a one-shot REST call: the full
//! utterance is POSTed, the response body is raw PCM16 at the server's
//! native rate, and the bytes are re-streamed to the pipeline as ~100 ms
//! chunks. Provider-side latency before the first chunk is accepted; the
//! gateway's own streaming guarantees start at the chunk channel.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::audio::{AudioChunk, AudioFormat};

use super::base::{
    CHUNK_CHANNEL_CAPACITY, ChunkReceiver, ProviderError, ProviderVoice, SynthesisRequest,
    TtsProvider,
};

const CHUNK_DURATION_S: f32 = 0.1;

/// Configuration for the HTTP speech backend.
#[derive(Debug, Clone)]
pub struct HttpSpeechConfig {
    /// Synthesis endpoint, e.g. `http://speech-server:5002/api/tts`.
    pub url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Voice id advertised in the catalog.
    pub voice_id: String,
    /// Language tag advertised in the catalog.
    pub language: String,
    /// Sample rate of the PCM16 returned by the server.
    pub sample_rate_hz: u32,
}

pub struct HttpSpeechProvider {
    config: HttpSpeechConfig,
    client: reqwest::Client,
    voices: Vec<ProviderVoice>,
}

impl HttpSpeechProvider {
    pub const ID: &'static str = "http_speech";

    pub fn new(config: HttpSpeechConfig) -> Self {
        let voices = vec![ProviderVoice {
            id: config.voice_id.clone(),
            name: format!("HTTP Speech ({})", config.voice_id),
            language: config.language.clone(),
            sample_rate_hz: config.sample_rate_hz,
            base_format: AudioFormat::Pcm16,
        }];
        Self {
            config,
            client: reqwest::Client::new(),
            voices,
        }
    }

    fn build_request(&self, request: &SynthesisRequest) -> reqwest::RequestBuilder {
        let body = json!({
            "text": request.text,
            "voice": request.voice_id,
            "language": request.language.as_deref().unwrap_or(&self.config.language),
        });
        let mut builder = self.client.post(&self.config.url).json(&body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait::async_trait]
impl TtsProvider for HttpSpeechProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn list_voices(&self) -> Vec<ProviderVoice> {
        self.voices.clone()
    }

    async fn stream_synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<ChunkReceiver, ProviderError> {
        let http_request = self.build_request(&request);
        let sample_rate = self.config.sample_rate_hz;
        let chunk_size = ((sample_rate as f32 * 2.0 * CHUNK_DURATION_S) as usize).max(1024);

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let response = match http_request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Request(e.to_string()))).await;
                    return;
                }
            };
            let status = response.status();
            if !status.is_success() {
                let _ = tx
                    .send(Err(ProviderError::Synthesis(format!(
                        "speech server returned {status}"
                    ))))
                    .await;
                return;
            }
            let pcm = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Request(e.to_string()))).await;
                    return;
                }
            };
            debug!(bytes = pcm.len(), "http speech synthesis complete");

            let mut offset = 0;
            while offset < pcm.len() {
                let end = (offset + chunk_size).min(pcm.len());
                let chunk = AudioChunk::pcm16(pcm.slice(offset..end), sample_rate);
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
                offset = end;
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpSpeechConfig {
        HttpSpeechConfig {
            url: "http://localhost:5002/api/tts".to_string(),
            api_key: Some("test_key".to_string()),
            voice_id: "http-speech-1".to_string(),
            language: "en-US".to_string(),
            sample_rate_hz: 22_050,
        }
    }

    #[tokio::test]
    async fn test_catalog_reflects_config() {
        let provider = HttpSpeechProvider::new(config());
        let voices = provider.list_voices().await;
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id, "http-speech-1");
        assert_eq!(voices[0].sample_rate_hz, 22_050);
    }

    #[tokio::test]
    async fn test_request_carries_auth_and_body() {
        let provider = HttpSpeechProvider::new(config());
        let request = provider
            .build_request(&SynthesisRequest {
                text: "hello".to_string(),
                voice_id: "http-speech-1".to_string(),
                language: None,
            })
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:5002/api/tts");
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth, "Bearer test_key");
    }
}
