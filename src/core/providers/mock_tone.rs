//! Mock provider that encodes text as a sequence of tones.
//!
//! Each character becomes a short sine blip whose pitch is derived from
//! the character code, so output length scales with the input text and
//! sessions are fully reproducible without any model weights.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::audio::{self, AudioChunk, AudioFormat};

use super::base::{
    CHUNK_CHANNEL_CAPACITY, ChunkReceiver, ProviderError, ProviderVoice, SynthesisRequest,
    TtsProvider,
};

const BASE_FREQ: f32 = 220.0;
const GAIN: f32 = 0.2;
const CHAR_MS: f32 = 80.0;
const GAP_MS: f32 = 20.0;
/// Chunk duration in seconds (~100 ms of audio per frame).
const CHUNK_DURATION_S: f32 = 0.1;

pub struct MockToneProvider {
    sample_rate_hz: u32,
    voices: Vec<ProviderVoice>,
}

impl MockToneProvider {
    pub const ID: &'static str = "mock_tone";

    pub fn new(sample_rate_hz: u32) -> Self {
        let voices = vec![ProviderVoice {
            id: "en-US-mock-1".to_string(),
            name: "Mock Tone Voice".to_string(),
            language: "en-US".to_string(),
            sample_rate_hz,
            base_format: AudioFormat::Pcm16,
        }];
        Self {
            sample_rate_hz,
            voices,
        }
    }

    /// Render the whole utterance to PCM16. One tone plus a short gap per
    /// character; pitch is the character code mapped onto two octaves
    /// around the base frequency.
    fn render(&self, text: &str) -> Bytes {
        let sample_rate = self.sample_rate_hz;
        let mut samples: Vec<f32> = Vec::new();
        for ch in text.chars() {
            let code = ch as u32;
            let semitone = (code % 24) as f32 - 12.0;
            let freq = BASE_FREQ * 2f32.powf(semitone / 12.0);
            samples.extend(audio::tone(freq, CHAR_MS / 1000.0, sample_rate, GAIN));
            samples.extend(audio::silence(GAP_MS / 1000.0, sample_rate));
        }
        audio::pcm16le_from_floats(&samples)
    }
}

impl Default for MockToneProvider {
    fn default() -> Self {
        Self::new(16_000)
    }
}

#[async_trait::async_trait]
impl TtsProvider for MockToneProvider {
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
        if request.text.is_empty() {
            return Err(ProviderError::Synthesis("text must not be empty".into()));
        }

        let pcm = self.render(&request.text);
        let sample_rate = self.sample_rate_hz;

        // 16-bit mono PCM: bytes per second is twice the sample rate.
        let chunk_size = ((sample_rate as f32 * 2.0 * CHUNK_DURATION_S) as usize).max(1024);

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut offset = 0;
            while offset < pcm.len() {
                let end = (offset + chunk_size).min(pcm.len());
                let chunk = AudioChunk::pcm16(pcm.slice(offset..end), sample_rate);
                if tx.send(Ok(chunk)).await.is_err() {
                    // Consumer went away; stop rendering.
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

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice_id: "en-US-mock-1".to_string(),
            language: None,
        }
    }

    #[tokio::test]
    async fn test_lists_single_voice() {
        let provider = MockToneProvider::default();
        let voices = provider.list_voices().await;
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id, "en-US-mock-1");
        assert_eq!(voices[0].base_format, AudioFormat::Pcm16);
    }

    #[tokio::test]
    async fn test_rejects_empty_text() {
        let provider = MockToneProvider::default();
        assert!(provider.stream_synthesize(request("")).await.is_err());
    }

    #[tokio::test]
    async fn test_streams_at_least_one_chunk() {
        let provider = MockToneProvider::default();
        let mut rx = provider.stream_synthesize(request("hi")).await.unwrap();

        let mut chunks = 0;
        let mut total_bytes = 0;
        while let Some(item) = rx.recv().await {
            let chunk = item.unwrap();
            assert_eq!(chunk.format, AudioFormat::Pcm16);
            assert_eq!(chunk.sample_rate_hz, 16_000);
            total_bytes += chunk.data.len();
            chunks += 1;
        }
        assert!(chunks >= 1);
        // "hi" renders two 80ms tones + two 20ms gaps = 200ms = 6400 bytes.
        assert_eq!(total_bytes, 6_400);
    }

    #[tokio::test]
    async fn test_chunks_are_roughly_100ms() {
        let provider = MockToneProvider::default();
        let mut rx = provider
            .stream_synthesize(request("hello world"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.data.len(), 3_200);
    }
}
