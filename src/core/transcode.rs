//! Audio transcoding between the provider base encoding and the target
//! wire format.
//!
//! Each chunk is an independent transcode: no codec state is carried
//! across chunks and no long-lived encoder processes are held. Blocking
//! work (sample math, external encoder invocations) runs on the blocking
//! pool so a slow transcode cannot stall other sessions.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::audio::{self, AudioChunk, AudioFormat};

#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    #[error("unsupported target format '{0}'")]
    UnsupportedTarget(AudioFormat),

    #[error("unsupported source format '{0}' (providers must emit pcm16)")]
    UnsupportedSource(AudioFormat),

    #[error("external encoder failed: {0}")]
    Encoder(String),

    #[error("transcode task failed: {0}")]
    Task(String),
}

/// Converts one provider chunk into the requested format and sample rate.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(
        &self,
        chunk: AudioChunk,
        target_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError>;
}

/// PCM16 pass-through with linear resampling.
///
/// Also used for the `wav` target: a streamed session carries headerless
/// PCM frames, not a self-contained WAV container.
struct Pcm16Transcoder;

#[async_trait]
impl AudioTranscoder for Pcm16Transcoder {
    async fn transcode(
        &self,
        chunk: AudioChunk,
        target_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError> {
        if chunk.format != AudioFormat::Pcm16 {
            return Err(TranscodeError::UnsupportedSource(chunk.format));
        }
        if chunk.sample_rate_hz == target_rate_hz {
            return Ok(chunk.data);
        }
        let src_rate = chunk.sample_rate_hz;
        tokio::task::spawn_blocking(move || {
            let samples = audio::samples_from_pcm16le(&chunk.data);
            let resampled = audio::resample_pcm16(&samples, src_rate, target_rate_hz);
            audio::pcm16le_from_samples(&resampled)
        })
        .await
        .map_err(|e| TranscodeError::Task(e.to_string()))
    }
}

/// G.711 mu-law companding, resampling first when rates differ.
struct MulawTranscoder;

#[async_trait]
impl AudioTranscoder for MulawTranscoder {
    async fn transcode(
        &self,
        chunk: AudioChunk,
        target_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError> {
        if chunk.format != AudioFormat::Pcm16 {
            return Err(TranscodeError::UnsupportedSource(chunk.format));
        }
        let src_rate = chunk.sample_rate_hz;
        tokio::task::spawn_blocking(move || {
            let samples = audio::samples_from_pcm16le(&chunk.data);
            let resampled = if src_rate == target_rate_hz {
                samples
            } else {
                audio::resample_pcm16(&samples, src_rate, target_rate_hz)
            };
            audio::mulaw_from_pcm16(&resampled)
        })
        .await
        .map_err(|e| TranscodeError::Task(e.to_string()))
    }
}

/// Compressed targets via a one-shot external encoder process.
///
/// Every chunk spawns an independent `ffmpeg` invocation reading PCM16 on
/// stdin and writing the encoded frame on stdout. Per-chunk process
/// overhead is the accepted trade for robust error isolation.
struct ExternalEncoder {
    target: AudioFormat,
}

impl ExternalEncoder {
    fn new(target: AudioFormat) -> Self {
        Self { target }
    }

    fn encode_blocking(
        target: AudioFormat,
        input: &[u8],
        sample_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError> {
        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "s16le", "-ar", &sample_rate_hz.to_string(), "-ac", "1"])
            .args(["-i", "pipe:0"]);
        match target {
            AudioFormat::Mp3 => {
                command.args(["-f", "mp3", "-b:a", "64k"]);
            }
            AudioFormat::Opus => {
                command.args(["-f", "ogg", "-c:a", "libopus"]);
            }
            other => return Err(TranscodeError::UnsupportedTarget(other)),
        }
        command.arg("pipe:1");

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranscodeError::Encoder(format!("failed to spawn encoder: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|e| TranscodeError::Encoder(format!("encoder stdin: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| TranscodeError::Encoder(format!("encoder wait: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError::Encoder(format!(
                "encoder exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(Bytes::from(output.stdout))
    }
}

#[async_trait]
impl AudioTranscoder for ExternalEncoder {
    async fn transcode(
        &self,
        chunk: AudioChunk,
        target_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError> {
        if chunk.format != AudioFormat::Pcm16 {
            return Err(TranscodeError::UnsupportedSource(chunk.format));
        }
        let target = self.target;
        let src_rate = chunk.sample_rate_hz;
        tokio::task::spawn_blocking(move || {
            let pcm = if src_rate == target_rate_hz {
                chunk.data
            } else {
                let samples = audio::samples_from_pcm16le(&chunk.data);
                audio::pcm16le_from_samples(&audio::resample_pcm16(
                    &samples,
                    src_rate,
                    target_rate_hz,
                ))
            };
            Self::encode_blocking(target, &pcm, target_rate_hz)
        })
        .await
        .map_err(|e| TranscodeError::Task(e.to_string()))?
    }
}

/// Routes chunks to the transcoder registered for the target format.
pub struct TranscodeService {
    transcoders: HashMap<AudioFormat, Arc<dyn AudioTranscoder>>,
}

impl TranscodeService {
    pub fn new() -> Self {
        let mut transcoders: HashMap<AudioFormat, Arc<dyn AudioTranscoder>> = HashMap::new();
        transcoders.insert(AudioFormat::Pcm16, Arc::new(Pcm16Transcoder));
        transcoders.insert(AudioFormat::Wav, Arc::new(Pcm16Transcoder));
        transcoders.insert(AudioFormat::Mulaw, Arc::new(MulawTranscoder));
        transcoders.insert(AudioFormat::Mp3, Arc::new(ExternalEncoder::new(AudioFormat::Mp3)));
        transcoders.insert(
            AudioFormat::Opus,
            Arc::new(ExternalEncoder::new(AudioFormat::Opus)),
        );
        Self { transcoders }
    }

    pub fn supports(&self, format: AudioFormat) -> bool {
        self.transcoders.contains_key(&format)
    }

    /// All formats reachable from the pcm16 base, in stable order.
    pub fn supported_formats(&self) -> Vec<AudioFormat> {
        let mut formats: Vec<AudioFormat> = self.transcoders.keys().copied().collect();
        formats.sort_by_key(|f| f.as_str());
        formats
    }

    pub async fn transcode_chunk(
        &self,
        chunk: AudioChunk,
        target_format: AudioFormat,
        target_rate_hz: u32,
    ) -> Result<Bytes, TranscodeError> {
        let transcoder = self
            .transcoders
            .get(&target_format)
            .ok_or(TranscodeError::UnsupportedTarget(target_format))?;
        transcoder.transcode(chunk, target_rate_hz).await
    }
}

impl Default for TranscodeService {
    fn default() -> Self {
        Self::new()
    }
}
