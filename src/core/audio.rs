//! Audio primitives shared by providers and the transcoder.
//!
//! Everything in the gateway flows as little-endian 16-bit mono PCM until
//! the transcode stage; the helpers here cover sample generation for the
//! mock provider, sample-rate conversion, and G.711 mu-law companding.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire-level audio encodings understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm16,
    Mulaw,
    Opus,
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm16 => "pcm16",
            AudioFormat::Mulaw => "mulaw",
            AudioFormat::Opus => "opus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm16" => Ok(AudioFormat::Pcm16),
            "mulaw" => Ok(AudioFormat::Mulaw),
            "opus" => Ok(AudioFormat::Opus),
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized audio format string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown audio format '{0}'")]
pub struct UnknownFormat(pub String);

/// A chunk of raw audio produced by a provider.
///
/// The gateway re-encodes this into the session's target format before
/// wrapping it in the transport envelope. Chunks are consumed at most once.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Bytes,
    pub format: AudioFormat,
    pub sample_rate_hz: u32,
    pub num_channels: u16,
}

impl AudioChunk {
    pub fn pcm16(data: Bytes, sample_rate_hz: u32) -> Self {
        Self {
            data,
            format: AudioFormat::Pcm16,
            sample_rate_hz,
            num_channels: 1,
        }
    }
}

/// Clamp `[-1.0, 1.0]` float samples to 16-bit little-endian PCM.
pub fn pcm16le_from_floats(samples: &[f32]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        let v = s.clamp(-1.0, 1.0);
        let iv = (v * 32767.0).round() as i16;
        out.extend_from_slice(&iv.to_le_bytes());
    }
    Bytes::from(out)
}

/// Generate a sine tone at `frequency` Hz for `duration_s` seconds.
pub fn tone(frequency: f32, duration_s: f32, sample_rate: u32, gain: f32) -> Vec<f32> {
    let n = (duration_s * sample_rate as f32) as usize;
    let two_pi_f = 2.0 * std::f32::consts::PI * frequency;
    (0..n)
        .map(|i| (two_pi_f * (i as f32 / sample_rate as f32)).sin() * gain)
        .collect()
}

/// Generate `duration_s` seconds of silence.
pub fn silence(duration_s: f32, sample_rate: u32) -> Vec<f32> {
    let n = (duration_s * sample_rate as f32) as usize;
    vec![0.0; n]
}

/// Reinterpret little-endian PCM16 bytes as samples. A trailing odd byte
/// is dropped.
pub fn samples_from_pcm16le(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize samples back to little-endian PCM16 bytes.
pub fn pcm16le_from_samples(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Bytes::from(out)
}

/// Linear-interpolation resampler for mono PCM16.
///
/// Operates per chunk; boundary samples between consecutive chunks are not
/// blended, which is audible only at extreme rate ratios and keeps the
/// transcoder stateless.
pub fn resample_pcm16(input: &[i16], src_rate: u32, dst_rate: u32) -> Vec<i16> {
    if src_rate == dst_rate || input.is_empty() {
        return input.to_vec();
    }
    let out_len = ((input.len() as u64 * dst_rate as u64) / src_rate as u64) as usize;
    let step = src_rate as f64 / dst_rate as f64;
    let last = input.len() - 1;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = (pos as usize).min(last);
        let frac = pos - idx as f64;
        let a = input[idx] as f64;
        let b = input[(idx + 1).min(last)] as f64;
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

/// G.711 mu-law companding of a single linear PCM16 sample.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32_635;

    let mut pcm = sample as i32;
    let sign: u8 = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > CLIP {
        pcm = CLIP;
    }
    pcm += BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (pcm & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((pcm >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 3) | mantissa)
}

/// Mu-law encode a whole PCM16 buffer.
pub fn mulaw_from_pcm16(samples: &[i16]) -> Bytes {
    Bytes::from(samples.iter().map(|s| linear_to_mulaw(*s)).collect::<Vec<u8>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        for f in [
            AudioFormat::Pcm16,
            AudioFormat::Mulaw,
            AudioFormat::Opus,
            AudioFormat::Mp3,
            AudioFormat::Wav,
        ] {
            assert_eq!(f.as_str().parse::<AudioFormat>().unwrap(), f);
        }
        assert!("flac".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_pcm16_clamps_out_of_range_floats() {
        let bytes = pcm16le_from_floats(&[2.0, -2.0]);
        let samples = samples_from_pcm16le(&bytes);
        assert_eq!(samples, vec![32767, -32767]);
    }

    #[test]
    fn test_tone_length_matches_duration() {
        let samples = tone(440.0, 0.5, 16_000, 0.2);
        assert_eq!(samples.len(), 8_000);
        assert!(samples.iter().all(|s| s.abs() <= 0.2 + f32::EPSILON));
    }

    #[test]
    fn test_resample_identity() {
        let input: Vec<i16> = (0..100).collect();
        assert_eq!(resample_pcm16(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_halves_and_doubles_length() {
        let input: Vec<i16> = (0..1000).collect();
        let down = resample_pcm16(&input, 16_000, 8_000);
        assert_eq!(down.len(), 500);
        let up = resample_pcm16(&input, 8_000, 16_000);
        assert_eq!(up.len(), 2000);
    }

    #[test]
    fn test_mulaw_known_values() {
        // Silence maps to 0xFF in G.711 mu-law.
        assert_eq!(linear_to_mulaw(0), 0xFF);
        // Positive and negative full scale differ only in the sign bit.
        assert_eq!(linear_to_mulaw(32_767) & 0x80, 0x80);
        assert_eq!(linear_to_mulaw(-32_768) & 0x80, 0x00);
    }

    #[test]
    fn test_pcm16_sample_round_trip() {
        let samples: Vec<i16> = vec![0, 1, -1, 32767, -32768];
        let bytes = pcm16le_from_samples(&samples);
        assert_eq!(samples_from_pcm16le(&bytes), samples);
    }
}
