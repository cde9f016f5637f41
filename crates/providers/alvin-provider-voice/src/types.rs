//! Core types for the voice provider

use async_trait::async_trait;
use bytes::Bytes;
use alvin_core::Result;
use serde::{Deserialize, Serialize};

/// Audio container/encoding format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// MP3 (most compatible, good compression)
    Mp3,
    /// Opus (best quality/size ratio, low latency)
    Opus,
    /// AAC
    Aac,
    /// FLAC (lossless)
    Flac,
    /// WAV (uncompressed)
    Wav,
    /// PCM raw audio
    Pcm,
}

impl AudioFormat {
    /// Get format as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Mp3
    }
}

/// A chunk of audio with its format and sample rate
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Raw audio bytes
    pub data: Bytes,
    /// Audio format
    pub format: AudioFormat,
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Duration in milliseconds, when known
    pub duration_ms: Option<u64>,
}

impl AudioData {
    /// Create new audio data
    pub fn new(data: Bytes, format: AudioFormat, sample_rate: u32) -> Self {
        Self {
            data,
            format,
            sample_rate,
            duration_ms: None,
        }
    }

    /// Build PCM audio data from 16-bit mono samples
    pub fn from_pcm_samples(samples: &[i16], sample_rate: u32) -> Self {
        let pcm_bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
        Self {
            data: Bytes::from(pcm_bytes),
            format: AudioFormat::Pcm,
            sample_rate,
            duration_ms: Some((samples.len() as u64 * 1000) / sample_rate as u64),
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the audio payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Model to use (e.g. "tts-1")
    pub model: String,
    /// Voice id (e.g. "echo")
    pub voice: String,
    /// Speaking speed (0.25 to 4.0, default 1.0)
    pub speed: f32,
    /// Output audio format
    pub output_format: AudioFormat,
    /// Sample rate (Hz)
    pub sample_rate: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "echo".to_string(),
            speed: 1.0,
            output_format: AudioFormat::Mp3,
            sample_rate: 24000,
        }
    }
}

/// Configuration for speech-to-text transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// STT model to use (e.g. "whisper-1")
    pub model: String,
    /// Language hint (ISO 639-1 code); None = auto-detect
    pub language: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
        }
    }
}

/// Result of speech-to-text transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcribed text; empty when no speech was recognized
    pub text: String,
    /// Detected language code, when reported
    pub language: Option<String>,
    /// Audio duration in milliseconds, when reported
    pub duration_ms: Option<u64>,
}

impl TranscriptionResult {
    /// Create a simple transcription result with just text
    pub fn new(text: String) -> Self {
        Self {
            text,
            language: None,
            duration_ms: None,
        }
    }

    /// Whether the service recognized no speech
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl Default for TranscriptionResult {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Voice engine trait - implemented by each TTS backend
#[async_trait]
pub trait VoiceEngine: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Synthesize text to audio
    async fn synthesize(&self, text: &str, config: &SynthesisConfig) -> Result<AudioData>;

    /// Check if engine is ready
    async fn is_ready(&self) -> bool;

    /// Get maximum text length
    fn max_text_length(&self) -> usize {
        4096
    }
}

/// Speech engine trait - implemented by each STT backend
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Transcribe audio to text
    async fn transcribe(
        &self,
        audio: &AudioData,
        config: &TranscriptionConfig,
    ) -> Result<TranscriptionResult>;

    /// Check if engine is ready (credentials present, service reachable)
    async fn is_ready(&self) -> bool;
}

/// Voice synthesis and transcription error types
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// API authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Text too long
    #[error("Text exceeds maximum length: {length} > {max}")]
    TextTooLong {
        /// Actual text length
        length: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Transcription failed
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Synthesis failed
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Audio processing error
    #[error("Audio processing error: {0}")]
    Audio(String),

    /// Generic error
    #[error("Voice error: {0}")]
    Other(String),
}

impl From<VoiceError> for alvin_core::AlvinError {
    fn from(err: VoiceError) -> Self {
        alvin_core::AlvinError::other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_strings() {
        assert_eq!(AudioFormat::Mp3.as_str(), "mp3");
        assert_eq!(AudioFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioFormat::default(), AudioFormat::Mp3);
    }

    #[test]
    fn test_audio_data_from_pcm_samples() {
        let samples: Vec<i16> = vec![0; 16000];
        let audio = AudioData::from_pcm_samples(&samples, 16000);
        assert_eq!(audio.format, AudioFormat::Pcm);
        assert_eq!(audio.size(), 32000);
        assert_eq!(audio.duration_ms, Some(1000));
    }

    #[test]
    fn test_empty_transcription() {
        assert!(TranscriptionResult::default().is_empty());
        assert!(TranscriptionResult::new("   ".to_string()).is_empty());
        assert!(!TranscriptionResult::new("hello".to_string()).is_empty());
    }
}
