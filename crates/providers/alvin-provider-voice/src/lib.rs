//! Voice provider for the Alvin voicebot
//!
//! Hosted speech-to-text (OpenAI Whisper API) and text-to-speech (OpenAI
//! TTS) engines behind the [`SpeechEngine`] and [`VoiceEngine`] traits,
//! plus the audio conversion helpers the Discord adaptor needs to feed
//! them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audio;
pub mod engines;
pub mod types;

pub use audio::{chunk_sentences, downmix_to_16k_mono, segment_sentences, wrap_pcm_in_wav};
pub use engines::{OpenAITtsEngine, WhisperApiEngine};
pub use types::{
    AudioData, AudioFormat, SpeechEngine, SynthesisConfig, TranscriptionConfig,
    TranscriptionResult, VoiceEngine, VoiceError,
};
