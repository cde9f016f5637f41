//! Hosted speech engine implementations

pub mod openai;
pub mod whisper_api;

pub use openai::OpenAITtsEngine;
pub use whisper_api::WhisperApiEngine;
