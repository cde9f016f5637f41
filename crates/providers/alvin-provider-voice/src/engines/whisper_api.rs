//! OpenAI Whisper API STT Engine
//!
//! Uploads utterance audio to the hosted `audio/transcriptions` endpoint.
//! PCM input is wrapped in a WAV header before upload; the endpoint does
//! not accept headerless PCM.

use async_trait::async_trait;
use alvin_core::Result;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::audio::wrap_pcm_in_wav;
use crate::types::*;

/// OpenAI API base URL
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Shared HTTP client for connection pooling
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// Response body of a `verbose_json` transcription request
#[derive(Debug, Deserialize)]
struct WhisperApiResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// Hosted Whisper speech engine
pub struct WhisperApiEngine {
    /// API key (optional, uses OPENAI_API_KEY env var if not set)
    api_key: Option<String>,
}

impl WhisperApiEngine {
    /// Create new Whisper API engine
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// Get HTTP client
    fn client() -> &'static Client {
        HTTP_CLIENT.get_or_init(|| {
            Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client")
        })
    }

    /// Get API key
    fn get_api_key(&self) -> std::result::Result<String, VoiceError> {
        self.api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                VoiceError::Authentication(
                    "OpenAI API key not found. Set OPENAI_API_KEY environment variable or provide key."
                        .to_string(),
                )
            })
    }

    /// Prepare the upload payload: (bytes, file name, mime type)
    fn upload_payload(audio: &AudioData) -> std::result::Result<(Vec<u8>, &'static str, &'static str), VoiceError> {
        match audio.format {
            AudioFormat::Pcm => {
                let wav = wrap_pcm_in_wav(&audio.data, audio.sample_rate, 1, 16);
                Ok((wav, "audio.wav", "audio/wav"))
            }
            AudioFormat::Wav => Ok((audio.data.to_vec(), "audio.wav", "audio/wav")),
            AudioFormat::Mp3 => Ok((audio.data.to_vec(), "audio.mp3", "audio/mpeg")),
            other => Err(VoiceError::Audio(format!(
                "Unsupported transcription input format: {}",
                other.as_str()
            ))),
        }
    }
}

#[async_trait]
impl SpeechEngine for WhisperApiEngine {
    fn name(&self) -> &str {
        "whisper-api"
    }

    async fn transcribe(
        &self,
        audio: &AudioData,
        config: &TranscriptionConfig,
    ) -> Result<TranscriptionResult> {
        let api_key = self.get_api_key()?;
        let (payload, file_name, mime) = Self::upload_payload(audio)?;

        let part = reqwest::multipart::Part::bytes(payload)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| VoiceError::Audio(format!("MIME error: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", config.model.clone())
            .text("response_format", "verbose_json".to_string());
        if let Some(ref language) = config.language {
            form = form.text("language", language.clone());
        }

        tracing::debug!(
            "Whisper API request: model={}, bytes={}, sample_rate={}",
            config.model,
            audio.size(),
            audio.sample_rate
        );

        let response = Self::client()
            .post(format!("{}/audio/transcriptions", OPENAI_API_BASE))
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 {
                return Err(VoiceError::Authentication(error_text).into());
            } else if status.as_u16() == 429 {
                return Err(VoiceError::RateLimited(error_text).into());
            }

            return Err(VoiceError::Transcription(format!(
                "Whisper API error ({}): {}",
                status, error_text
            ))
            .into());
        }

        let body: WhisperApiResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Transcription(format!("Malformed response: {}", e)))?;

        let result = TranscriptionResult {
            text: body.text,
            language: body.language,
            duration_ms: body.duration.map(|d| (d * 1000.0) as u64),
        };

        if result.is_empty() {
            tracing::debug!("Whisper API recognized no speech");
        } else {
            tracing::debug!("Whisper API transcript: {} chars", result.text.len());
        }

        Ok(result)
    }

    async fn is_ready(&self) -> bool {
        self.get_api_key().is_ok()
    }
}
