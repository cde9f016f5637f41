//! OpenAI TTS Engine
//!
//! Supports OpenAI's text-to-speech API with:
//! - tts-1: Optimized for low latency (default)
//! - tts-1-hd: Higher quality, slightly higher latency
//!
//! Voices: alloy, echo, fable, onyx, nova, shimmer

use async_trait::async_trait;
use alvin_core::Result;
use reqwest::Client;
use serde::Serialize;
use std::env;
use std::sync::OnceLock;

use crate::types::*;

/// OpenAI API base URL
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Shared HTTP client for connection pooling
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// OpenAI TTS request
#[derive(Debug, Serialize)]
struct OpenAITtsRequest {
    model: String,
    input: String,
    voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

/// OpenAI voice engine
pub struct OpenAITtsEngine {
    /// API key (optional, uses OPENAI_API_KEY env var if not set)
    api_key: Option<String>,
}

impl OpenAITtsEngine {
    /// Create new OpenAI voice engine
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
}

#[async_trait]
impl VoiceEngine for OpenAITtsEngine {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str, config: &SynthesisConfig) -> Result<AudioData> {
        let api_key = self.get_api_key()?;

        if text.len() > self.max_text_length() {
            return Err(VoiceError::TextTooLong {
                length: text.len(),
                max: self.max_text_length(),
            }
            .into());
        }

        let request = OpenAITtsRequest {
            model: config.model.clone(),
            input: text.to_string(),
            voice: config.voice.clone(),
            response_format: Some(config.output_format.as_str().to_string()),
            speed: if (config.speed - 1.0).abs() > 0.01 {
                Some(config.speed)
            } else {
                None
            },
        };

        tracing::debug!(
            "OpenAI TTS request: model={}, voice={}, format={}, text_len={}",
            config.model,
            config.voice,
            config.output_format.as_str(),
            text.len()
        );

        let response = Self::client()
            .post(format!("{}/audio/speech", OPENAI_API_BASE))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
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

            return Err(
                VoiceError::Synthesis(format!("OpenAI TTS error ({}): {}", status, error_text)).into(),
            );
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Network(e.to_string()))?;

        tracing::debug!("OpenAI TTS response: {} bytes", bytes.len());

        Ok(AudioData {
            data: bytes,
            format: config.output_format,
            sample_rate: config.sample_rate,
            duration_ms: None,
        })
    }

    async fn is_ready(&self) -> bool {
        self.get_api_key().is_ok()
    }

    fn max_text_length(&self) -> usize {
        4096
    }
}
