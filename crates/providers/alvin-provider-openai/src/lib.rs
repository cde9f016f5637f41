//! OpenAI chat-completion provider for the Alvin voicebot

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use alvin_core::{AlvinError, ChatModel, Result, Role, Turn};
use futures_util::StreamExt;
use std::sync::{Arc, OnceLock};

/// Shared OpenAI client instance for connection pooling
static CLIENT: OnceLock<Arc<Client<OpenAIConfig>>> = OnceLock::new();

/// Chat model backed by the OpenAI chat-completions API
///
/// Completions are streamed and accumulated to cut provider-side latency;
/// the caller still receives one reply string.
pub struct OpenAIChatModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChatModel {
    /// Create a chat model
    ///
    /// With `api_key: None` the shared client is used, which reads
    /// `OPENAI_API_KEY` from the environment.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let client = match api_key {
            Some(key) => Arc::new(Client::with_config(
                OpenAIConfig::new().with_api_key(key),
            )),
            None => Self::shared_client(),
        };
        Self {
            client,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 600,
        }
    }

    /// Override the sampling temperature (default 0.7)
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the completion token cap (default 600)
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get or initialize the shared OpenAI client
    fn shared_client() -> Arc<Client<OpenAIConfig>> {
        CLIENT
            .get_or_init(|| {
                tracing::debug!("Initializing shared OpenAI client");
                Arc::new(Client::new())
            })
            .clone()
    }
}

/// Map a conversation turn onto the SDK's request message type
fn to_request_message(turn: &Turn) -> Result<ChatCompletionRequestMessage> {
    let message = match turn.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content.clone())
            .build()
            .map_err(|e| AlvinError::model(e.to_string()))?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.clone())
            .build()
            .map_err(|e| AlvinError::model(e.to_string()))?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.clone())
            .build()
            .map_err(|e| AlvinError::model(e.to_string()))?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let start_time = std::time::Instant::now();

        let messages = turns
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(self.model.clone());
        request_builder.messages(messages);
        request_builder.temperature(self.temperature);
        request_builder.max_tokens(self.max_tokens);

        // Stream and accumulate chunks for reduced provider-side latency
        request_builder.stream(true);
        let request = request_builder
            .build()
            .map_err(|e| AlvinError::model(e.to_string()))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AlvinError::model(e.to_string()))?;

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let resp = chunk.map_err(|e| AlvinError::model(e.to_string()))?;
            if let Some(content) = resp
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
            {
                text.push_str(content);
            }
        }

        if text.trim().is_empty() {
            return Err(AlvinError::model("Empty completion from chat API"));
        }

        tracing::debug!(
            model = %self.model,
            latency_ms = start_time.elapsed().as_millis() as u64,
            chars = text.len(),
            "Chat completion finished"
        );

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name() {
        let model = OpenAIChatModel::new(Some("test-key".to_string()), "gpt-4o-mini");
        assert_eq!(model.name(), "openai");
        assert_eq!(model.model, "gpt-4o-mini");
    }

    #[test]
    fn test_builder_overrides() {
        let model = OpenAIChatModel::new(Some("test-key".to_string()), "gpt-4o-mini")
            .with_temperature(0.2)
            .with_max_tokens(128);
        assert_eq!(model.temperature, 0.2);
        assert_eq!(model.max_tokens, 128);
    }

    #[test]
    fn test_role_mapping() {
        let system = to_request_message(&Turn::system("be brief")).unwrap();
        assert!(matches!(system, ChatCompletionRequestMessage::System(_)));

        let user = to_request_message(&Turn::user("hello")).unwrap();
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));

        let assistant = to_request_message(&Turn::assistant("hi")).unwrap();
        assert!(matches!(assistant, ChatCompletionRequestMessage::Assistant(_)));
    }
}
