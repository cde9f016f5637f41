//! Alvin - Discord voice assistant
//!
//! Joins a voice channel on command, listens for its wake phrase,
//! transcribes what the caller says, answers through a chat model and
//! speaks the reply back into the channel.
//!
//! ## Usage
//! ```bash
//! # Required configuration
//! export DISCORD_TOKEN=...
//! export OWNER_ID=...
//! export OPENAI_API_KEY=...
//!
//! cargo run --bin alvin
//! ```
//!
//! Then, in Discord: `!join`, `!listen`, say "Alvin ..." in the voice
//! channel, `!stop_listening`, `!leave`, `!shutdown` (owner only).

use std::sync::Arc;

use alvin_adaptor_discord::{DiscordConfig, VoiceSettings};
use alvin_core::{config, logger, AppConfig, ConversationEngine, Result};
use alvin_provider_openai::OpenAIChatModel;
use alvin_provider_voice::{OpenAITtsEngine, SynthesisConfig, TranscriptionConfig, WhisperApiEngine};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env()?;
    logger::init_logging();

    let app = AppConfig::from_env()?;
    info!(
        chat_model = %app.chat_model,
        stt_model = %app.stt_model,
        tts_model = %app.tts_model,
        voice = %app.tts_voice,
        "Configuration loaded"
    );

    let chat = Arc::new(OpenAIChatModel::new(
        Some(app.openai_api_key.clone()),
        app.chat_model.clone(),
    ));
    let engine = Arc::new(ConversationEngine::new(
        chat,
        app.system_prompt.clone(),
        app.max_turns,
    ));
    let stt = Arc::new(WhisperApiEngine::new(Some(app.openai_api_key.clone())));
    let tts = Arc::new(OpenAITtsEngine::new(Some(app.openai_api_key.clone())));

    let discord = DiscordConfig {
        token: app.discord_token.clone(),
        owner_id: app.owner_id,
        text_prompt: app.text_prompt.clone(),
        voice: VoiceSettings {
            wake_phrases: app.wake_phrases.clone(),
            farewell_phrases: app.farewell_phrases.clone(),
            silence_ms: app.silence_ms,
            synthesis: SynthesisConfig {
                model: app.tts_model.clone(),
                voice: app.tts_voice.clone(),
                ..SynthesisConfig::default()
            },
            transcription: TranscriptionConfig {
                model: app.stt_model.clone(),
                language: app.language.clone(),
            },
            ..VoiceSettings::default()
        },
        ..DiscordConfig::default()
    };

    alvin_adaptor_discord::run(discord, engine, stt, tts).await
}
