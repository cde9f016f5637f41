//! Discord adapter for the Alvin voice assistant
//!
//! Wires serenity gateway events to the voice session manager, the audio
//! capture pipeline and the command dispatcher. One [`run`] call owns the
//! whole client lifecycle; `!shutdown` from the owner tears it down.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serenity::cache::Settings as CacheSettings;
use serenity::gateway::ShardManager;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::GatewayIntents;
use serenity::model::id::{GuildId, UserId};
use serenity::prelude::*;
use songbird::driver::DecodeMode;
use songbird::serenity::SerenityInit;
use songbird::Songbird;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use alvin_core::{AlvinError, ConversationEngine, Result};
use alvin_provider_voice::{SpeechEngine, SynthesisConfig, TranscriptionConfig, VoiceEngine};

pub mod capture;
pub mod commands;
pub mod pipeline;
pub mod voice;

pub use capture::{UserAudioBuffer, VoiceReceiver};
pub use commands::{Command, CommandError};
pub use pipeline::{PhraseMatcher, UtterancePipeline};
pub use voice::{VoiceManager, VoiceSession};

use commands::require_owner;
use pipeline::spawn_pipeline;

/// Voice behavior settings
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    /// Phrases that start a conversation
    pub wake_phrases: Vec<String>,
    /// Phrases that end a conversation
    pub farewell_phrases: Vec<String>,
    /// Silence interval that closes an utterance (ms)
    pub silence_ms: u64,
    /// Cap on one utterance's duration (ms)
    pub max_utterance_ms: u64,
    /// TTS parameters
    pub synthesis: SynthesisConfig,
    /// STT parameters
    pub transcription: TranscriptionConfig,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            wake_phrases: vec!["alvin".to_string(), "alwin".to_string()],
            farewell_phrases: vec![
                "goodbye".to_string(),
                "bye bye".to_string(),
                "that's all".to_string(),
            ],
            silence_ms: 1500,
            max_utterance_ms: 6000,
            synthesis: SynthesisConfig::default(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

/// Discord adapter configuration
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token
    pub token: String,
    /// User id allowed to run `!shutdown`
    pub owner_id: u64,
    /// Gateway intents
    pub intents: GatewayIntents,
    /// Name the bot answers to in text channels
    pub bot_name: String,
    /// System prompt for text-channel replies
    pub text_prompt: String,
    /// Voice behavior
    pub voice: VoiceSettings,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner_id: 0,
            intents: GatewayIntents::GUILDS
                | GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::DIRECT_MESSAGES
                | GatewayIntents::MESSAGE_CONTENT
                | GatewayIntents::GUILD_VOICE_STATES,
            bot_name: "Alvin".to_string(),
            text_prompt: String::new(),
            voice: VoiceSettings::default(),
        }
    }
}

/// Shard manager handle for the shutdown command
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

/// Voice state tracker - maps (guild_id, user_id) -> channel_id
///
/// More reliable than serenity's cache for locating the invoker's channel.
type VoiceStateMap = Arc<RwLock<HashMap<(u64, u64), u64>>>;

struct Handler {
    owner_id: u64,
    bot_name: String,
    text_prompt: String,
    voice: VoiceSettings,
    voice_manager: Arc<VoiceManager>,
    engine: Arc<ConversationEngine>,
    stt: Arc<dyn SpeechEngine>,
    voice_states: VoiceStateMap,
}

impl Handler {
    /// Find the voice channel the user currently occupies
    fn user_voice_channel(&self, ctx: &Context, guild_id: u64, user_id: u64) -> Option<u64> {
        if let Some(channel_id) = self
            .voice_states
            .read()
            .unwrap()
            .get(&(guild_id, user_id))
            .copied()
        {
            return Some(channel_id);
        }
        // Fall back to serenity's cache
        ctx.cache.guild(GuildId::new(guild_id)).and_then(|guild| {
            guild
                .voice_states
                .get(&UserId::new(user_id))
                .and_then(|vs| vs.channel_id)
                .map(|c| c.get())
        })
    }

    /// Attach capture and spawn the transcript pipeline for a guild
    async fn start_listening(&self, guild_id: u64) -> std::result::Result<(), CommandError> {
        let (transcript_tx, transcript_rx) = mpsc::channel(32);

        let receiver = Arc::new(VoiceReceiver::new(
            guild_id,
            Arc::clone(&self.stt),
            self.voice.transcription.clone(),
            transcript_tx,
            self.voice.silence_ms,
            self.voice.max_utterance_ms,
        ));
        self.voice_manager
            .begin_listening(guild_id, Arc::clone(&receiver))
            .await?;
        receiver.spawn_sweeper();

        let pipeline = Arc::new(UtterancePipeline::new(
            guild_id,
            PhraseMatcher::new(&self.voice.wake_phrases),
            PhraseMatcher::new(&self.voice.farewell_phrases),
            Arc::clone(&self.engine),
        ));
        spawn_pipeline(pipeline, Arc::clone(&self.voice_manager), transcript_rx);
        Ok(())
    }

    async fn dispatch(
        &self,
        ctx: &Context,
        msg: &DiscordMessage,
        command: Command,
    ) -> std::result::Result<String, CommandError> {
        let guild_id = msg.guild_id.map(|g| g.get());

        match command {
            Command::Ping => Ok("Pong!".to_string()),
            Command::Join => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                let channel_id = self
                    .user_voice_channel(ctx, guild_id, msg.author.id.get())
                    .ok_or(CommandError::UserNotInChannel)?;
                self.voice_manager.join_channel(guild_id, channel_id).await?;
                Ok(format!("Joined <#{}>", channel_id))
            }
            Command::Leave => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                self.voice_manager.leave_channel(guild_id).await?;
                Ok("Left the voice channel.".to_string())
            }
            Command::Listen => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                if !self.voice_manager.is_connected(guild_id).await {
                    let channel_id = self
                        .user_voice_channel(ctx, guild_id, msg.author.id.get())
                        .ok_or(CommandError::UserNotInChannel)?;
                    self.voice_manager.join_channel(guild_id, channel_id).await?;
                }
                self.start_listening(guild_id).await?;
                Ok("Started listening! Say my name to start chatting.".to_string())
            }
            Command::StopListening => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                self.voice_manager.stop_listening(guild_id).await?;
                Ok("Stopped listening.".to_string())
            }
            Command::Shutdown => {
                require_owner(self.owner_id, msg.author.id.get())?;
                let _ = msg.channel_id.say(&ctx.http, "Shutting down...").await;

                self.voice_manager.leave_all().await;
                self.engine.clear();

                let shard_manager = ctx
                    .data
                    .read()
                    .await
                    .get::<ShardManagerContainer>()
                    .cloned();
                if let Some(manager) = shard_manager {
                    manager.shutdown_all().await;
                } else {
                    warn!("Shard manager not registered; cannot stop gateway");
                }
                Ok(String::new())
            }
            Command::Unknown(name) => Err(CommandError::UnknownCommand(name)),
        }
    }

    async fn handle_command(&self, ctx: &Context, msg: &DiscordMessage, command: Command) {
        debug!(
            author = msg.author.id.get(),
            command = ?command,
            "Dispatching command"
        );
        let reply = match self.dispatch(ctx, msg, command).await {
            Ok(reply) => reply,
            Err(e) => e.to_string(),
        };
        if !reply.is_empty() {
            if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                warn!(error = ?e, "Failed to send command reply");
            }
        }
    }

    /// Whether a plain text message is addressed to the bot
    async fn is_addressed(&self, ctx: &Context, msg: &DiscordMessage) -> bool {
        if msg.guild_id.is_none() {
            return true;
        }
        let content = msg.content.to_lowercase();
        if content.contains(&self.bot_name.to_lowercase()) {
            return true;
        }
        msg.mentions_me(ctx).await.unwrap_or(false)
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: DiscordMessage) {
        if msg.author.bot {
            return;
        }

        if let Some(command) = Command::parse(&msg.content) {
            self.handle_command(&ctx, &msg, command).await;
            return;
        }

        if !self.is_addressed(&ctx, &msg).await {
            return;
        }

        let _ = msg.channel_id.broadcast_typing(&ctx.http).await;
        match self.engine.oneshot(&self.text_prompt, &msg.content).await {
            Ok(reply) => {
                if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                    warn!(error = ?e, "Failed to send text reply");
                }
            }
            Err(e) => {
                warn!(error = %e, "Text reply generation failed");
            }
        }
    }

    /// Populate initial voice states when guild data is received
    async fn guild_create(
        &self,
        _ctx: Context,
        guild: serenity::model::guild::Guild,
        _is_new: Option<bool>,
    ) {
        let guild_id = guild.id.get();
        let mut states = self.voice_states.write().unwrap();
        for (user_id, voice_state) in guild.voice_states.iter() {
            if let Some(channel_id) = voice_state.channel_id {
                states.insert((guild_id, user_id.get()), channel_id.get());
            }
        }
        debug!(
            guild_id,
            tracked_users = states.len(),
            "Voice states seeded from guild_create"
        );
    }

    async fn ready(&self, _ctx: Context, data_about_bot: serenity::model::gateway::Ready) {
        info!(
            user = %data_about_bot.user.name,
            guilds_count = data_about_bot.guilds.len(),
            "Discord ready"
        );
    }

    /// Track voice state changes - this is more reliable than the cache
    async fn voice_state_update(
        &self,
        _ctx: Context,
        _old: Option<serenity::model::voice::VoiceState>,
        new: serenity::model::voice::VoiceState,
    ) {
        let user_id = new.user_id.get();
        let guild_id = match new.guild_id {
            Some(g) => g.get(),
            None => return,
        };

        let mut states = self.voice_states.write().unwrap();
        match new.channel_id {
            Some(channel_id) => {
                debug!(guild_id, user_id, channel_id = channel_id.get(), "User joined voice channel");
                states.insert((guild_id, user_id), channel_id.get());
            }
            None => {
                debug!(guild_id, user_id, "User left voice channel");
                states.remove(&(guild_id, user_id));
            }
        }
    }
}

/// Run the Discord client until shutdown
///
/// Builds the songbird voice client with audio decode enabled, registers
/// the event handler and blocks on the gateway connection.
pub async fn run(
    config: DiscordConfig,
    engine: Arc<ConversationEngine>,
    stt: Arc<dyn SpeechEngine>,
    tts: Arc<dyn VoiceEngine>,
) -> Result<()> {
    // Decode incoming voice so VoiceTick carries PCM
    let songbird_config = songbird::Config::default().decode_mode(DecodeMode::Decode);
    let songbird = Songbird::serenity_from_config(songbird_config);

    let voice_manager = Arc::new(VoiceManager::new(
        Arc::clone(&songbird),
        tts,
        config.voice.synthesis.clone(),
    ));

    let handler = Handler {
        owner_id: config.owner_id,
        bot_name: config.bot_name.clone(),
        text_prompt: config.text_prompt.clone(),
        voice: config.voice.clone(),
        voice_manager,
        engine,
        stt,
        voice_states: Arc::new(RwLock::new(HashMap::new())),
    };

    // Cache voice states for voice channel detection
    let mut cache_settings = CacheSettings::default();
    cache_settings.cache_guilds = true;
    cache_settings.cache_channels = true;
    cache_settings.cache_users = true;

    let mut client = Client::builder(&config.token, config.intents)
        .event_handler(handler)
        .cache_settings(cache_settings)
        .register_songbird_with(songbird)
        .await
        .map_err(|e| AlvinError::discord(format!("Failed to create Discord client: {:?}", e)))?;

    client
        .data
        .write()
        .await
        .insert::<ShardManagerContainer>(client.shard_manager.clone());

    info!("Discord adapter started");
    client
        .start()
        .await
        .map_err(|e| AlvinError::discord(format!("Discord client error: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intents_include_voice() {
        let config = DiscordConfig::default();
        assert!(config.intents.contains(GatewayIntents::GUILD_VOICE_STATES));
        assert!(config.intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert_eq!(config.bot_name, "Alvin");
    }

    #[test]
    fn test_default_voice_settings() {
        let settings = VoiceSettings::default();
        assert!(settings.wake_phrases.contains(&"alvin".to_string()));
        assert!(settings.farewell_phrases.contains(&"goodbye".to_string()));
        assert_eq!(settings.silence_ms, 1500);
    }
}
