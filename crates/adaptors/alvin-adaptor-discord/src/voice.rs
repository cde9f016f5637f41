//! Voice session management and speech playback
//!
//! One [`VoiceSession`] per guild tracks the bot's voice connection and
//! listening state. The [`VoiceManager`] owns the songbird client and is
//! the only place that connects, disconnects or plays audio. Replies are
//! synthesized in sentence chunks with the next chunk requested while the
//! current one plays.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serenity::model::id::{ChannelId, GuildId};
use songbird::{events::Event, input::Input, Call, CoreEvent, Songbird};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use alvin_core::{AlvinError, Result};
use alvin_provider_voice::{
    chunk_sentences, wrap_pcm_in_wav, AudioData, AudioFormat, SynthesisConfig, VoiceEngine,
};

use crate::capture::{CaptureHandler, VoiceReceiver};
use crate::commands::CommandError;

/// Sentences synthesized per TTS request
const SENTENCES_PER_CHUNK: usize = 2;

/// Voice session state for a guild
#[derive(Debug)]
pub struct VoiceSession {
    /// Guild ID
    pub guild_id: u64,
    /// Voice channel ID the bot is in
    pub channel_id: u64,
    /// When the bot joined
    pub joined_at: Instant,
    /// Last activity timestamp
    pub last_activity: Instant,
    /// Whether the bot is currently speaking
    pub is_speaking: bool,
    /// Whether voice capture is running
    pub listening: bool,
}

impl VoiceSession {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        let now = Instant::now();
        Self {
            guild_id,
            channel_id,
            joined_at: now,
            last_activity: now,
            is_speaking: false,
            listening: false,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Voice manager for handling Discord voice connections
pub struct VoiceManager {
    songbird: Arc<Songbird>,
    sessions: RwLock<HashMap<u64, VoiceSession>>,
    receivers: RwLock<HashMap<u64, Arc<VoiceReceiver>>>,
    /// Lock to prevent overlapping TTS - one speak at a time per guild
    speaking_locks: RwLock<HashMap<u64, Arc<Mutex<()>>>>,
    tts: Arc<dyn VoiceEngine>,
    synthesis: SynthesisConfig,
}

impl VoiceManager {
    pub fn new(songbird: Arc<Songbird>, tts: Arc<dyn VoiceEngine>, synthesis: SynthesisConfig) -> Self {
        Self {
            songbird,
            sessions: RwLock::new(HashMap::new()),
            receivers: RwLock::new(HashMap::new()),
            speaking_locks: RwLock::new(HashMap::new()),
            tts,
            synthesis,
        }
    }

    /// Whether a voice connection exists for the guild
    pub async fn is_connected(&self, guild_id: u64) -> bool {
        self.sessions.read().await.contains_key(&guild_id)
    }

    /// Whether voice capture is running for the guild
    pub async fn is_listening(&self, guild_id: u64) -> bool {
        self.sessions
            .read()
            .await
            .get(&guild_id)
            .map(|s| s.listening)
            .unwrap_or(false)
    }

    /// Join a voice channel
    ///
    /// Fails with `AlreadyConnected` when a session exists; the existing
    /// connection is left untouched.
    pub async fn join_channel(&self, guild_id: u64, channel_id: u64) -> std::result::Result<(), CommandError> {
        if self.is_connected(guild_id).await {
            return Err(CommandError::AlreadyConnected);
        }

        match self
            .songbird
            .join(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
        {
            Ok(_call) => {
                info!(guild_id, channel_id, "Joined voice channel");
                self.sessions
                    .write()
                    .await
                    .insert(guild_id, VoiceSession::new(guild_id, channel_id));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, guild_id, channel_id, "Failed to join voice channel");
                Err(CommandError::Connection(e.to_string()))
            }
        }
    }

    /// Attach capture handlers for the guild's connection
    pub async fn begin_listening(
        &self,
        guild_id: u64,
        receiver: Arc<VoiceReceiver>,
    ) -> std::result::Result<(), CommandError> {
        if self.is_listening(guild_id).await {
            return Err(CommandError::AlreadyListening);
        }
        let call_lock = self
            .songbird
            .get(GuildId::new(guild_id))
            .ok_or(CommandError::NotConnected)?;

        {
            let mut call = call_lock.lock().await;
            call.add_global_event(
                Event::Core(CoreEvent::VoiceTick),
                CaptureHandler {
                    receiver: Arc::clone(&receiver),
                },
            );
            call.add_global_event(
                Event::Core(CoreEvent::SpeakingStateUpdate),
                CaptureHandler {
                    receiver: Arc::clone(&receiver),
                },
            );
        }

        receiver.set_enabled(true);
        self.receivers.write().await.insert(guild_id, receiver);
        if let Some(session) = self.sessions.write().await.get_mut(&guild_id) {
            session.listening = true;
            session.touch();
        }
        info!(guild_id, "Voice capture registered (VoiceTick + SpeakingStateUpdate)");
        Ok(())
    }

    /// Detach capture for the guild, keeping the connection
    pub async fn stop_listening(&self, guild_id: u64) -> std::result::Result<(), CommandError> {
        let receiver = self
            .receivers
            .write()
            .await
            .remove(&guild_id)
            .ok_or(CommandError::NotListening)?;
        receiver.set_enabled(false);

        if let Some(call_lock) = self.songbird.get(GuildId::new(guild_id)) {
            call_lock.lock().await.remove_all_global_events();
        }
        if let Some(session) = self.sessions.write().await.get_mut(&guild_id) {
            session.listening = false;
        }
        info!(guild_id, "Stopped listening");
        Ok(())
    }

    /// Leave a voice channel
    pub async fn leave_channel(&self, guild_id: u64) -> std::result::Result<(), CommandError> {
        if !self.is_connected(guild_id).await {
            return Err(CommandError::NotConnected);
        }

        if let Some(receiver) = self.receivers.write().await.remove(&guild_id) {
            receiver.set_enabled(false);
        }
        if let Err(e) = self.songbird.remove(GuildId::new(guild_id)).await {
            warn!(error = %e, guild_id, "Error leaving voice channel");
        }
        self.sessions.write().await.remove(&guild_id);

        info!(guild_id, "Left voice channel");
        Ok(())
    }

    /// Disconnect from every guild
    pub async fn leave_all(&self) {
        let guilds: Vec<u64> = self.sessions.read().await.keys().copied().collect();
        for guild_id in guilds {
            let _ = self.leave_channel(guild_id).await;
        }
    }

    async fn get_speaking_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.speaking_locks.write().await;
        Arc::clone(locks.entry(guild_id).or_default())
    }

    /// Speak text in a voice channel using TTS
    ///
    /// A per-guild lock keeps replies sequential. The text is split into
    /// sentence chunks; while one chunk plays, the next is already being
    /// synthesized.
    pub async fn speak(&self, guild_id: u64, text: &str) -> Result<()> {
        let speaking_lock = self.get_speaking_lock(guild_id).await;
        let _guard = speaking_lock.lock().await;

        let call_lock = self
            .songbird
            .get(GuildId::new(guild_id))
            .ok_or_else(|| AlvinError::discord("Not in a voice channel"))?;

        let chunks = chunk_sentences(text, SENTENCES_PER_CHUNK);
        if chunks.is_empty() {
            return Ok(());
        }

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(&guild_id) {
                session.touch();
                session.is_speaking = true;
            }
        }

        let result = self.play_chunks(guild_id, &call_lock, &chunks).await;

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(&guild_id) {
                session.is_speaking = false;
            }
        }

        result
    }

    async fn play_chunks(
        &self,
        guild_id: u64,
        call_lock: &Arc<Mutex<Call>>,
        chunks: &[String],
    ) -> Result<()> {
        let mut pending = Some(self.spawn_synthesis(chunks[0].clone()));

        for index in 0..chunks.len() {
            let handle = match pending.take() {
                Some(handle) => handle,
                None => break,
            };
            let audio = handle
                .await
                .map_err(|e| AlvinError::other(format!("Synthesis task failed: {}", e)))??;

            if let Some(next) = chunks.get(index + 1) {
                pending = Some(self.spawn_synthesis(next.clone()));
            }

            debug!(
                guild_id,
                chunk = index,
                audio_size = audio.data.len(),
                format = audio.format.as_str(),
                "Playing synthesized chunk"
            );
            self.play_audio(call_lock, &audio).await;
        }

        Ok(())
    }

    fn spawn_synthesis(&self, text: String) -> tokio::task::JoinHandle<Result<AudioData>> {
        let tts = Arc::clone(&self.tts);
        let config = self.synthesis.clone();
        tokio::spawn(async move { tts.synthesize(&text, &config).await })
    }

    /// Hand one audio chunk to songbird and wait out its estimated duration
    ///
    /// The wait keeps the speaking lock held so chunks cannot overlap.
    async fn play_audio(&self, call_lock: &Arc<Mutex<Call>>, audio: &AudioData) {
        let input: Input = match audio.format {
            AudioFormat::Pcm => {
                // Raw PCM needs a WAV header for symphonia to decode
                let wav = wrap_pcm_in_wav(&audio.data, audio.sample_rate, 1, 16);
                let audio_bytes: &'static [u8] = Box::leak(wav.into_boxed_slice());
                audio_bytes.into()
            }
            _ => {
                let audio_bytes: &'static [u8] = Box::leak(audio.data.to_vec().into_boxed_slice());
                audio_bytes.into()
            }
        };

        {
            let mut call = call_lock.lock().await;
            let _track_handle = call.play_input(input);
        }

        let duration_secs = estimate_playback_secs(audio);
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    }
}

/// Estimate playback duration from payload size
fn estimate_playback_secs(audio: &AudioData) -> u64 {
    let bytes_per_second = match audio.format {
        // PCM 16-bit mono at sample_rate
        AudioFormat::Pcm => (audio.sample_rate * 2) as f64,
        // encoded formats are ~3-4KB/s for speech
        _ => 4000.0,
    };
    (audio.data.len() as f64 / bytes_per_second).max(1.0).ceil() as u64
}
