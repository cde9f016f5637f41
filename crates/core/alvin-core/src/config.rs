//! Configuration management and environment variable loading

use crate::{AlvinError, Result};
use std::env;

/// Default system prompt for voice conversations.
///
/// Mirrors the personality the bot was deployed with: answers are spoken,
/// so numbers are written out and the reply is plain words. The trailing
/// `True` token is the end-of-conversation marker the pipeline strips.
pub const DEFAULT_VOICE_PROMPT: &str = "You are a friendly and funny voice assistant \
on Discord, and your name is Alvin. Act as if you are chatting on a Discord voice \
channel. Write out all digits and numbers as words. Use only words in your replies! \
If the user thanks you or you detect that the conversation has ended, append the \
word 'True' at the very end of your reply.";

/// Default system prompt for text-channel replies.
pub const DEFAULT_TEXT_PROMPT: &str = "You are a funny text assistant on Discord \
named Alvin. Always reply briefly and concisely, in at most one hundred words.";

/// Load environment variables from a .env file
///
/// Safe to call when no .env file exists; in that case only the system
/// environment is used.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(AlvinError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(AlvinError::config(format!("Failed to load .env file: {}", e))),
    }
}

/// Get required environment variable
///
/// Returns an error if the variable is not set
pub fn get_required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| {
        AlvinError::config(format!(
            "Required environment variable '{}' is not set. \
             Check your .env file or system environment.",
            key
        ))
    })
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Get environment variable as a comma-separated list
///
/// Entries are trimmed; empty entries are dropped. Falls back to `default`
/// when the variable is unset or yields no entries.
pub fn get_env_list(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

/// Validate that required environment variables are set
pub fn validate_env(required_vars: &[&str]) -> Result<()> {
    let mut missing = Vec::new();

    for var in required_vars {
        if env::var(var).is_err() {
            missing.push(*var);
        }
    }

    if !missing.is_empty() {
        return Err(AlvinError::config(format!(
            "Missing required environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// Process-wide configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Discord bot authentication token
    pub discord_token: String,
    /// Discord user id allowed to shut the bot down
    pub owner_id: u64,
    /// API key for the chat/speech provider
    pub openai_api_key: String,
    /// Chat completion model id
    pub chat_model: String,
    /// Speech-to-text model id
    pub stt_model: String,
    /// Text-to-speech model id
    pub tts_model: String,
    /// Text-to-speech voice id
    pub tts_voice: String,
    /// Language hint for transcription (ISO 639-1); None = auto-detect
    pub language: Option<String>,
    /// System prompt for voice conversations
    pub system_prompt: String,
    /// System prompt for text-channel replies
    pub text_prompt: String,
    /// Phrases that start a voice conversation
    pub wake_phrases: Vec<String>,
    /// Phrases that end a voice conversation
    pub farewell_phrases: Vec<String>,
    /// Silence interval that closes an utterance, in milliseconds
    pub silence_ms: u64,
    /// Maximum number of stored turns per conversation
    pub max_turns: usize,
}

impl AppConfig {
    /// Resolve configuration from the environment
    ///
    /// Fails fast when any of `DISCORD_TOKEN`, `OWNER_ID` or
    /// `OPENAI_API_KEY` is absent or malformed.
    pub fn from_env() -> Result<Self> {
        validate_env(&["DISCORD_TOKEN", "OWNER_ID", "OPENAI_API_KEY"])?;

        let owner_id = get_required_env("OWNER_ID")?
            .trim()
            .parse::<u64>()
            .map_err(|_| AlvinError::config("OWNER_ID must be a numeric Discord user id"))?;

        let language = env::var("ALVIN_LANGUAGE").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            discord_token: get_required_env("DISCORD_TOKEN")?,
            owner_id,
            openai_api_key: get_required_env("OPENAI_API_KEY")?,
            chat_model: get_env_or("ALVIN_CHAT_MODEL", "gpt-4o-mini"),
            stt_model: get_env_or("ALVIN_STT_MODEL", "whisper-1"),
            tts_model: get_env_or("ALVIN_TTS_MODEL", "tts-1"),
            tts_voice: get_env_or("ALVIN_TTS_VOICE", "echo"),
            language,
            system_prompt: get_env_or("ALVIN_SYSTEM_PROMPT", DEFAULT_VOICE_PROMPT),
            text_prompt: get_env_or("ALVIN_TEXT_PROMPT", DEFAULT_TEXT_PROMPT),
            wake_phrases: get_env_list("ALVIN_WAKE_PHRASES", &["alvin", "alwin"]),
            farewell_phrases: get_env_list(
                "ALVIN_FAREWELL_PHRASES",
                &["goodbye", "bye bye", "that's all"],
            ),
            silence_ms: get_env_int("ALVIN_SILENCE_MS", 1500),
            max_turns: get_env_int("ALVIN_MAX_TURNS", 20),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_or() {
        env::remove_var("ALVIN_TEST_MISSING");
        assert_eq!(get_env_or("ALVIN_TEST_MISSING", "fallback"), "fallback");

        env::set_var("ALVIN_TEST_SET", "value");
        assert_eq!(get_env_or("ALVIN_TEST_SET", "fallback"), "value");
        env::remove_var("ALVIN_TEST_SET");
    }

    #[test]
    fn test_get_env_int() {
        env::set_var("ALVIN_TEST_INT", "2500");
        assert_eq!(get_env_int("ALVIN_TEST_INT", 0u64), 2500);
        env::set_var("ALVIN_TEST_INT", "not a number");
        assert_eq!(get_env_int("ALVIN_TEST_INT", 42u64), 42);
        env::remove_var("ALVIN_TEST_INT");
    }

    #[test]
    fn test_get_env_list() {
        env::set_var("ALVIN_TEST_LIST", "alvin, alwin ,,albin");
        assert_eq!(
            get_env_list("ALVIN_TEST_LIST", &["x"]),
            vec!["alvin", "alwin", "albin"]
        );
        env::remove_var("ALVIN_TEST_LIST");

        assert_eq!(get_env_list("ALVIN_TEST_LIST", &["a", "b"]), vec!["a", "b"]);

        // all-empty value falls back to the default
        env::set_var("ALVIN_TEST_LIST", " , ,");
        assert_eq!(get_env_list("ALVIN_TEST_LIST", &["a"]), vec!["a"]);
        env::remove_var("ALVIN_TEST_LIST");
    }

    #[test]
    fn test_validate_env_reports_missing() {
        env::remove_var("ALVIN_TEST_REQUIRED_A");
        env::remove_var("ALVIN_TEST_REQUIRED_B");
        let err = validate_env(&["ALVIN_TEST_REQUIRED_A", "ALVIN_TEST_REQUIRED_B"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ALVIN_TEST_REQUIRED_A"));
        assert!(msg.contains("ALVIN_TEST_REQUIRED_B"));
    }
}
