//! Error types shared across the Alvin workspace

use thiserror::Error;

/// Top-level error type for the Alvin voicebot
#[derive(Error, Debug)]
pub enum AlvinError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model/LLM error
    #[error("Model error: {0}")]
    Model(String),

    /// Audio capture or playback error
    #[error("Audio error: {0}")]
    Audio(String),

    /// Discord gateway or voice-connection error
    #[error("Discord error: {0}")]
    Discord(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl AlvinError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        AlvinError::Config(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        AlvinError::Model(msg.into())
    }

    /// Create an audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        AlvinError::Audio(msg.into())
    }

    /// Create a Discord error
    pub fn discord(msg: impl Into<String>) -> Self {
        AlvinError::Discord(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        AlvinError::Other(msg.into())
    }
}

/// Result type alias using [`AlvinError`]
pub type Result<T> = std::result::Result<T, AlvinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AlvinError::config("DISCORD_TOKEN missing");
        assert_eq!(err.to_string(), "Configuration error: DISCORD_TOKEN missing");

        let err = AlvinError::model("rate limited");
        assert_eq!(err.to_string(), "Model error: rate limited");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AlvinError = io.into();
        assert!(matches!(err, AlvinError::Io(_)));
    }
}
