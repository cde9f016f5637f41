//! Chat command parsing and command-level errors

use thiserror::Error;

/// Prefix that marks a message as a command
pub const COMMAND_PREFIX: char = '!';

/// Recognized chat commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to the invoker's voice channel
    Join,
    /// Disconnect from the guild's voice channel
    Leave,
    /// Start capturing and answering voice in the current channel
    Listen,
    /// Stop capturing voice, keep the connection
    StopListening,
    /// Disconnect everywhere and stop the process (owner only)
    Shutdown,
    /// Liveness check
    Ping,
    /// Anything else behind the prefix
    Unknown(String),
}

impl Command {
    /// Parse a message as a prefix command; `None` when the message is not
    /// a command at all.
    pub fn parse(content: &str) -> Option<Command> {
        let rest = content.trim().strip_prefix(COMMAND_PREFIX)?;
        let name = rest.split_whitespace().next()?;
        Some(match name.to_lowercase().as_str() {
            "join" => Command::Join,
            "leave" => Command::Leave,
            "listen" => Command::Listen,
            "stop_listening" => Command::StopListening,
            "shutdown" => Command::Shutdown,
            "ping" => Command::Ping,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// Command failures, worded as the reply shown to the invoking user
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Bot already has a voice connection in this guild
    #[error("I am already in a voice channel here.")]
    AlreadyConnected,

    /// No voice connection in this guild
    #[error("I am not in a voice channel.")]
    NotConnected,

    /// Capture is already running
    #[error("I am already listening here.")]
    AlreadyListening,

    /// Capture is not running
    #[error("I am currently not listening here.")]
    NotListening,

    /// The invoking user is not in any voice channel
    #[error("You aren't in a voice channel!")]
    UserNotInChannel,

    /// Owner-only command invoked by someone else
    #[error("You do not have permission to shut down the bot.")]
    NotAuthorized,

    /// Voice command used outside a guild
    #[error("Voice commands only work in a server.")]
    GuildOnly,

    /// Unrecognized command name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Underlying voice connection failure
    #[error("Could not join voice: {0}")]
    Connection(String),
}

/// Gate an owner-only command
pub fn require_owner(owner_id: u64, user_id: u64) -> Result<(), CommandError> {
    if user_id == owner_id {
        Ok(())
    } else {
        Err(CommandError::NotAuthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("!join"), Some(Command::Join));
        assert_eq!(Command::parse("!leave"), Some(Command::Leave));
        assert_eq!(Command::parse("!listen"), Some(Command::Listen));
        assert_eq!(Command::parse("!stop_listening"), Some(Command::StopListening));
        assert_eq!(Command::parse("!shutdown"), Some(Command::Shutdown));
        assert_eq!(Command::parse("  !ping  "), Some(Command::Ping));
        assert_eq!(Command::parse("!LISTEN"), Some(Command::Listen));
    }

    #[test]
    fn test_parse_non_commands() {
        assert_eq!(Command::parse("hello alvin"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("!"), None);
        assert_eq!(
            Command::parse("!dance"),
            Some(Command::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_require_owner() {
        assert!(require_owner(42, 42).is_ok());
        assert_eq!(require_owner(42, 7), Err(CommandError::NotAuthorized));
    }

    #[test]
    fn test_error_messages_are_user_facing() {
        assert_eq!(
            CommandError::UserNotInChannel.to_string(),
            "You aren't in a voice channel!"
        );
        assert_eq!(
            CommandError::NotAuthorized.to_string(),
            "You do not have permission to shut down the bot."
        );
        assert_eq!(
            CommandError::UnknownCommand("dance".to_string()).to_string(),
            "Unknown command: dance"
        );
    }
}
