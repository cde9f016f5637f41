//! Alvin Core
//!
//! Core building blocks for the Alvin Discord voice assistant:
//!
//! - Error types shared across the workspace
//! - Environment-based configuration with fail-fast validation
//! - Bounded conversation history and the language-model seam
//! - Logging initialization
//!
//! # Example
//!
//! ```no_run
//! use alvin_core::{AppConfig, Result};
//!
//! fn main() -> Result<()> {
//!     alvin_core::config::load_env().ok();
//!     alvin_core::logger::init_logging();
//!     let config = AppConfig::from_env()?;
//!     println!("owner: {}", config.owner_id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod conversation;
pub mod error;
pub mod logger;

pub use config::AppConfig;
pub use conversation::{
    strip_end_marker, ChatModel, ConversationEngine, ConversationHistory, Role, Turn,
};
pub use error::{AlvinError, Result};
