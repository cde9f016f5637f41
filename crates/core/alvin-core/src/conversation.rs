//! Conversation state and the language-model seam
//!
//! A [`ConversationHistory`] keeps a bounded window of turns per user with
//! the system prompt pinned at the front. The [`ConversationEngine`] owns
//! one history per user and talks to whatever [`ChatModel`] implementation
//! it was constructed with. History is only committed after the model call
//! succeeds, so it never contains half-finished exchanges.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

/// Marker token the model appends to signal the conversation has ended
pub const END_MARKER: &str = "True";

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant reply
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Turn {
    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded per-user conversation window
///
/// The system prompt is stored separately and never evicted; only
/// user/assistant turns count against `max_turns`. Once the window is full,
/// appending evicts the oldest turn first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system_prompt: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationHistory {
    /// Create an empty history with the given prompt and turn cap
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            turns: VecDeque::new(),
            max_turns: max_turns.max(2),
        }
    }

    /// Append a turn, evicting from the front when at capacity
    pub fn push(&mut self, turn: Turn) {
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Number of stored user/assistant turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns have been stored yet
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Full model context: system prompt followed by the stored turns
    pub fn context(&self) -> Vec<Turn> {
        let mut context = Vec::with_capacity(self.turns.len() + 1);
        context.push(Turn::system(self.system_prompt.clone()));
        context.extend(self.turns.iter().cloned());
        context
    }
}

/// Language-model seam
///
/// Implemented by chat providers; the engine and tests depend only on this
/// trait.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name, for logging
    fn name(&self) -> &str;

    /// Produce a single reply for the given ordered context
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}

/// Strip the end-of-conversation marker from a reply
///
/// Returns the reply without the marker and whether it was present. The
/// marker is the last whitespace-separated token, optionally followed by
/// `.` or `!`.
pub fn strip_end_marker(reply: &str) -> (String, bool) {
    let trimmed = reply.trim_end();
    let last = match trimmed.rsplit(char::is_whitespace).next() {
        Some(word) => word,
        None => return (reply.to_string(), false),
    };
    if last.trim_end_matches(['.', '!']) != END_MARKER {
        return (reply.to_string(), false);
    }
    let cut = trimmed.len() - last.len();
    (trimmed[..cut].trim_end().to_string(), true)
}

/// Per-user conversation state plus the model behind it
pub struct ConversationEngine {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    max_turns: usize,
    histories: Mutex<HashMap<u64, ConversationHistory>>,
}

impl ConversationEngine {
    /// Create an engine over the given model
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            max_turns,
            histories: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a reply for one user utterance
    ///
    /// The new user turn is sent together with the stored history; both the
    /// user turn and the reply are committed only when the model call
    /// succeeds. On error the history is left exactly as it was.
    pub async fn respond(&self, user_id: u64, text: &str) -> Result<String> {
        let context = {
            let mut histories = self.histories.lock().unwrap();
            let history = histories
                .entry(user_id)
                .or_insert_with(|| ConversationHistory::new(&self.system_prompt, self.max_turns));
            let mut context = history.context();
            context.push(Turn::user(text));
            context
        };

        debug!(user_id, turns = context.len(), model = self.model.name(), "Requesting chat completion");
        let reply = self.model.complete(&context).await?;

        let mut histories = self.histories.lock().unwrap();
        if let Some(history) = histories.get_mut(&user_id) {
            history.push(Turn::user(text));
            history.push(Turn::assistant(reply.clone()));
        }
        Ok(reply)
    }

    /// One-shot completion with a custom prompt, bypassing stored history
    pub async fn oneshot(&self, system_prompt: &str, text: &str) -> Result<String> {
        let context = vec![Turn::system(system_prompt), Turn::user(text)];
        self.model.complete(&context).await
    }

    /// Drop the stored history for one user
    pub fn end_conversation(&self, user_id: u64) {
        if self.histories.lock().unwrap().remove(&user_id).is_some() {
            info!(user_id, "Conversation ended");
        }
    }

    /// Drop all stored histories
    pub fn clear(&self) {
        self.histories.lock().unwrap().clear();
    }

    /// Number of stored turns for a user (0 when no history exists)
    pub fn turn_count(&self, user_id: u64) -> usize {
        self.histories
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}
