//! Transcript routing: wake-phrase gating and reply generation
//!
//! Every flushed transcript for a guild passes through one
//! [`UtterancePipeline`]. While no conversation is active, transcripts are
//! only scanned for a wake phrase; the wake utterance itself arms the
//! pipeline but is never answered. Once a caller is active, only that
//! caller's utterances reach the language model. A farewell phrase or the
//! model's end marker closes the conversation and drops its history.

use std::sync::{Arc, Mutex};

use alvin_core::{strip_end_marker, ConversationEngine};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::voice::VoiceManager;

/// Case-insensitive substring matcher over a configured phrase list
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: Vec<String>,
}

impl PhraseMatcher {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether any configured phrase occurs in the text
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.phrases.iter().any(|phrase| lower.contains(phrase))
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// Per-guild utterance processing state
pub struct UtterancePipeline {
    /// Guild this pipeline serves
    pub guild_id: u64,
    wake: PhraseMatcher,
    farewell: PhraseMatcher,
    engine: Arc<ConversationEngine>,
    active_caller: Mutex<Option<u64>>,
}

impl UtterancePipeline {
    pub fn new(
        guild_id: u64,
        wake: PhraseMatcher,
        farewell: PhraseMatcher,
        engine: Arc<ConversationEngine>,
    ) -> Self {
        Self {
            guild_id,
            wake,
            farewell,
            engine,
            active_caller: Mutex::new(None),
        }
    }

    /// The user bound to the current conversation, if any
    pub fn active_caller(&self) -> Option<u64> {
        *self.active_caller.lock().unwrap()
    }

    /// Process one transcript; returns the reply to speak, if any
    pub async fn handle_transcript(&self, user_id: u64, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match self.active_caller() {
            Some(caller) if caller != user_id => {
                debug!(
                    guild_id = self.guild_id,
                    user_id, caller, "Ignoring utterance from non-caller"
                );
                return None;
            }
            None => {
                if !self.wake.matches(text) {
                    return None;
                }
                *self.active_caller.lock().unwrap() = Some(user_id);
                info!(
                    guild_id = self.guild_id,
                    user_id, "Wake phrase detected, conversation started"
                );
                // The wake utterance only arms the pipeline
                return None;
            }
            Some(_) => {}
        }

        if self.farewell.matches(text) {
            self.finish(user_id);
            return None;
        }

        let reply = match self.engine.respond(user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    error = %e,
                    guild_id = self.guild_id,
                    user_id,
                    "Reply generation failed, dropping turn"
                );
                return None;
            }
        };

        let (reply, ended) = strip_end_marker(&reply);
        if ended {
            self.finish(user_id);
        }

        if reply.is_empty() {
            None
        } else {
            Some(reply)
        }
    }

    /// Clear the active caller without touching history
    ///
    /// Used when capture is stopped; the conversation can resume after the
    /// next wake phrase.
    pub fn reset(&self) {
        *self.active_caller.lock().unwrap() = None;
    }

    fn finish(&self, user_id: u64) {
        *self.active_caller.lock().unwrap() = None;
        self.engine.end_conversation(user_id);
        info!(
            guild_id = self.guild_id,
            user_id, "Voice conversation ended"
        );
    }
}

/// Consume transcripts for one guild, one utterance at a time
///
/// A single consumer per guild keeps turns within one user's history in
/// flush order.
pub fn spawn_pipeline(
    pipeline: Arc<UtterancePipeline>,
    voice_manager: Arc<VoiceManager>,
    mut transcript_rx: mpsc::Receiver<(u64, String)>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((user_id, text)) = transcript_rx.recv().await {
            if let Some(reply) = pipeline.handle_transcript(user_id, &text).await {
                info!(
                    guild_id = pipeline.guild_id,
                    user_id,
                    reply_len = reply.len(),
                    "Speaking reply"
                );
                if let Err(e) = voice_manager.speak(pipeline.guild_id, &reply).await {
                    warn!(error = %e, guild_id = pipeline.guild_id, "Failed to speak reply");
                }
            }
        }
        debug!(guild_id = pipeline.guild_id, "Pipeline task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvin_core::{AlvinError, ChatModel, Result, Turn};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _turns: &[Turn]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AlvinError::model("script exhausted"))
        }
    }

    fn test_pipeline(model: Arc<ScriptedModel>) -> (UtterancePipeline, Arc<ConversationEngine>) {
        let engine = Arc::new(ConversationEngine::new(model, "prompt", 20));
        let pipeline = UtterancePipeline::new(
            1,
            PhraseMatcher::new(["alvin", "alwin"]),
            PhraseMatcher::new(["goodbye", "bye bye", "that's all"]),
            Arc::clone(&engine),
        );
        (pipeline, engine)
    }

    #[test]
    fn test_phrase_matcher_case_insensitive_substring() {
        let matcher = PhraseMatcher::new(["alvin", "alwin"]);
        assert!(matcher.matches("Hi Alvin"));
        assert!(matcher.matches("HEY ALWIN!"));
        assert!(matcher.matches("okay alvin, listen"));
        assert!(!matcher.matches("hello there"));

        let empty = PhraseMatcher::new(Vec::<String>::new());
        assert!(empty.is_empty());
        assert!(!empty.matches("anything"));
    }

    #[tokio::test]
    async fn test_wake_scenario_end_to_end() {
        let model = ScriptedModel::new(&["Four"]);
        let (pipeline, engine) = test_pipeline(model.clone());

        // wake phrase arms the pipeline, no model call
        assert_eq!(pipeline.handle_transcript(7, "Hi Alvin").await, None);
        assert_eq!(pipeline.active_caller(), Some(7));
        assert_eq!(model.calls(), 0);

        // next utterance is answered
        let reply = pipeline.handle_transcript(7, "What is two plus two").await;
        assert_eq!(reply.as_deref(), Some("Four"));
        assert_eq!(model.calls(), 1);
        assert_eq!(engine.turn_count(7), 2);

        // farewell clears listening, no further model calls
        assert_eq!(pipeline.handle_transcript(7, "thank you, goodbye").await, None);
        assert_eq!(pipeline.active_caller(), None);
        assert_eq!(engine.turn_count(7), 0);

        assert_eq!(pipeline.handle_transcript(7, "are you still there").await, None);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_utterances_without_wake_are_ignored() {
        let model = ScriptedModel::new(&["never used"]);
        let (pipeline, _engine) = test_pipeline(model.clone());

        assert_eq!(pipeline.handle_transcript(7, "what's the weather").await, None);
        assert_eq!(pipeline.active_caller(), None);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_caller_utterances_are_dropped() {
        let model = ScriptedModel::new(&["reply one"]);
        let (pipeline, _engine) = test_pipeline(model.clone());

        pipeline.handle_transcript(7, "alvin, hello").await;
        assert_eq!(pipeline.active_caller(), Some(7));

        // another user speaks while user 7 holds the conversation
        assert_eq!(pipeline.handle_transcript(8, "answer me instead").await, None);
        assert_eq!(model.calls(), 0);
        assert_eq!(pipeline.active_caller(), Some(7));
    }

    #[tokio::test]
    async fn test_end_marker_closes_conversation() {
        let model = ScriptedModel::new(&["Glad I could help. True"]);
        let (pipeline, engine) = test_pipeline(model.clone());

        pipeline.handle_transcript(7, "hey alvin").await;
        let reply = pipeline.handle_transcript(7, "thanks for everything").await;
        assert_eq!(reply.as_deref(), Some("Glad I could help."));
        assert_eq!(pipeline.active_caller(), None);
        assert_eq!(engine.turn_count(7), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_drops_turn_and_keeps_session() {
        let model = ScriptedModel::new(&[]);
        let (pipeline, engine) = test_pipeline(model.clone());

        pipeline.handle_transcript(7, "alvin?").await;
        assert_eq!(pipeline.handle_transcript(7, "tell me a story").await, None);
        // conversation stays active, history untouched
        assert_eq!(pipeline.active_caller(), Some(7));
        assert_eq!(engine.turn_count(7), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_caller_but_not_history() {
        let model = ScriptedModel::new(&["reply"]);
        let (pipeline, engine) = test_pipeline(model.clone());

        pipeline.handle_transcript(7, "alvin").await;
        pipeline.handle_transcript(7, "hello there").await;
        assert_eq!(engine.turn_count(7), 2);

        pipeline.reset();
        assert_eq!(pipeline.active_caller(), None);
        assert_eq!(engine.turn_count(7), 2);
    }
}
