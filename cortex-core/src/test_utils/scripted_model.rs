//! ScriptedModel — canned language-model responses for testing.

use crate::error::LmError;
use crate::lm::{ChatMessage, LanguageModel};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A [`LanguageModel`] that replays queued responses and counts calls.
///
/// An exhausted queue fails with `ServiceUnavailable`, which doubles as
/// a way to script provider outages.
#[derive(Default)]
pub struct ScriptedModel {
    chat_queue: Mutex<VecDeque<String>>,
    coding_queue: Mutex<VecDeque<String>>,
    chat_calls: AtomicUsize,
    coding_calls: AtomicUsize,
}

impl ScriptedModel {
    /// An empty model (every call fails).
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chat response.
    pub fn push_chat(&self, text: impl Into<String>) {
        self.chat_queue.lock().unwrap().push_back(text.into());
    }

    /// Queue a coding response.
    pub fn push_coding(&self, text: impl Into<String>) {
        self.coding_queue.lock().unwrap().push_back(text.into());
    }

    /// How many chat calls were made.
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// How many coding calls were made.
    pub fn coding_calls(&self) -> usize {
        self.coding_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LmError::ServiceUnavailable("script exhausted".into()))
    }

    async fn prompt_coding(&self, _messages: &[ChatMessage]) -> Result<String, LmError> {
        self.coding_calls.fetch_add(1, Ordering::SeqCst);
        self.coding_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LmError::ServiceUnavailable("script exhausted".into()))
    }
}
