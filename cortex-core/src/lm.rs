//! The language-model port — chat and code-generation capabilities.

use crate::error::LmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role tag on a provider message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions and context framing.
    System,
    /// The agent speaking to the model.
    User,
    /// A prior model response.
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// The text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: text.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: text.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: text.into(),
        }
    }
}

/// The structured response shape preferred from coding prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeDraft {
    /// The model's reasoning about the fix.
    pub thought: String,
    /// The code blob.
    pub code: String,
}

/// Priority class for queued language-model requests. Higher drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmPriority {
    /// Best-effort background work.
    Low,
    /// Ordinary deliberative calls.
    Normal,
    /// Time-sensitive planning.
    High,
    /// Life-or-death: jumps every queue.
    Survival,
}

/// The language-model port. All calls are suspension points and must be
/// cancellable by dropping the future.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Conversational capability.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LmError>;

    /// Code-generation capability. May return plain text containing a
    /// fenced block, or a JSON-wrapped [`CodeDraft`].
    async fn prompt_coding(&self, messages: &[ChatMessage]) -> Result<String, LmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(LmPriority::Survival > LmPriority::High);
        assert!(LmPriority::High > LmPriority::Normal);
        assert!(LmPriority::Normal > LmPriority::Low);
    }
}
