//! Conversation model and message filtering.
//!
//! The engine never talks to a host chat UI directly; hosts convert their
//! message log into [`ChatMessage`] values. The [`MessageFilter`] seam decides
//! which entries count as trackable character turns.

use serde::{Deserialize, Serialize};

/// Who authored a chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The human driving the conversation.
    User,
    /// A character turn produced by the text generator.
    Assistant,
    /// Host-injected narration, commands, or metadata.
    System,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Authorship role.
    pub role: MessageRole,
    /// Speaker display name, when the host can resolve one.
    pub author: Option<String>,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// A user-authored message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            author: None,
            content: content.into(),
        }
    }

    /// A character turn with a resolved speaker name.
    #[must_use]
    pub fn assistant(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            author: Some(author.into()),
            content: content.into(),
        }
    }

    /// A system/narration entry.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            author: None,
            content: content.into(),
        }
    }

    /// Trimmed speaker name, if one is present and non-empty.
    #[must_use]
    pub fn speaker(&self) -> Option<&str> {
        self.author
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Decides whether a chat entry is a trackable character turn.
pub trait MessageFilter {
    /// `true` if the message should count for name extraction and activity.
    fn is_trackable(&self, message: &ChatMessage) -> bool;
}

/// Default filter: AI-authored, non-system, non-empty, with a resolvable speaker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageFilter;

impl MessageFilter for DefaultMessageFilter {
    fn is_trackable(&self, message: &ChatMessage) -> bool {
        message.role == MessageRole::Assistant
            && !message.content.trim().is_empty()
            && message.speaker().is_some()
    }
}
