use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Bot,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Bot => write!(f, "bot"),
        }
    }
}

impl MessageRole {
    /// The remote store tags bot messages with the sender `"model"`;
    /// every other tag is treated as the user.
    pub fn from_sender_tag(tag: &str) -> Self {
        if tag == "model" {
            MessageRole::Bot
        } else {
            MessageRole::User
        }
    }
}

/// Descriptor for a file attached to a message. Copied by value into the
/// message at send time; it never owns a local preview handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// Staged "thinking" text revealed incrementally before the content.
    pub reasoning: Option<String>,
    pub is_reasoning_complete: bool,
    /// True from creation until the remote (or simulated) response resolves.
    pub is_loading: bool,
    pub attachment: Option<AttachmentMeta>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// A user message resolves immediately; it is never in a loading state.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::User,
            content: content.into(),
            reasoning: None,
            is_reasoning_complete: false,
            is_loading: false,
            attachment: None,
            timestamp: None,
        }
    }

    /// Empty bot placeholder, mutated in place once a response arrives.
    pub fn bot_placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Bot,
            content: String::new(),
            reasoning: None,
            is_reasoning_complete: false,
            is_loading: true,
            attachment: None,
            timestamp: None,
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentMeta) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Partial update merged into a message by `MessageStore::patch_message`.
/// Unset fields leave the target untouched.
#[derive(Debug, Clone, Default)]
pub struct MessageDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub is_reasoning_complete: Option<bool>,
    pub is_loading: Option<bool>,
    pub attachment: Option<Option<AttachmentMeta>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessageDelta {
    pub fn apply_to(&self, message: &mut ChatMessage) {
        if let Some(content) = &self.content {
            message.content = content.clone();
        }
        if let Some(reasoning) = &self.reasoning {
            message.reasoning = Some(reasoning.clone());
        }
        if let Some(done) = self.is_reasoning_complete {
            message.is_reasoning_complete = done;
        }
        if let Some(loading) = self.is_loading {
            message.is_loading = loading;
        }
        if let Some(attachment) = &self.attachment {
            message.attachment = attachment.clone();
        }
        if let Some(timestamp) = self.timestamp {
            message.timestamp = Some(timestamp);
        }
    }

    pub fn resolved(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_loading: Some(false),
            ..Self::default()
        }
    }
}
