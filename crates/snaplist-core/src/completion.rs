// Contract consumed from the external completion service.

use async_trait::async_trait;

use crate::error::CompletionError;
use crate::image::ImagePayload;
use crate::transcript::{Role, TranscriptEntry};

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&TranscriptEntry> for ChatMessage {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            role: entry.role,
            content: entry.content.clone(),
        }
    }
}

/// A system instruction, the prior turns, and optionally an image inlined
/// into the last user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub image: Option<ImagePayload>,
    pub max_tokens: u32,
}

/// A service that answers a request with free-form text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
