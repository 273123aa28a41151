// Streaming events emitted by the Claude client.

use snaplist_core::CompletionError;

/// One event from a streaming completion.
///
/// `generation` identifies the request that produced the event so consumers
/// can discard events from requests they no longer care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    /// A fragment of response text.
    Token { text: String, generation: u64 },
    /// The response finished.
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
        stop_reason: Option<String>,
        generation: u64,
    },
    /// The request failed.
    Error {
        error: CompletionError,
        generation: u64,
    },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. } => *generation,
            LlmEvent::Complete { generation, .. } => *generation,
            LlmEvent::Error { generation, .. } => *generation,
        }
    }
}
