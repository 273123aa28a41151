// Anthropic Messages API client implementing the completion-service contract.

pub mod client;
pub mod protocol;

pub use client::{ClaudeClient, LlmClient};
pub use protocol::LlmEvent;
