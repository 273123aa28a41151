// Error taxonomy for the listing workflow and the completion service it calls.

use thiserror::Error;

/// Errors surfaced to callers of the listing workflow.
///
/// Parse misses while interpreting a conversational reply are not errors;
/// they fall through to a plain-text reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The completion service could not be reached, failed, or timed out.
    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service answered but no acceptable listing could be parsed.
    #[error("could not extract a listing: {0}")]
    MalformedExtraction(String),

    /// Another exchange is still in flight for this session.
    #[error("another request is already in progress")]
    Busy,

    /// The in-flight exchange was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// There is no current listing to act on.
    #[error("no listing in the current session")]
    NoListing,

    /// The remote listing backend rejected or failed the submission.
    #[error("listing backend error: {0}")]
    Backend(String),
}

/// Failures reported by a completion service implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("LLM not configured")]
    NotConfigured,

    #[error("network error: {0}")]
    Transport(String),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream ended without any content")]
    EmptyResponse,
}

impl From<CompletionError> for WorkflowError {
    fn from(err: CompletionError) -> Self {
        WorkflowError::ServiceUnavailable(err.to_string())
    }
}
