// Core types for the listing assistant: the listing model, the session store,
// reply interpretation, and the contracts with external services.

pub mod completion;
pub mod config;
pub mod error;
pub mod image;
pub mod interpret;
pub mod listing;
pub mod patch;
pub mod session;
pub mod transcript;

pub use error::{CompletionError, WorkflowError};
