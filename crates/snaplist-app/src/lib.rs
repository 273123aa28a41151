// Listing workflow: extraction from a photo, conversational refinement, and
// publishing, coordinated per session by `Assistant`.

pub mod assistant;
pub mod extractor;
pub mod prompt;
pub mod publish;
pub mod updater;

pub use assistant::{Assistant, SessionSettings};
pub use publish::{HttpBackend, ListingBackend, ListingSubmission};
pub use updater::ChatReply;
