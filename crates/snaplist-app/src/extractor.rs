// Listing extractor: one product photo (plus notes) in, one listing out.

use snaplist_core::completion::{ChatMessage, CompletionRequest};
use snaplist_core::image::ImagePayload;
use snaplist_core::interpret::extract_listing;
use snaplist_core::listing::ListingRecord;
use snaplist_core::WorkflowError;
use tracing::{info, warn};

use crate::prompt;

/// Build the single request that asks the service to draft a listing.
pub fn extraction_request(image: &ImagePayload, notes: &str, max_tokens: u32) -> CompletionRequest {
    CompletionRequest {
        system: prompt::extraction_system_prompt(),
        messages: vec![ChatMessage::user(prompt::extraction_user_prompt(notes))],
        image: Some(image.clone()),
        max_tokens,
    }
}

/// Parse the service's response into a listing and attach the image.
///
/// Target and minimum prices are always re-derived from the listing price.
pub fn parse_extraction(
    response: &str,
    image: &ImagePayload,
) -> Result<ListingRecord, WorkflowError> {
    let mut record = extract_listing(response).map_err(|reason| {
        warn!(%reason, "extraction response rejected");
        WorkflowError::MalformedExtraction(reason)
    })?;
    record.image_data = Some(image.to_data_url());

    info!(
        item = %record.item_name,
        category = %record.category,
        listing_price = record.listing_price,
        "extracted listing"
    );
    Ok(record)
}
