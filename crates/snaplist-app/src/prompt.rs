// Prompt templates for listing extraction and listing conversation.
//
// Both prompts pin the JSON shapes the response interpreters look for, so
// field names here must stay in sync with `ListingRecord`'s wire names and
// the patch discriminator.

use snaplist_core::listing::{ListingRecord, MINIMUM_PRICE_PERCENT, TARGET_PRICE_PERCENT};

/// Marker embedded in the conversation prompt when no listing exists yet.
pub const NO_LISTING_MARKER: &str = "NO_LISTING";

/// Instruction sent with the product photo.
pub fn extraction_system_prompt() -> String {
    format!(
        "You are a marketplace listing assistant. You look at a photo of a second-hand \
         item and draft a sales listing for it.\n\
         \n\
         Respond with a single JSON object and nothing else, using exactly these keys:\n\
         {{\n\
         \x20 \"item_name\": string,\n\
         \x20 \"category\": string,\n\
         \x20 \"description\": string,\n\
         \x20 \"condition\": one of \"Excellent\", \"Good\", \"Fair\", \"Poor\",\n\
         \x20 \"listing_price\": integer,\n\
         \x20 \"target_price\": integer ({TARGET_PRICE_PERCENT}% of listing_price),\n\
         \x20 \"minimum_price\": integer ({MINIMUM_PRICE_PERCENT}% of listing_price),\n\
         \x20 \"selling_points\": string, one point per line,\n\
         \x20 \"known_flaws\": string,\n\
         \x20 \"reason_selling\": string,\n\
         \x20 \"delivery_info\": string\n\
         }}\n\
         \n\
         Prices are whole numbers in the local currency with no symbols or separators. \
         Base the price on the visible condition and typical second-hand market value. \
         If the seller's notes contradict the photo, trust the notes."
    )
}

/// The user turn that accompanies the photo.
pub fn extraction_user_prompt(notes: &str) -> String {
    let notes = notes.trim();
    if notes.is_empty() {
        "Draft a listing for the item in this photo.".to_string()
    } else {
        format!("Draft a listing for the item in this photo.\n\nSeller notes:\n{notes}")
    }
}

/// System instruction for a conversation turn, embedding the current listing.
pub fn conversation_system_prompt(listing: Option<&ListingRecord>) -> String {
    let state = match listing {
        Some(listing) => listing.to_prompt_json(),
        None => NO_LISTING_MARKER.to_string(),
    };

    format!(
        "You are a marketplace listing assistant helping a seller refine a product listing \
         and answer questions about selling it.\n\
         \n\
         ## CURRENT LISTING\n\
         {state}\n\
         \n\
         ## HOW TO RESPOND\n\
         When the seller asks to change one or more listing fields, respond with only this \
         JSON object:\n\
         {{\"type\": \"update_product\", \"changes\": {{\"<field>\": <new value>}}, \
         \"message\": \"<short confirmation for the seller>\"}}\n\
         Valid fields: item_name, category, description, condition, listing_price, \
         target_price, minimum_price, selling_points, known_flaws, reason_selling, \
         delivery_info. Prices are whole numbers. When listing_price changes, target_price \
         and minimum_price are recalculated automatically ({TARGET_PRICE_PERCENT}% and \
         {MINIMUM_PRICE_PERCENT}%), so do not include them.\n\
         \n\
         When the seller asks you to rewrite the whole listing, respond with the complete \
         listing as a JSON object using the same keys as CURRENT LISTING.\n\
         \n\
         Otherwise answer conversationally in plain text, without JSON. If the listing is \
         {NO_LISTING_MARKER}, ask the seller to upload a product photo first."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_every_field() {
        let prompt = extraction_system_prompt();
        for key in [
            "item_name",
            "category",
            "description",
            "condition",
            "listing_price",
            "target_price",
            "minimum_price",
            "selling_points",
            "known_flaws",
            "reason_selling",
            "delivery_info",
        ] {
            assert!(prompt.contains(key), "missing {key}");
        }
        assert!(prompt.contains("85%"));
        assert!(prompt.contains("70%"));
    }

    #[test]
    fn extraction_user_prompt_includes_notes() {
        assert!(!extraction_user_prompt("  ").contains("Seller notes"));
        let prompt = extraction_user_prompt("Bought in 2023, box included");
        assert!(prompt.contains("Seller notes:\nBought in 2023, box included"));
    }

    #[test]
    fn conversation_prompt_without_listing_uses_marker() {
        let prompt = conversation_system_prompt(None);
        assert!(prompt.contains(&format!("## CURRENT LISTING\n{NO_LISTING_MARKER}")));
        assert!(prompt.contains("update_product"));
    }

    #[test]
    fn conversation_prompt_embeds_listing_without_image() {
        let listing = ListingRecord {
            item_name: "Marshall Major IV".into(),
            category: "Electronics".into(),
            listing_price: 1_850_000,
            image_data: Some("data:image/png;base64,SECRET".into()),
            ..Default::default()
        };
        let prompt = conversation_system_prompt(Some(&listing));
        assert!(prompt.contains("Marshall Major IV"));
        assert!(prompt.contains("1850000"));
        assert!(!prompt.contains("SECRET"));
        assert!(!prompt.contains(&format!("## CURRENT LISTING\n{NO_LISTING_MARKER}")));
    }
}
