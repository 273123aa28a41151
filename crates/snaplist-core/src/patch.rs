// Field-level partial updates to a listing.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::listing::{coerce_price, coerce_text, Condition, ListingRecord};

/// A partial update to specific listing fields, detected in a
/// conversational reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPatch {
    pub changes: Map<String, Value>,
    /// Text to show the user alongside the update, when the reply had one.
    pub message: Option<String>,
}

/// What applying a patch actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Canonical names of the fields that were written.
    pub applied: Vec<&'static str>,
    /// Keys that were skipped: unknown field names or values of the wrong type.
    pub ignored: Vec<String>,
}

impl PatchOutcome {
    pub fn price_changed(&self) -> bool {
        self.applied.contains(&"listing_price")
    }
}

/// Listing fields a patch may touch. `image_data` is not editable from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ItemName,
    Category,
    Description,
    Condition,
    ListingPrice,
    TargetPrice,
    MinimumPrice,
    SellingPoints,
    KnownFlaws,
    ReasonForSelling,
    DeliveryInfo,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "item_name" | "itemName" => Some(Field::ItemName),
            "category" => Some(Field::Category),
            "description" => Some(Field::Description),
            "condition" => Some(Field::Condition),
            "listing_price" | "listingPrice" => Some(Field::ListingPrice),
            "target_price" | "targetPrice" => Some(Field::TargetPrice),
            "minimum_price" | "minimumPrice" | "min_price" => Some(Field::MinimumPrice),
            "selling_points" | "sellingPoints" => Some(Field::SellingPoints),
            "known_flaws" | "knownFlaws" => Some(Field::KnownFlaws),
            "reason_selling" | "reason_for_selling" | "reasonForSelling" => {
                Some(Field::ReasonForSelling)
            }
            "delivery_info" | "deliveryInfo" => Some(Field::DeliveryInfo),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::ItemName => "item_name",
            Field::Category => "category",
            Field::Description => "description",
            Field::Condition => "condition",
            Field::ListingPrice => "listing_price",
            Field::TargetPrice => "target_price",
            Field::MinimumPrice => "minimum_price",
            Field::SellingPoints => "selling_points",
            Field::KnownFlaws => "known_flaws",
            Field::ReasonForSelling => "reason_selling",
            Field::DeliveryInfo => "delivery_info",
        }
    }
}

impl ListingPatch {
    /// Apply the recognised changes to `listing` in place.
    ///
    /// Unknown keys and uncoercible values are skipped and reported in the
    /// outcome. When `listing_price` changes, target and minimum prices are
    /// re-derived from it, overriding any explicit values in the same patch.
    pub fn apply(&self, listing: &mut ListingRecord) -> PatchOutcome {
        let mut outcome = PatchOutcome::default();

        for (key, value) in &self.changes {
            let Some(field) = Field::from_key(key) else {
                warn!(field = %key, "ignoring unknown field in listing patch");
                outcome.ignored.push(key.clone());
                continue;
            };
            if set_field(listing, field, value) {
                outcome.applied.push(field.name());
            } else {
                warn!(field = %key, ?value, "ignoring listing patch value of the wrong type");
                outcome.ignored.push(key.clone());
            }
        }

        if outcome.price_changed() {
            listing.enforce_price_policy();
        }

        debug!(applied = ?outcome.applied, ignored = ?outcome.ignored, "applied listing patch");
        outcome
    }
}

fn set_field(listing: &mut ListingRecord, field: Field, value: &Value) -> bool {
    match field {
        Field::ListingPrice => set_price(&mut listing.listing_price, value),
        Field::TargetPrice => set_price(&mut listing.target_price, value),
        Field::MinimumPrice => set_price(&mut listing.minimum_price, value),
        Field::Condition => match value.as_str().and_then(Condition::parse_lenient) {
            Some(condition) => {
                listing.condition = condition;
                true
            }
            None => false,
        },
        Field::ItemName => set_required_text(&mut listing.item_name, value),
        Field::Category => set_required_text(&mut listing.category, value),
        Field::Description => set_text(&mut listing.description, value),
        Field::SellingPoints => set_text(&mut listing.selling_points, value),
        Field::KnownFlaws => set_text(&mut listing.known_flaws, value),
        Field::ReasonForSelling => set_text(&mut listing.reason_for_selling, value),
        Field::DeliveryInfo => set_text(&mut listing.delivery_info, value),
    }
}

fn set_price(slot: &mut u64, value: &Value) -> bool {
    match coerce_price(value) {
        Some(price) => {
            *slot = price;
            true
        }
        None => false,
    }
}

fn set_text(slot: &mut String, value: &Value) -> bool {
    match coerce_text(value) {
        Some(text) => {
            *slot = text;
            true
        }
        None => false,
    }
}

// Name and category must stay non-empty.
fn set_required_text(slot: &mut String, value: &Value) -> bool {
    match coerce_text(value) {
        Some(text) if !text.trim().is_empty() => {
            *slot = text.trim().to_string();
            true
        }
        _ => false,
    }
}
