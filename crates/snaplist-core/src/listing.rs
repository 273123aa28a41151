// Structured product listing and the pricing rules attached to it.
//
// Completion services are loose with types: prices arrive as integers, floats
// or formatted strings, bullet lists arrive as arrays, and the condition is
// free text. Deserialization coerces all of these instead of failing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Target price as a percentage of the listing price.
pub const TARGET_PRICE_PERCENT: u64 = 85;

/// Minimum acceptable price as a percentage of the listing price.
pub const MINIMUM_PRICE_PERCENT: u64 = 70;

/// `round(price * percent / 100)`, rounding halves up, without float error.
pub fn percent_of(price: u64, percent: u64) -> u64 {
    ((u128::from(price) * u128::from(percent) + 50) / 100) as u64
}

/// Target price derived from a listing price.
pub fn target_price_for(listing_price: u64) -> u64 {
    percent_of(listing_price, TARGET_PRICE_PERCENT)
}

/// Minimum price derived from a listing price.
pub fn minimum_price_for(listing_price: u64) -> u64 {
    percent_of(listing_price, MINIMUM_PRICE_PERCENT)
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Physical condition of the item being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Condition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl Condition {
    /// Parse a condition label, accepting common synonyms.
    ///
    /// - "excellent", "new", "like new", "mint" -> Excellent
    /// - "good", "used" -> Good
    /// - "fair", "worn" -> Fair
    /// - "poor", "broken", "for parts" -> Poor
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "excellent" | "new" | "like new" | "brand new" | "mint" => Some(Condition::Excellent),
            "good" | "used" | "very good" => Some(Condition::Good),
            "fair" | "worn" | "acceptable" => Some(Condition::Fair),
            "poor" | "broken" | "for parts" | "damaged" => Some(Condition::Poor),
            _ => None,
        }
    }

    /// Lowercase label used on the wire to the listing backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Condition::Excellent => "Excellent",
            Condition::Good => "Good",
            Condition::Fair => "Fair",
            Condition::Poor => "Poor",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// ListingRecord
// ---------------------------------------------------------------------------

/// The structured, editable representation of a product for sale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(default, alias = "itemName", deserialize_with = "lenient_text")]
    pub item_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_condition")]
    pub condition: Condition,
    #[serde(default, alias = "listingPrice", deserialize_with = "lenient_price")]
    pub listing_price: u64,
    #[serde(default, alias = "targetPrice", deserialize_with = "lenient_price")]
    pub target_price: u64,
    #[serde(
        default,
        alias = "minimumPrice",
        alias = "min_price",
        deserialize_with = "lenient_price"
    )]
    pub minimum_price: u64,
    /// Free text, one selling point per line or comma separated.
    #[serde(default, alias = "sellingPoints", deserialize_with = "lenient_text")]
    pub selling_points: String,
    #[serde(default, alias = "knownFlaws", deserialize_with = "lenient_text")]
    pub known_flaws: String,
    #[serde(
        default,
        rename = "reason_selling",
        alias = "reason_for_selling",
        alias = "reasonForSelling",
        deserialize_with = "lenient_text"
    )]
    pub reason_for_selling: String,
    #[serde(default, alias = "deliveryInfo", deserialize_with = "lenient_text")]
    pub delivery_info: String,
    /// Embedded image payload, attached after extraction for submission.
    #[serde(default, alias = "imageData", skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

/// Accepted spellings per field, canonical key first.
const FIELD_KEYS: &[&[&str]] = &[
    &["item_name", "itemName"],
    &["listing_price", "listingPrice"],
    &["target_price", "targetPrice"],
    &["minimum_price", "minimumPrice", "min_price"],
    &["selling_points", "sellingPoints"],
    &["known_flaws", "knownFlaws"],
    &["reason_selling", "reason_for_selling", "reasonForSelling"],
    &["delivery_info", "deliveryInfo"],
    &["image_data", "imageData"],
];

/// Copy of `object` holding at most one spelling per field, under its
/// canonical key. The earliest spelling in `FIELD_KEYS` wins.
fn canonical_keys(object: &Map<String, Value>) -> Map<String, Value> {
    let mut out = object.clone();
    for keys in FIELD_KEYS {
        let winner = keys.iter().find_map(|key| object.get(*key));
        let Some(value) = winner.cloned() else {
            continue;
        };
        for key in keys.iter().skip(1) {
            out.remove(*key);
        }
        out.insert(keys[0].to_string(), value);
    }
    out
}

impl ListingRecord {
    /// Build a record from a parsed JSON object.
    ///
    /// Requires non-empty `item_name` and `category`. The price invariant is
    /// always re-derived from `listing_price`, whatever the object claimed.
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, String> {
        let fields = Value::Object(canonical_keys(object));
        let mut record: ListingRecord = serde_json::from_value(fields)
            .map_err(|e| format!("listing fields have unexpected types: {e}"))?;

        record.item_name = record.item_name.trim().to_string();
        record.category = record.category.trim().to_string();
        if record.item_name.is_empty() {
            return Err("missing item_name".to_string());
        }
        if record.category.is_empty() {
            return Err("missing category".to_string());
        }

        record.enforce_price_policy();
        Ok(record)
    }

    /// Re-derive target and minimum prices from the listing price.
    pub fn enforce_price_policy(&mut self) {
        let target = target_price_for(self.listing_price);
        let minimum = minimum_price_for(self.listing_price);
        if self.target_price != target || self.minimum_price != minimum {
            debug!(
                listing_price = self.listing_price,
                claimed_target = self.target_price,
                claimed_minimum = self.minimum_price,
                "recomputing derived prices"
            );
        }
        self.target_price = target;
        self.minimum_price = minimum;
    }

    /// JSON view of the record without the (large) image payload, for
    /// embedding in prompts.
    pub fn to_prompt_json(&self) -> String {
        let view = ListingRecord {
            image_data: None,
            ..self.clone()
        };
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| "{}".to_string())
    }
}

// ---------------------------------------------------------------------------
// Lenient value coercion
// ---------------------------------------------------------------------------

/// Coerce a JSON value into a non-negative whole price.
///
/// Accepts integers, floats (rounded half up), and strings carrying currency
/// symbols or thousands separators ("Rp 1.850.000", "$1,299.99").
pub fn coerce_price(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u)
            } else {
                let f = n.as_f64()?;
                if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
                    Some(f.round() as u64)
                } else {
                    None
                }
            }
        }
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

/// Coerce a JSON value into free text. Arrays are joined one item per line.
pub fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(coerce_text).collect();
            Some(parts?.join("\n"))
        }
        Value::Object(_) => None,
    }
}

/// Coerce a JSON value into a condition, falling back to `Good` for
/// unrecognised labels.
pub fn coerce_condition(value: &Value) -> Condition {
    match value.as_str().and_then(Condition::parse_lenient) {
        Some(c) => c,
        None => {
            if !value.is_null() {
                warn!(?value, "unrecognised condition, defaulting to Good");
            }
            Condition::Good
        }
    }
}

fn parse_price_text(s: &str) -> Option<u64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();
    if cleaned.starts_with('-') {
        return None;
    }
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    // A final separator followed by one or two digits is a decimal point;
    // anything else is a thousands separator.
    let (whole, fraction) = match cleaned.rfind(|c| c == '.' || c == ',') {
        Some(idx) if (1..=2).contains(&(cleaned.len() - idx - 1)) => {
            (&cleaned[..idx], &cleaned[idx + 1..])
        }
        _ => (cleaned, ""),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let mut value: u64 = if digits.is_empty() {
        0
    } else {
        digits.parse().ok()?
    };
    if fraction.starts_with(['5', '6', '7', '8', '9']) {
        value = value.checked_add(1)?;
    }
    Some(value)
}

fn lenient_price<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(0);
    }
    coerce_price(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("not a valid price: {value}")))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_text(&value).ok_or_else(|| serde::de::Error::custom("expected text"))
}

fn lenient_condition<'de, D>(deserializer: D) -> Result<Condition, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_condition(&value))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn derived_prices_match_worked_examples() {
        assert_eq!(target_price_for(1_850_000), 1_572_500);
        assert_eq!(minimum_price_for(1_850_000), 1_295_000);
        assert_eq!(target_price_for(2_000_000), 1_700_000);
        assert_eq!(minimum_price_for(2_000_000), 1_400_000);
    }

    #[test]
    fn derived_prices_round_half_up() {
        // 10 * 0.85 = 8.5 -> 9; 5 * 0.70 = 3.5 -> 4
        assert_eq!(target_price_for(10), 9);
        assert_eq!(minimum_price_for(5), 4);
        assert_eq!(target_price_for(0), 0);
    }

    #[test]
    fn derived_prices_do_not_overflow() {
        assert!(target_price_for(u64::MAX) < u64::MAX);
    }

    #[test]
    fn parses_snake_case_listing() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "item_name": "Marshall Major IV",
            "category": "Electronics",
            "description": "Wireless headphones",
            "condition": "Good",
            "listing_price": 1850000,
            "target_price": 1572500,
            "minimum_price": 1295000,
            "selling_points": "80h battery",
            "known_flaws": "None",
            "reason_selling": "Upgrading",
            "delivery_info": "Pickup only"
        })))
        .unwrap();

        assert_eq!(rec.item_name, "Marshall Major IV");
        assert_eq!(rec.condition, Condition::Good);
        assert_eq!(rec.listing_price, 1_850_000);
        assert_eq!(rec.reason_for_selling, "Upgrading");
        assert_eq!(rec.image_data, None);
    }

    #[test]
    fn duplicate_spellings_prefer_the_snake_case_key() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "itemName": "Old name",
            "item_name": "Desk lamp",
            "category": "Home",
            "reason_for_selling": "Moving",
            "reason_selling": "Upgrading",
            "reasonForSelling": "Spare",
            "minimumPrice": 5,
            "min_price": 6,
            "listing_price": 100000
        })))
        .unwrap();

        assert_eq!(rec.item_name, "Desk lamp");
        assert_eq!(rec.reason_for_selling, "Upgrading");
        assert_eq!(rec.minimum_price, 70_000);
    }

    #[test]
    fn alias_only_spellings_still_fill_the_field() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "itemName": "Kettle",
            "category": "Home",
            "reason_for_selling": "Moving",
            "reasonForSelling": "Spare"
        })))
        .unwrap();

        assert_eq!(rec.item_name, "Kettle");
        assert_eq!(rec.reason_for_selling, "Moving");
    }

    #[test]
    fn parses_camel_case_aliases() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "itemName": "Desk lamp",
            "category": "Home",
            "listingPrice": 100,
            "reasonForSelling": "Moving",
            "deliveryInfo": "Courier"
        })))
        .unwrap();
        assert_eq!(rec.item_name, "Desk lamp");
        assert_eq!(rec.listing_price, 100);
        assert_eq!(rec.target_price, 85);
        assert_eq!(rec.minimum_price, 70);
        assert_eq!(rec.reason_for_selling, "Moving");
        assert_eq!(rec.delivery_info, "Courier");
    }

    #[test]
    fn wrong_service_arithmetic_is_overridden() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "item_name": "Bike",
            "category": "Sports",
            "listing_price": 1000,
            "target_price": 999,
            "minimum_price": 1
        })))
        .unwrap();
        assert_eq!(rec.target_price, 850);
        assert_eq!(rec.minimum_price, 700);
    }

    #[test]
    fn missing_item_name_is_rejected() {
        let err = ListingRecord::from_json_object(&object(json!({
            "item_name": "   ",
            "category": "Home"
        })))
        .unwrap_err();
        assert!(err.contains("item_name"));
    }

    #[test]
    fn missing_category_is_rejected() {
        let err = ListingRecord::from_json_object(&object(json!({ "item_name": "Lamp" })))
            .unwrap_err();
        assert!(err.contains("category"));
    }

    #[test]
    fn unparseable_price_is_rejected() {
        let err = ListingRecord::from_json_object(&object(json!({
            "item_name": "Lamp",
            "category": "Home",
            "listing_price": "ask me"
        })))
        .unwrap_err();
        assert!(err.contains("price"));
    }

    #[test]
    fn selling_points_array_is_joined() {
        let rec = ListingRecord::from_json_object(&object(json!({
            "item_name": "Lamp",
            "category": "Home",
            "selling_points": ["Warm light", "Dimmable"]
        })))
        .unwrap();
        assert_eq!(rec.selling_points, "Warm light\nDimmable");
    }

    #[test]
    fn price_text_formats() {
        assert_eq!(coerce_price(&json!("Rp 1.850.000")), Some(1_850_000));
        assert_eq!(coerce_price(&json!("$1,299.99")), Some(1_300));
        assert_eq!(coerce_price(&json!("1,299.49")), Some(1_299));
        assert_eq!(coerce_price(&json!("Rp. 500")), Some(500));
        assert_eq!(coerce_price(&json!("12.5")), Some(13));
        assert_eq!(coerce_price(&json!("-5")), None);
        assert_eq!(coerce_price(&json!("free")), None);
    }

    #[test]
    fn price_numbers() {
        assert_eq!(coerce_price(&json!(1850000)), Some(1_850_000));
        assert_eq!(coerce_price(&json!(99.5)), Some(100));
        assert_eq!(coerce_price(&json!(-3)), None);
        assert_eq!(coerce_price(&json!(true)), None);
    }

    #[test]
    fn condition_synonyms() {
        assert_eq!(Condition::parse_lenient("Like-New"), Some(Condition::Excellent));
        assert_eq!(Condition::parse_lenient("USED"), Some(Condition::Good));
        assert_eq!(Condition::parse_lenient("worn"), Some(Condition::Fair));
        assert_eq!(Condition::parse_lenient("for_parts"), Some(Condition::Poor));
        assert_eq!(Condition::parse_lenient("refurbished"), None);
        assert_eq!(coerce_condition(&json!("refurbished")), Condition::Good);
    }

    #[test]
    fn prompt_json_omits_image() {
        let rec = ListingRecord {
            item_name: "Lamp".into(),
            category: "Home".into(),
            image_data: Some("data:image/png;base64,AAAA".into()),
            ..Default::default()
        };
        let json = rec.to_prompt_json();
        assert!(json.contains("\"item_name\": \"Lamp\""));
        assert!(json.contains("\"reason_selling\""));
        assert!(!json.contains("image_data"));
    }
}
