// Response interpreters: turn free-form completion text into typed results.
//
// Completion services return prose that may carry JSON bare, inside a fenced
// code block, or in the middle of a sentence. `json_candidates` finds the
// possible object spans; each interpreter is a pure function tried in order
// until one matches.

use serde_json::{Map, Value};
use tracing::debug;

use crate::listing::ListingRecord;
use crate::patch::ListingPatch;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Discriminator values marking a field-update object.
const PATCH_TYPES: &[&str] = &["update_product", "update_listing"];

/// Keys whose presence marks an object as a full listing.
const ITEM_NAME_KEYS: &[&str] = &["item_name", "itemName"];

// ---------------------------------------------------------------------------
// JSON candidate discovery
// ---------------------------------------------------------------------------

/// Candidate JSON object substrings in priority order:
///
/// 1. the span from the first `{` to the last `}`
/// 2. the contents of each fenced code block
/// 3. every complete object embedded in the text, left to right
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    candidates.extend(fenced_blocks(text));

    for span in embedded_objects(text) {
        if !candidates.contains(&span) {
            candidates.push(span);
        }
    }

    candidates
}

/// Every candidate that parses as a JSON object, in candidate order.
pub fn json_objects(text: &str) -> Vec<Map<String, Value>> {
    json_candidates(text)
        .into_iter()
        .filter_map(|candidate| match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect()
}

fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string ("json", "JSON", ...) up to the end of the line.
        let body_start = match after_fence.find('\n') {
            Some(nl) if !after_fence[..nl].contains('{') => nl + 1,
            _ => 0,
        };
        let body = &after_fence[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        let block = body[..close].trim();
        if block.starts_with('{') {
            blocks.push(block);
        }
        rest = &body[close + 3..];
    }

    blocks
}

/// Every complete JSON object that begins at some `{`, scanning left to right
/// and resuming after each object found. A `{` that does not open a valid
/// object is skipped, so stray braces in prose do not hide later objects.
fn embedded_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut pos = 0usize;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(_))) => {
                let end = start + stream.byte_offset();
                spans.push(&text[start..end]);
                pos = end;
            }
            _ => pos = start + 1,
        }
    }

    spans
}

// ---------------------------------------------------------------------------
// Interpreters
// ---------------------------------------------------------------------------

/// Typed result of interpreting one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// A partial update to the current listing.
    Patch(ListingPatch),
    /// A complete replacement listing.
    FullListing(ListingRecord),
    /// A conversational reply to show verbatim.
    PlainText(String),
    /// This interpreter does not apply; try the next one.
    NoMatch,
}

pub type Interpreter = fn(&str) -> Interpretation;

/// Interpreters for conversational replies, in precedence order.
pub const CONVERSATION_INTERPRETERS: &[Interpreter] =
    &[interpret_patch, interpret_full_listing, interpret_plain_text];

/// Run the conversation interpreters in order and return the first match.
pub fn interpret_reply(text: &str) -> Interpretation {
    for interpreter in CONVERSATION_INTERPRETERS {
        match interpreter(text) {
            Interpretation::NoMatch => continue,
            matched => return matched,
        }
    }
    Interpretation::PlainText(text.to_string())
}

/// Matches an object whose `type` marks a field update and that carries a
/// `changes` object.
pub fn interpret_patch(text: &str) -> Interpretation {
    for object in json_objects(text) {
        let is_patch = object
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| PATCH_TYPES.contains(&t));
        if !is_patch {
            continue;
        }
        let Some(Value::Object(changes)) = object.get("changes") else {
            debug!("update object without a changes map, skipping");
            continue;
        };
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        return Interpretation::Patch(ListingPatch {
            changes: changes.clone(),
            message,
        });
    }
    Interpretation::NoMatch
}

/// Matches an object carrying an item-name key that forms a valid listing.
pub fn interpret_full_listing(text: &str) -> Interpretation {
    for object in json_objects(text) {
        if !has_item_name_key(&object) {
            continue;
        }
        match ListingRecord::from_json_object(&object) {
            Ok(record) => return Interpretation::FullListing(record),
            Err(reason) => debug!(%reason, "listing-shaped object rejected"),
        }
    }
    Interpretation::NoMatch
}

/// Always matches: the reply as plain text.
pub fn interpret_plain_text(text: &str) -> Interpretation {
    Interpretation::PlainText(text.to_string())
}

/// Parse a listing out of an extraction response.
///
/// Returns a human-readable reason when no acceptable listing is present.
pub fn extract_listing(text: &str) -> Result<ListingRecord, String> {
    let objects = json_objects(text);
    if objects.is_empty() {
        return Err("response did not contain a JSON object".to_string());
    }

    let mut first_error = None;
    for object in &objects {
        match ListingRecord::from_json_object(object) {
            Ok(record) => return Ok(record),
            Err(reason) => {
                first_error.get_or_insert(reason);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| "no listing object found".to_string()))
}

fn has_item_name_key(object: &Map<String, Value>) -> bool {
    ITEM_NAME_KEYS.iter().any(|k| object.contains_key(*k))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
