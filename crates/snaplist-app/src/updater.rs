// Conversation updater: one user message in, a chat reply or a listing
// change out.

use snaplist_core::completion::{ChatMessage, CompletionRequest};
use snaplist_core::interpret::{interpret_reply, Interpretation};
use snaplist_core::listing::ListingRecord;
use snaplist_core::session::ListingStore;
use snaplist_core::transcript::TranscriptEntry;
use tracing::{debug, info};

use crate::prompt;

/// Shown when a reply replaced the whole listing.
pub const LISTING_REPLACED_MESSAGE: &str = "I've updated the listing with the new details.";

/// Shown when a field update carried no message of its own.
pub const DEFAULT_UPDATE_MESSAGE: &str = "Listing updated.";

/// Result of one conversational exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// Specific fields of the current listing were changed.
    Updated {
        listing: ListingRecord,
        message: String,
        /// Patch keys that were not applied.
        ignored_fields: Vec<String>,
    },
    /// The current listing was replaced wholesale.
    Replaced {
        listing: ListingRecord,
        message: String,
    },
    /// A plain conversational answer.
    Message(String),
}

impl ChatReply {
    /// The text to show the user; also what the transcript records.
    pub fn message(&self) -> &str {
        match self {
            ChatReply::Updated { message, .. } => message,
            ChatReply::Replaced { message, .. } => message,
            ChatReply::Message(text) => text,
        }
    }

    pub fn listing(&self) -> Option<&ListingRecord> {
        match self {
            ChatReply::Updated { listing, .. } | ChatReply::Replaced { listing, .. } => {
                Some(listing)
            }
            ChatReply::Message(_) => None,
        }
    }
}

/// Build the request for one conversational turn.
///
/// Sends at most `history_turns` turns: the most recent transcript window
/// followed by the new user message.
pub fn conversation_request(
    store: &ListingStore,
    message: &str,
    history_turns: usize,
    max_tokens: u32,
) -> CompletionRequest {
    let window = store
        .transcript()
        .recent_window(history_turns.saturating_sub(1));

    let mut messages: Vec<ChatMessage> = window.iter().map(ChatMessage::from).collect();
    messages.push(ChatMessage::user(message));

    CompletionRequest {
        system: prompt::conversation_system_prompt(store.get()),
        messages,
        image: None,
        max_tokens,
    }
}

/// Interpret a reply and commit it to the store: apply a patch or
/// replacement if the reply carries one, and append both turns.
pub fn apply_reply(store: &mut ListingStore, user_message: &str, reply: &str) -> ChatReply {
    let outcome = match interpret_reply(reply) {
        Interpretation::Patch(patch) => match store.get_mut() {
            Some(listing) => {
                let applied = patch.apply(listing);
                info!(fields = ?applied.applied, "applied listing update from chat");
                ChatReply::Updated {
                    listing: listing.clone(),
                    message: patch
                        .message
                        .unwrap_or_else(|| DEFAULT_UPDATE_MESSAGE.to_string()),
                    ignored_fields: applied.ignored,
                }
            }
            None => {
                debug!("update received with no current listing, showing as text");
                ChatReply::Message(patch.message.unwrap_or_else(|| reply.to_string()))
            }
        },
        Interpretation::FullListing(mut listing) => {
            if listing.image_data.is_none() {
                listing.image_data = store.get().and_then(|l| l.image_data.clone());
            }
            info!(item = %listing.item_name, "replaced listing from chat");
            store.set(listing.clone());
            ChatReply::Replaced {
                listing,
                message: LISTING_REPLACED_MESSAGE.to_string(),
            }
        }
        Interpretation::PlainText(text) => ChatReply::Message(text),
        Interpretation::NoMatch => ChatReply::Message(reply.to_string()),
    };

    store.append_transcript(TranscriptEntry::user(user_message));
    store.append_transcript(TranscriptEntry::assistant(outcome.message()));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use snaplist_core::transcript::Role;

    fn store_with_listing() -> ListingStore {
        let mut listing = ListingRecord {
            item_name: "Marshall Major IV".into(),
            category: "Electronics".into(),
            listing_price: 1_850_000,
            image_data: Some("data:image/jpeg;base64,AAAA".into()),
            ..Default::default()
        };
        listing.enforce_price_policy();
        let mut store = ListingStore::new();
        store.set(listing);
        store
    }

    #[test]
    fn request_window_ends_with_new_message() {
        let mut store = store_with_listing();
        for i in 0..10 {
            store.append_transcript(TranscriptEntry::user(format!("q{i}")));
            store.append_transcript(TranscriptEntry::assistant(format!("a{i}")));
        }
        let req = conversation_request(&store, "latest", 5, 512);
        assert_eq!(req.messages.len(), 5);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.messages[0].content, "q8");
        assert_eq!(req.messages.last().unwrap().content, "latest");
        assert!(req.system.contains("Marshall Major IV"));
        assert!(req.image.is_none());
    }

    #[test]
    fn single_turn_window_sends_only_new_message() {
        let mut store = ListingStore::new();
        store.append_transcript(TranscriptEntry::user("old"));
        let req = conversation_request(&store, "new", 1, 512);
        assert_eq!(req.messages, vec![ChatMessage::user("new")]);
    }

    #[test]
    fn patch_reply_updates_listing() {
        let mut store = store_with_listing();
        let reply = apply_reply(
            &mut store,
            "make it 2 million",
            r#"{"type":"update_product","changes":{"listing_price":2000000},"message":"Updated price"}"#,
        );
        assert_eq!(reply.message(), "Updated price");
        let listing = store.get().unwrap();
        assert_eq!(listing.listing_price, 2_000_000);
        assert_eq!(listing.target_price, 1_700_000);
        assert_eq!(listing.minimum_price, 1_400_000);
        assert_eq!(reply.listing(), Some(listing));
        assert_eq!(store.transcript().entries()[1].content, "Updated price");
    }

    #[test]
    fn patch_without_message_uses_default() {
        let mut store = store_with_listing();
        let reply = apply_reply(
            &mut store,
            "rename",
            r#"{"type":"update_product","changes":{"item_name":"Major IV"}}"#,
        );
        assert_eq!(reply.message(), DEFAULT_UPDATE_MESSAGE);
    }

    #[test]
    fn patch_reports_ignored_fields() {
        let mut store = store_with_listing();
        let reply = apply_reply(
            &mut store,
            "colour?",
            r#"{"type":"update_product","changes":{"colour":"black"},"message":"ok"}"#,
        );
        match reply {
            ChatReply::Updated { ignored_fields, .. } => assert_eq!(ignored_fields, vec!["colour"]),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn patch_without_listing_is_shown_as_text() {
        let mut store = ListingStore::new();
        let reply = apply_reply(
            &mut store,
            "cheaper",
            r#"{"type":"update_product","changes":{"listing_price":5},"message":"Upload a photo first"}"#,
        );
        assert_eq!(reply, ChatReply::Message("Upload a photo first".into()));
        assert!(store.get().is_none());
    }

    #[test]
    fn full_listing_reply_replaces_and_keeps_image() {
        let mut store = store_with_listing();
        let reply = apply_reply(
            &mut store,
            "rewrite it",
            r#"{"item_name":"Marshall Major IV Black","category":"Audio","listing_price":1000000,"target_price":1}"#,
        );
        assert_eq!(reply.message(), LISTING_REPLACED_MESSAGE);
        let listing = store.get().unwrap();
        assert_eq!(listing.item_name, "Marshall Major IV Black");
        assert_eq!(listing.target_price, 850_000);
        assert_eq!(listing.image_data.as_deref(), Some("data:image/jpeg;base64,AAAA"));
    }

    #[test]
    fn plain_reply_leaves_listing_untouched() {
        let mut store = store_with_listing();
        let before = store.get().cloned();
        let reply = apply_reply(&mut store, "shipping?", "Courier works well for headphones.");
        assert_eq!(reply, ChatReply::Message("Courier works well for headphones.".into()));
        assert_eq!(store.get().cloned(), before);
        let entries = store.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].content, "Courier works well for headphones.");
    }
}
