// Session-scoped listing store: the current listing plus the transcript.

use tracing::info;

use crate::listing::ListingRecord;
use crate::transcript::{Transcript, TranscriptEntry};

/// Holds at most one live listing and the full transcript for one session.
///
/// Setting a listing silently replaces the previous one.
#[derive(Debug, Clone, Default)]
pub struct ListingStore {
    listing: Option<ListingRecord>,
    transcript: Transcript,
}

impl ListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&ListingRecord> {
        self.listing.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut ListingRecord> {
        self.listing.as_mut()
    }

    pub fn set(&mut self, record: ListingRecord) {
        if let Some(previous) = &self.listing {
            info!(
                previous = %previous.item_name,
                next = %record.item_name,
                "replacing current listing"
            );
        }
        self.listing = Some(record);
    }

    /// Remove and return the current listing.
    pub fn clear(&mut self) -> Option<ListingRecord> {
        self.listing.take()
    }

    pub fn append_transcript(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Drop the listing and the transcript.
    pub fn reset(&mut self) {
        self.listing = None;
        self.transcript = Transcript::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ListingRecord {
        ListingRecord {
            item_name: name.into(),
            category: "Misc".into(),
            ..Default::default()
        }
    }

    #[test]
    fn starts_empty() {
        let store = ListingStore::new();
        assert!(store.get().is_none());
        assert!(store.transcript().is_empty());
    }

    #[test]
    fn set_replaces_previous_listing() {
        let mut store = ListingStore::new();
        store.set(record("first"));
        store.set(record("second"));
        assert_eq!(store.get().unwrap().item_name, "second");
    }

    #[test]
    fn clear_returns_listing_and_keeps_transcript() {
        let mut store = ListingStore::new();
        store.set(record("lamp"));
        store.append_transcript(TranscriptEntry::user("hi"));
        let cleared = store.clear().unwrap();
        assert_eq!(cleared.item_name, "lamp");
        assert!(store.get().is_none());
        assert_eq!(store.transcript().len(), 1);
    }

    #[test]
    fn reset_drops_everything() {
        let mut store = ListingStore::new();
        store.set(record("lamp"));
        store.append_transcript(TranscriptEntry::user("hi"));
        store.reset();
        assert!(store.get().is_none());
        assert!(store.transcript().is_empty());
    }
}
