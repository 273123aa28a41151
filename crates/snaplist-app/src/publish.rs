// Publishing a finished listing to the remote listing backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use snaplist_core::listing::ListingRecord;
use snaplist_core::WorkflowError;
use tracing::{info, warn};

/// Listing shape accepted by the backend's create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingSubmission {
    pub name: String,
    pub category: String,
    pub description: String,
    pub condition: String,
    pub price: u64,
    pub target_price: u64,
    pub min_price: u64,
    pub selling_points: Vec<String>,
    pub known_flaws: Option<String>,
    pub reason_for_selling: Option<String>,
    pub delivery: Option<String>,
    pub image: Option<String>,
}

impl From<&ListingRecord> for ListingSubmission {
    fn from(listing: &ListingRecord) -> Self {
        ListingSubmission {
            name: listing.item_name.clone(),
            category: listing.category.clone(),
            description: listing.description.clone(),
            condition: listing.condition.as_str().to_string(),
            price: listing.listing_price,
            target_price: listing.target_price,
            min_price: listing.minimum_price,
            selling_points: split_points(&listing.selling_points),
            known_flaws: non_empty(&listing.known_flaws),
            reason_for_selling: non_empty(&listing.reason_for_selling),
            delivery: non_empty(&listing.delivery_info),
            image: listing.image_data.clone(),
        }
    }
}

/// Split free-text selling points on newlines or commas, dropping bullet
/// markers and blanks.
pub fn split_points(text: &str) -> Vec<String> {
    text.split(['\n', ','])
        .map(|p| p.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The remote collaborator that persists finished listings.
#[async_trait]
pub trait ListingBackend: Send + Sync {
    /// Persist a listing and return the backend-assigned identifier.
    async fn create_listing(&self, listing: &ListingSubmission) -> Result<String, WorkflowError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// Backend reached over HTTP: POSTs the submission as JSON and expects
/// `{"id": ...}` back.
pub struct HttpBackend {
    http: reqwest::Client,
    url: String,
}

impl HttpBackend {
    /// Build a backend whose requests give up after `timeout`.
    pub fn new(url: String, timeout: Duration) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                warn!("failed to build backend HTTP client: {e}");
                WorkflowError::Backend(format!("cannot build HTTP client: {e}"))
            })?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ListingBackend for HttpBackend {
    async fn create_listing(&self, listing: &ListingSubmission) -> Result<String, WorkflowError> {
        let response = self
            .http
            .post(&self.url)
            .json(listing)
            .send()
            .await
            .map_err(|e| WorkflowError::Backend(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::Backend(format!("backend returned status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| WorkflowError::Backend(format!("invalid response body: {e}")))?;

        let id = match body.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(WorkflowError::Backend("response has no id".to_string())),
        };
        info!(%id, name = %listing.name, "listing published");
        Ok(id)
    }
}
