// Claude API streaming client using reqwest-eventsource.
//
// Sends requests to the Anthropic Messages API with `stream: true` and parses
// the Server-Sent Events into `LlmEvent` variants. `CompletionService::complete`
// drives one stream to completion and returns the accumulated text.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::{json, Value};
use snaplist_core::completion::{CompletionRequest, CompletionService};
use snaplist_core::config::Config;
use snaplist_core::transcript::Role;
use snaplist_core::CompletionError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::LlmEvent;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Buffer between the SSE reader and the collector in `complete`.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

/// Low-level Claude API streaming client.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
    /// Receives a copy of every event, for live display of streaming text.
    token_sink: Option<mpsc::Sender<LlmEvent>>,
    generation: AtomicU64,
}

impl ClaudeClient {
    /// Create a new client with the given API key, model identifier and
    /// Messages API endpoint.
    pub fn new(api_key: String, model: String, api_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            api_url,
            token_sink: None,
            generation: AtomicU64::new(0),
        }
    }

    /// Forward every streamed event to `tx` in addition to collecting it.
    pub fn with_token_sink(mut self, tx: mpsc::Sender<LlmEvent>) -> Self {
        self.token_sink = Some(tx);
        self
    }

    /// Send a request to the Claude API and stream the response as
    /// `LlmEvent`s over `tx`.
    ///
    /// Failures are reported as `LlmEvent::Error`. Returns when the stream is
    /// complete, an error occurs, or the receiver is dropped.
    pub async fn stream_message(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) {
        if self.api_key.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    error: CompletionError::NotConfigured,
                    generation,
                })
                .await;
            return;
        }

        let body = build_request_body(&self.model, request);

        let builder = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match builder.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        error: CompletionError::Transport(format!(
                            "failed to create event source: {e}"
                        )),
                        generation,
                    })
                    .await;
                return;
            }
        };

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;
        let mut stop_reason: Option<String> = None;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    let event_type = msg.event.as_str();
                    let data = &msg.data;

                    match event_type {
                        "message_start" => {
                            match parse_input_tokens(data) {
                                Some(n) => input_tokens = n,
                                None => warn!("failed to parse input_tokens from message_start"),
                            }
                            debug!(input_tokens, "message_start");
                        }
                        "content_block_delta" => {
                            if let Some(text) = parse_delta_text(data) {
                                full_text.push_str(&text);
                                if tx
                                    .send(LlmEvent::Token { text, generation })
                                    .await
                                    .is_err()
                                {
                                    // Receiver dropped; abort stream.
                                    es.close();
                                    return;
                                }
                            }
                        }
                        "message_delta" => {
                            match parse_output_tokens(data) {
                                Some(n) => output_tokens = n,
                                None => warn!("failed to parse output_tokens from message_delta"),
                            }
                            stop_reason = parse_stop_reason(data).or(stop_reason);
                            debug!(output_tokens, ?stop_reason, "message_delta");
                        }
                        "message_stop" => {
                            debug!("message_stop, streaming complete");
                            let _ = tx
                                .send(LlmEvent::Complete {
                                    full_text,
                                    input_tokens,
                                    output_tokens,
                                    stop_reason,
                                    generation,
                                })
                                .await;
                            es.close();
                            return;
                        }
                        "error" => {
                            let message = parse_error_message(data)
                                .unwrap_or_else(|| "unknown API error".to_string());
                            warn!(%message, "API error event");
                            let _ = tx
                                .send(LlmEvent::Error {
                                    error: CompletionError::Stream(message),
                                    generation,
                                })
                                .await;
                            es.close();
                            return;
                        }
                        // Ignore ping, content_block_start, content_block_stop, etc.
                        _ => {
                            debug!(event_type, "ignoring SSE event");
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    es.close();
                    break;
                }
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    let _ = tx
                        .send(LlmEvent::Error {
                            error: classify_error(&err),
                            generation,
                        })
                        .await;
                    es.close();
                    return;
                }
            }
        }

        // Stream ended without message_stop.
        let event = if full_text.is_empty() {
            LlmEvent::Error {
                error: CompletionError::EmptyResponse,
                generation,
            }
        } else {
            LlmEvent::Complete {
                full_text,
                input_tokens,
                output_tokens,
                stop_reason,
                generation,
            }
        };
        let _ = tx.send(event).await;
    }
}

#[async_trait]
impl CompletionService for ClaudeClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let stream = self.stream_message(&request, tx, generation);
        let collect = async {
            let mut outcome = Err(CompletionError::EmptyResponse);
            while let Some(event) = rx.recv().await {
                if let Some(sink) = &self.token_sink {
                    let _ = sink.send(event.clone()).await;
                }
                match event {
                    LlmEvent::Token { .. } => {}
                    LlmEvent::Complete {
                        full_text,
                        input_tokens,
                        output_tokens,
                        stop_reason,
                        ..
                    } => {
                        if stop_reason.as_deref() == Some("max_tokens") {
                            warn!(generation, "response truncated at max_tokens");
                        }
                        info!(generation, input_tokens, output_tokens, "completion finished");
                        outcome = Ok(full_text);
                    }
                    LlmEvent::Error { error, .. } => outcome = Err(error),
                }
            }
            outcome
        };

        let ((), outcome) = tokio::join!(stream, collect);
        outcome
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// High-level wrapper that can be either an active Claude client or disabled.
pub enum LlmClient {
    /// Claude API is configured and ready.
    Active(ClaudeClient),
    /// LLM functionality is disabled (no API key configured).
    Disabled,
}

impl LlmClient {
    /// Build an `LlmClient` from the application config.
    ///
    /// Returns `Active` if an API key is present in credentials, otherwise
    /// returns `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.anthropic_api_key {
            Some(key) if !key.is_empty() => LlmClient::Active(ClaudeClient::new(
                key.clone(),
                config.llm.model.clone(),
                config.llm.api_url.clone(),
            )),
            _ => LlmClient::Disabled,
        }
    }

    /// Attach a token sink to an active client; no-op when disabled.
    pub fn with_token_sink(self, tx: mpsc::Sender<LlmEvent>) -> Self {
        match self {
            LlmClient::Active(client) => LlmClient::Active(client.with_token_sink(tx)),
            LlmClient::Disabled => LlmClient::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        match self {
            LlmClient::Active(client) => client.complete(request).await,
            LlmClient::Disabled => Err(CompletionError::NotConfigured),
        }
    }
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

/// Build the Messages API body. An image, if any, is attached to the last
/// user message as a base64 content block ahead of its text.
pub(crate) fn build_request_body(model: &str, request: &CompletionRequest) -> Value {
    let last_user = request
        .messages
        .iter()
        .rposition(|m| m.role == Role::User);

    let messages: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, m)| match (&request.image, Some(i) == last_user) {
            (Some(image), true) => json!({
                "role": m.role.as_str(),
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type(),
                            "data": image.data(),
                        }
                    },
                    { "type": "text", "text": m.content }
                ]
            }),
            _ => json!({ "role": m.role.as_str(), "content": m.content }),
        })
        .collect();

    json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "stream": true,
        "system": request.system,
        "messages": messages,
    })
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// Extract `input_tokens` from a `message_start` event's JSON.
///
/// Expected shape: `{ "type": "message_start", "message": { "usage": { "input_tokens": N } } }`
pub(crate) fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("message")?
        .get("usage")?
        .get("input_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// Extract `delta.text` from a `content_block_delta` event's JSON.
pub(crate) fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `output_tokens` from a `message_delta` event's JSON.
pub(crate) fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("usage")?
        .get("output_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// Extract `delta.stop_reason` from a `message_delta` event's JSON.
pub(crate) fn parse_stop_reason(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("stop_reason")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `error.message` from an `error` event's JSON.
pub(crate) fn parse_error_message(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

/// Map an SSE error onto the completion error taxonomy.
fn classify_error(err: &reqwest_eventsource::Error) -> CompletionError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
            CompletionError::Status(status.as_u16())
        }
        reqwest_eventsource::Error::Transport(e) => CompletionError::Transport(e.to_string()),
        other => CompletionError::Stream(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
