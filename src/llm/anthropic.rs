//! Anthropic messages backend

use super::backend::{Backend, CompletionRequest, CompletionStream};
use super::error::LlmError;
use super::sse::{open_event_stream, Decoded, StreamFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Streams from `/v1/messages`
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_body(request: &CompletionRequest) -> MessagesRequest<'_> {
    MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens_or_default(),
        system: &request.system_instruction,
        messages: request
            .messages
            .iter()
            .map(|content| Message {
                role: "user",
                content,
            })
            .collect(),
        stream: true,
    }
}

#[async_trait::async_trait]
impl Backend for AnthropicBackend {
    async fn open(&self, request: CompletionRequest) -> Result<Box<dyn CompletionStream>, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!("Calling Anthropic API with model: {}", request.model);

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &request.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&build_body(&request));

        open_event_stream(builder, EventFormat).await
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<EventDelta>,
    #[serde(default)]
    error: Option<EventError>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Typed events; only `content_block_delta` text is output
struct EventFormat;

impl StreamFormat for EventFormat {
    fn decode(&mut self, data: &str) -> Result<Decoded, LlmError> {
        let event: StreamEvent = serde_json::from_str(data).map_err(|e| {
            LlmError::malformed(format!("Failed to parse Anthropic stream event: {}", e))
        })?;

        match event.kind.as_str() {
            "content_block_delta" => Ok(Decoded::Text(
                event.delta.and_then(|d| d.text).unwrap_or_default(),
            )),
            "message_stop" => Ok(Decoded::Done),
            "error" => {
                let error = event.error.unwrap_or(EventError {
                    kind: String::new(),
                    message: "Anthropic stream reported an error".to_string(),
                });
                Err(LlmError::in_stream(None, Some(&error.kind), error.message))
            }
            _ => Ok(Decoded::Skip),
        }
    }
}
