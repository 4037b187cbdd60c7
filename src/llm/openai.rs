//! OpenAI chat completions backend

use super::backend::{Backend, CompletionRequest, CompletionStream};
use super::error::{ErrorKind, LlmError};
use super::sse::{open_event_stream, Decoded, StreamFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Streams from `/v1/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a compatible endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_body(request: &CompletionRequest) -> ChatRequest<'_> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: &request.system_instruction,
    });
    messages.extend(request.messages.iter().map(|content| ChatMessage {
        role: "user",
        content,
    }));

    let budget = request.max_tokens_or_default();
    let (max_tokens, max_completion_tokens) = if request.thinking {
        (None, Some(budget))
    } else {
        (Some(budget), None)
    };

    ChatRequest {
        model: &request.model,
        messages,
        stream: true,
        max_tokens,
        max_completion_tokens,
    }
}

#[async_trait::async_trait]
impl Backend for OpenAiBackend {
    async fn open(&self, request: CompletionRequest) -> Result<Box<dyn CompletionStream>, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!("Calling OpenAI at {} with model: {}", url, request.model);

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&request.api_key)
            .json(&build_body(&request));

        open_event_stream(builder, ChunkFormat).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

/// Sent in place of a chunk when the completion fails mid-stream
#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ChunkError {
    fn into_error(self) -> LlmError {
        // `code` is a string such as "invalid_api_key" or, from some proxies, a status
        let status = self
            .code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok());
        let kind = match self.code.as_ref().and_then(|c| c.as_str()) {
            Some(code) if ErrorKind::from_error_type(code) != ErrorKind::OtherError => Some(code),
            _ => self.kind.as_deref(),
        };
        let message = if self.message.is_empty() {
            "OpenAI stream reported an error".to_string()
        } else {
            self.message
        };
        LlmError::in_stream(status, kind, message)
    }
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// `data: {chunk}` events terminated by `data: [DONE]`
struct ChunkFormat;

impl StreamFormat for ChunkFormat {
    fn decode(&mut self, data: &str) -> Result<Decoded, LlmError> {
        if data.trim() == "[DONE]" {
            return Ok(Decoded::Done);
        }
        let chunk: ChatChunk = serde_json::from_str(data)
            .map_err(|e| LlmError::malformed(format!("Failed to parse OpenAI stream event: {}", e)))?;
        if let Some(error) = chunk.error {
            return Err(error.into_error());
        }

        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .unwrap_or_default();
        Ok(Decoded::Text(text))
    }
}
