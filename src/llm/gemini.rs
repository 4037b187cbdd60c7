//! Gemini generateContent backend

use super::backend::{Backend, CompletionRequest, CompletionStream};
use super::error::{ErrorKind, LlmError};
use super::sse::{open_event_stream, Decoded, StreamFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Streams from `:streamGenerateContent?alt=sse`
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiBackend {
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
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

/// All messages travel as parts of a single user turn
fn build_body(request: &CompletionRequest) -> GenerateRequest<'_> {
    let system_instruction = if request.system_instruction.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![Part {
                text: &request.system_instruction,
            }],
        })
    };

    GenerateRequest {
        contents: vec![Content {
            role: Some("user"),
            parts: request.messages.iter().map(|text| Part { text }).collect(),
        }],
        system_instruction,
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens_or_default(),
        },
    }
}

/// Gemini answers a bad key with 400 rather than 401
fn reclassify(mut err: LlmError) -> LlmError {
    if err.status == Some(400) && err.message.contains("API key not valid") {
        err.kind = ErrorKind::Invalid;
    }
    err
}

#[async_trait::async_trait]
impl Backend for GeminiBackend {
    async fn open(&self, request: CompletionRequest) -> Result<Box<dyn CompletionStream>, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        debug!("Calling Gemini API with model: {}", request.model);

        let builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", &request.api_key)
            .json(&build_body(&request));

        open_event_stream(builder, CandidateFormat)
            .await
            .map_err(reclassify)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ChunkError>,
}

/// Google RPC status, sent as its own event when generation fails
#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Each event is a partial response; the body ends when the answer does
struct CandidateFormat;

impl StreamFormat for CandidateFormat {
    fn decode(&mut self, data: &str) -> Result<Decoded, LlmError> {
        let chunk: GenerateChunk = serde_json::from_str(data).map_err(|e| {
            LlmError::malformed(format!("Failed to parse Gemini stream event: {}", e))
        })?;
        if let Some(error) = chunk.error {
            let message = if error.message.is_empty() {
                "Gemini stream reported an error".to_string()
            } else {
                error.message
            };
            return Err(reclassify(LlmError::in_stream(
                error.code,
                error.status.as_deref(),
                message,
            )));
        }

        let text: String = chunk
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            Ok(Decoded::Skip)
        } else {
            Ok(Decoded::Text(text))
        }
    }
}
