//! Uniform streaming access to LLM providers
//!
//! This module handles:
//! - Resolving provider and model keys against the static registry
//! - Fitting the system instruction into the model's context window
//! - Streaming completions from OpenAI, Anthropic and Gemini
//! - Classifying provider failures into one error taxonomy

mod anthropic;
mod backend;
mod error;
mod gemini;
pub mod models;
mod openai;
pub mod orchestrator;
pub mod prompts;
mod sse;

pub use anthropic::AnthropicBackend;
pub use backend::{Backend, CompletionRequest, CompletionStream, Fragment, DEFAULT_MAX_TOKENS};
pub use error::{ErrorKind, LlmError};
pub use gemini::GeminiBackend;
pub use models::{lookup, ModelSpec, Provider};
pub use openai::OpenAiBackend;
pub use orchestrator::CallOrchestrator;

#[cfg(test)]
pub(crate) use backend::testing;

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Characters per token assumed by the context-window guard
pub const LETTERS_PER_TOKEN: f64 = 3.5;

/// Truncate `system` so that it and `messages` fit in `context_window`
///
/// Sizes are estimated from character counts. Messages are never touched;
/// when they alone exceed the window the system instruction is dropped
/// entirely.
pub fn fit_to_context_window(system: &str, messages: &[String], context_window: u64) -> String {
    let message_chars: usize = messages.iter().map(|m| m.chars().count()).sum();
    let system_chars = system.chars().count();

    let estimated = (message_chars + system_chars) as f64 / LETTERS_PER_TOKEN;
    if estimated <= context_window as f64 {
        return system.to_string();
    }

    let available = context_window as f64 - message_chars as f64 / LETTERS_PER_TOKEN;
    let max_chars = (available * LETTERS_PER_TOKEN).floor().max(0.0) as usize;
    debug!(
        "Truncating system instruction from {} to {} characters",
        system_chars, max_chars
    );
    system.chars().take(max_chars).collect()
}

/// A call as issued by callers, addressed by registry keys
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Provider key, e.g. `openai`
    pub provider: String,
    /// Model key within the provider
    pub model: String,
    pub api_key: String,
    pub system_instruction: String,
    pub messages: Vec<String>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(provider: &str, model: &str, api_key: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            system_instruction: String::new(),
            messages: Vec::new(),
            max_tokens: None,
        }
    }

    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn messages(mut self, messages: Vec<String>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Routes calls to the backend of the requested provider
#[derive(Clone)]
pub struct ProviderDispatcher {
    backends: HashMap<Provider, Arc<dyn Backend>>,
}

impl ProviderDispatcher {
    /// Dispatcher over the public provider APIs
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Dispatcher whose backends share the given HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        let mut backends: HashMap<Provider, Arc<dyn Backend>> = HashMap::new();
        backends.insert(Provider::OpenAi, Arc::new(OpenAiBackend::new(client.clone())));
        backends.insert(
            Provider::Anthropic,
            Arc::new(AnthropicBackend::new(client.clone())),
        );
        backends.insert(Provider::Gemini, Arc::new(GeminiBackend::new(client)));
        Self { backends }
    }

    /// Replace the backend serving a provider
    pub fn with_backend(mut self, provider: Provider, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    /// Open a completion stream
    ///
    /// Unknown providers and models fail before anything is sent.
    pub async fn stream(&self, request: &ChatRequest) -> Result<Box<dyn CompletionStream>, LlmError> {
        let (provider, model) = lookup(&request.provider, &request.model)?;
        let backend = self.backends.get(&provider).ok_or_else(|| {
            LlmError::configuration(format!("No backend for provider: {}", provider))
        })?;

        let system_instruction = fit_to_context_window(
            &request.system_instruction,
            &request.messages,
            model.context_window,
        );

        debug!("Dispatching to {} model {}", provider, model.api_name);
        backend
            .open(CompletionRequest {
                model: model.api_name.to_string(),
                api_key: request.api_key.clone(),
                system_instruction,
                messages: request.messages.clone(),
                max_tokens: request.max_tokens,
                thinking: model.is_thinking_model,
            })
            .await
    }

    /// Run a call to completion and return the concatenated output
    pub async fn generate_response(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut stream = self.stream(request).await?;
        let mut response = String::new();
        while let Some(fragment) = stream.next_fragment().await? {
            if fragment.is_final {
                break;
            }
            response.push_str(&fragment.text);
        }
        Ok(response)
    }

    /// Validate a credential with a minimal request
    pub async fn test_connection(&self, provider: &str, model: &str, api_key: &str) -> Result<(), LlmError> {
        let request = ChatRequest::new(provider, model, api_key)
            .message("Test")
            .max_tokens(1);
        self.generate_response(&request).await?;
        Ok(())
    }
}

impl Default for ProviderDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
