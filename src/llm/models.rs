//! Static registry of supported providers and models

use super::error::LlmError;
use serde::{Deserialize, Serialize};

/// A supported LLM backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    /// Every provider, in registry order
    pub const ALL: [Provider; 3] = [Provider::Gemini, Provider::OpenAi, Provider::Anthropic];

    /// Key used in configuration
    pub fn key(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }

    /// Parse a configuration key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Model metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Key used in configuration
    pub key: &'static str,
    /// Name sent to the provider API
    pub api_name: &'static str,
    pub display_name: &'static str,
    /// Maximum combined tokens of system instruction and messages
    pub context_window: u64,
    pub is_thinking_model: bool,
}

/// Provider metadata and its models
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub provider: Provider,
    pub display_name: &'static str,
    pub models: &'static [ModelSpec],
}

const fn model(
    key: &'static str,
    api_name: &'static str,
    display_name: &'static str,
    context_window: u64,
    is_thinking_model: bool,
) -> ModelSpec {
    ModelSpec {
        key,
        api_name,
        display_name,
        context_window,
        is_thinking_model,
    }
}

/// The registry
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        provider: Provider::Gemini,
        display_name: "Gemini",
        models: &[
            model("gemini-2.5-pro", "gemini-2.5-pro", "Gemini 2.5 Pro", 1_048_576, true),
            model("gemini-2.5-flash", "gemini-2.5-flash", "Gemini 2.5 Flash", 1_048_576, true),
            model("gemini-2.0-flash", "gemini-2.0-flash", "Gemini 2.0 Flash", 1_048_576, false),
        ],
    },
    ProviderSpec {
        provider: Provider::OpenAi,
        display_name: "OpenAI",
        models: &[
            model("gpt-4o", "gpt-4o", "GPT-4o", 128_000, false),
            model("gpt-4o-mini", "gpt-4o-mini", "GPT-4o Mini", 128_000, false),
            model("gpt-4.1", "gpt-4.1", "GPT-4.1", 1_047_576, false),
            model("gpt-4.1-mini", "gpt-4.1-mini", "GPT-4.1 Mini", 1_047_576, false),
            model("o3", "o3", "o3", 1_047_576, true),
            model("o3-mini", "o3-mini", "o3-mini", 200_000, true),
            model("o4-mini", "o4-mini", "o4-mini", 200_000, true),
        ],
    },
    ProviderSpec {
        provider: Provider::Anthropic,
        display_name: "Anthropic",
        models: &[
            model("claude-haiku-3-5", "claude-3-5-haiku-latest", "Claude 3.5 Haiku", 200_000, false),
            model("claude-sonnet-4-0", "claude-sonnet-4-0", "Claude 4 Sonnet", 200_000, true),
            model("claude-opus-4-1", "claude-opus-4-1", "Claude 4.1 Opus", 200_000, true),
        ],
    },
];

/// Registry entry for a provider
pub fn provider_spec(provider: Provider) -> &'static ProviderSpec {
    match provider {
        Provider::Gemini => &PROVIDERS[0],
        Provider::OpenAi => &PROVIDERS[1],
        Provider::Anthropic => &PROVIDERS[2],
    }
}

/// Resolve a provider key and model key
///
/// Fails with a `configuration` error when either is unknown.
pub fn lookup(provider: &str, model: &str) -> Result<(Provider, &'static ModelSpec), LlmError> {
    let provider = Provider::from_key(provider)
        .ok_or_else(|| LlmError::configuration(format!("Unknown provider: {}", provider)))?;

    let spec = provider_spec(provider)
        .models
        .iter()
        .find(|m| m.key == model)
        .ok_or_else(|| {
            LlmError::configuration(format!("Unknown model: {} for provider: {}", model, provider))
        })?;

    Ok((provider, spec))
}
