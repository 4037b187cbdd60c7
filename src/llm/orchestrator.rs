//! Drives one interactive call from request to sink

use super::{ChatRequest, ErrorKind, ProviderDispatcher};
use crate::storage::{ConfigStore, LocalConfig, ProviderStatus};
use tracing::{debug, warn};

/// Streams one call into caller-supplied sinks
///
/// A credential rejection for a provider with a configured key marks that
/// provider `invalid` in the store before the error is reported.
pub struct CallOrchestrator<'a, S: ConfigStore> {
    dispatcher: &'a ProviderDispatcher,
    store: &'a S,
}

impl<'a, S: ConfigStore> CallOrchestrator<'a, S> {
    pub fn new(dispatcher: &'a ProviderDispatcher, store: &'a S) -> Self {
        Self { dispatcher, store }
    }

    /// Run the call with the selected provider and model of `config`
    ///
    /// `on_data` receives every fragment, the terminal one included.
    /// `on_error` receives the error message, unmodified, at most once.
    pub async fn run<D, E>(
        &self,
        config: &LocalConfig,
        system_instruction: &str,
        messages: Vec<String>,
        mut on_data: D,
        on_error: E,
    ) where
        D: FnMut(&str, bool),
        E: FnOnce(&str),
    {
        let provider = config.provider_selected.as_str();
        let model = config.model_selected.as_deref().unwrap_or_default();
        let api_key = config.selected_api_key().unwrap_or_default();

        let request = ChatRequest::new(provider, model, api_key)
            .system(system_instruction)
            .messages(messages);

        let result = async {
            let mut stream = self.dispatcher.stream(&request).await?;
            while let Some(fragment) = stream.next_fragment().await? {
                on_data(&fragment.text, fragment.is_final);
                if fragment.is_final {
                    break;
                }
            }
            Ok::<(), super::LlmError>(())
        }
        .await;

        let Err(err) = result else {
            debug!("Call to {} completed", provider);
            return;
        };

        if err.kind == ErrorKind::Invalid && config.selected_api_key().is_some() {
            warn!("Credential for {} rejected, marking it invalid", provider);
            if let Err(e) = self.store.set_provider_status(provider, ProviderStatus::Invalid) {
                warn!("Failed to persist provider status: {:#}", e);
            }
        }
        on_error(&err.message);
    }
}
