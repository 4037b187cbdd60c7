//! Pull-based streaming abstraction shared by all providers

use super::error::LlmError;

/// Output budget used when the caller does not set one
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// One piece of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    /// Set on the single terminal fragment of a stream
    pub is_final: bool,
}

impl Fragment {
    /// A non-terminal text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// The terminal fragment
    pub fn terminal() -> Self {
        Self {
            text: String::new(),
            is_final: true,
        }
    }
}

/// A request as handed to a backend, after registry lookup and
/// context-window truncation
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Provider-side model name
    pub model: String,
    pub api_key: String,
    pub system_instruction: String,
    /// User messages, in order
    pub messages: Vec<String>,
    pub max_tokens: Option<u32>,
    /// Reasoning models take their output budget under a different name on
    /// some APIs
    pub thinking: bool,
}

impl CompletionRequest {
    /// Requested output budget or the default
    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

/// Lazy, finite, non-restartable output of one call
///
/// Yields text fragments, then exactly one fragment with `is_final` set,
/// then `None`. Nothing is read from the network until the next fragment
/// is requested; dropping the stream closes the connection.
#[async_trait::async_trait]
pub trait CompletionStream: Send {
    /// Pull the next fragment
    async fn next_fragment(&mut self) -> Result<Option<Fragment>, LlmError>;
}

/// A provider API able to open a completion stream
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Start a call; fails when the provider rejects the request
    async fn open(&self, request: CompletionRequest) -> Result<Box<dyn CompletionStream>, LlmError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend for tests that must not touch the network

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted step of a stream
    #[derive(Debug, Clone)]
    pub enum Step {
        Text(&'static str),
        Fail(LlmError),
    }

    /// Replays a script per call and records every request it receives
    #[derive(Clone, Default)]
    pub struct ScriptedBackend {
        scripts: Arc<Mutex<VecDeque<Result<Vec<Step>, LlmError>>>>,
        pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a call that streams the given steps
        pub fn then(self, steps: Vec<Step>) -> Self {
            self.scripts.lock().unwrap().push_back(Ok(steps));
            self
        }

        /// Queue a call that replies with the given text
        pub fn then_reply(self, text: &'static str) -> Self {
            self.then(vec![Step::Text(text)])
        }

        /// Queue a call rejected before streaming starts
        pub fn then_reject(self, err: LlmError) -> Self {
            self.scripts.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn recorded(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
        finished: bool,
    }

    #[async_trait::async_trait]
    impl CompletionStream for ScriptedStream {
        async fn next_fragment(&mut self) -> Result<Option<Fragment>, LlmError> {
            match self.steps.pop_front() {
                Some(Step::Text(text)) => Ok(Some(Fragment::text(text))),
                Some(Step::Fail(err)) => {
                    self.finished = true;
                    self.steps.clear();
                    Err(err)
                }
                None if !self.finished => {
                    self.finished = true;
                    Ok(Some(Fragment::terminal()))
                }
                None => Ok(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedBackend {
        async fn open(&self, request: CompletionRequest) -> Result<Box<dyn CompletionStream>, LlmError> {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))?;
            Ok(Box::new(ScriptedStream {
                steps: script.into(),
                finished: false,
            }))
        }
    }
}
