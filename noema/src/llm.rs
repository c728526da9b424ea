//! The LLM collaborator contract.
//!
//! The core never talks to a concrete provider; it calls through this
//! trait, the same shape as the teacher's `ChatProvider::chat` async-trait
//! boundary, collapsed to a single text-completion method since the core
//! has no use for streaming or tool-call messages.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// Per-call generation knobs.
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Per-call timeout, enforced by the caller via `tokio::time::timeout`.
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A text-completion capability. Retry policy is applied by callers in
/// this crate, not by the adapter.
#[async_trait]
pub trait LlmClient: Send + Sync + std::fmt::Debug {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, opts: GenerateOptions) -> Result<String, LlmError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{GenerateOptions, LlmClient, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A scripted LLM that returns queued responses in order, recording
    /// every prompt it was asked to complete.
    #[derive(Debug, Default)]
    pub struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(
            &self,
            prompt: &str,
            _opts: GenerateOptions,
        ) -> Result<String, LlmError> {
            self.prompts
                .lock()
                .expect("lock poisoned")
                .push(prompt.to_string());
            let mut responses = self.responses.lock().expect("lock poisoned");
            if responses.is_empty() {
                return Ok(String::new());
            }
            responses.remove(0)
        }
    }
}
