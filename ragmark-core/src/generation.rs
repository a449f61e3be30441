//! Answer generator trait.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a prompt into free-text output.
///
/// Implementations wrap hosted or local LLM backends; `ragmark-model`
/// provides Ollama and OpenAI-compatible adapters.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate a completion for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A stable identifier for this generator and model.
    fn name(&self) -> &str;
}
