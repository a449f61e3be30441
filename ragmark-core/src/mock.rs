//! Deterministic mock providers for tests and offline demos.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generation::AnswerGenerator;

/// A deterministic hash-based embedding provider.
///
/// Maps text to a unit vector derived from a rolling hash — stable across
/// runs and processes, no network, no model weights. Similarity values
/// are meaningless, but identical texts embed identically, which is all
/// the pipeline tests need.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            *v = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock-embedding"
    }
}

/// A scripted answer generator.
///
/// Returns queued responses in order, falling back to a default response
/// when the queue is empty. Records every prompt it receives so tests can
/// assert on prompt assembly.
pub struct MockGenerator {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Create a generator that always returns `default_response`.
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: default_response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response to return before falling back to the default.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    /// All prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// The most recent prompt, if any call happened.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let queued = self.responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.default_response.clone()))
    }

    fn name(&self) -> &str {
        "mock-generator"
    }
}
