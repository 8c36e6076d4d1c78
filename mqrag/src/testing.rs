//! Deterministic stand-ins for external services.
//!
//! These run without network access or API keys. They back the crate's own
//! tests and the `policy_qa` example, and are public so downstream code can
//! test its own pipelines the same way.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{GenerationRequest, LanguageModel};

/// Bag-of-words embeddings: each lowercase alphanumeric word is hashed
/// (FNV-1a) into a bucket and the vector is L2-normalised.
///
/// Texts that share words get higher cosine similarity, which is enough to
/// make retrieval tests meaningful.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, word: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            embedding[self.bucket(word)] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// An embedding provider whose every call fails, as an unreachable service would.
#[derive(Debug, Clone)]
pub struct FailingEmbeddingProvider {
    dimensions: usize,
}

impl FailingEmbeddingProvider {
    /// Create a provider that reports `dimensions` and fails every call.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding {
            provider: "failing".into(),
            message: "connection refused".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A language model that replays queued replies and records every prompt.
///
/// Replies are consumed in order. When the queue is empty the fallback reply
/// is returned if one was set, otherwise the call fails.
#[derive(Debug, Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLanguageModel {
    /// Create a model with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failed call.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    /// Reply with `text` whenever the queue is empty.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    fn push(self, reply: std::result::Result<String, String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(RagError::generation("scripted", message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| RagError::generation("scripted", "no scripted reply left")),
        }
    }
}
