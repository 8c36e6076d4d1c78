//! Configuration for the question-answering pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::llm::GenerationParams;

/// Configuration parameters for the pipeline.
///
/// Service endpoints and credentials are not part of the configuration;
/// they are given to the backend constructors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Passage length in tokens.
    pub chunk_size: usize,
    /// Tokens shared by consecutive passages.
    pub chunk_overlap: usize,
    /// Results requested from the index for each expanded query.
    pub per_query_k: usize,
    /// Cap on the merged result set. `None` keeps every merged result.
    pub max_results: Option<usize>,
    /// Merged results scoring below this value are dropped. `None` keeps
    /// every merged result, including negative similarities.
    pub similarity_threshold: Option<f32>,
    /// Paraphrases to request. `0` disables expansion.
    pub num_variants: usize,
    /// Fewest usable paraphrases accepted before falling back to the original question.
    pub min_variants: usize,
    /// Whether the original question is searched alongside its paraphrases.
    pub include_original: bool,
    /// Sampling parameters for query expansion.
    pub expansion: GenerationParams,
    /// Sampling parameters for the answer.
    pub answer: GenerationParams,
    /// Deadline for each stage, in milliseconds.
    pub stage_timeout_ms: Option<u64>,
    /// Deadline for a whole `ask` call, in milliseconds.
    pub request_timeout_ms: Option<u64>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 400,
            per_query_k: 4,
            max_results: None,
            similarity_threshold: None,
            num_variants: 3,
            min_variants: 3,
            include_original: true,
            expansion: GenerationParams::deterministic(),
            answer: GenerationParams::deterministic(),
            stage_timeout_ms: Some(30_000),
            request_timeout_ms: Some(120_000),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse a JSON document and validate it. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the JSON is malformed or a value is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RagError::Config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The per-stage deadline, if any.
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    /// The whole-request deadline, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `per_query_k == 0` or `max_results == Some(0)`
    /// - `min_variants` is outside `1..=num_variants` while expansion is enabled
    /// - `similarity_threshold` is set but not finite
    /// - a timeout is set to zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.per_query_k == 0 {
            return Err(RagError::Config("per_query_k must be greater than zero".to_string()));
        }
        if self.max_results == Some(0) {
            return Err(RagError::Config(
                "max_results must be greater than zero when set".to_string(),
            ));
        }
        if self.num_variants > 0 && !(1..=self.num_variants).contains(&self.min_variants) {
            return Err(RagError::Config(format!(
                "min_variants ({}) must be between 1 and num_variants ({})",
                self.min_variants, self.num_variants
            )));
        }
        if let Some(threshold) = self.similarity_threshold.filter(|t| !t.is_finite()) {
            return Err(RagError::Config(format!(
                "similarity_threshold must be finite, got {threshold}"
            )));
        }
        if self.stage_timeout_ms == Some(0) || self.request_timeout_ms == Some(0) {
            return Err(RagError::Config("timeouts must be greater than zero when set".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the passage length in tokens.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive passages in tokens.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results requested per expanded query.
    pub fn per_query_k(mut self, k: usize) -> Self {
        self.config.per_query_k = k;
        self
    }

    /// Cap the merged result set.
    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = Some(max);
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the number of paraphrases to request. Also sets `min_variants`
    /// to the same value (at least one).
    pub fn num_variants(mut self, n: usize) -> Self {
        self.config.num_variants = n;
        self.config.min_variants = n.max(1);
        self
    }

    /// Accept fewer paraphrases than requested before falling back.
    pub fn min_variants(mut self, n: usize) -> Self {
        self.config.min_variants = n;
        self
    }

    /// Search the original question alongside its paraphrases.
    pub fn include_original(mut self, include: bool) -> Self {
        self.config.include_original = include;
        self
    }

    /// Sampling parameters for the paraphrase call.
    pub fn expansion_params(mut self, params: GenerationParams) -> Self {
        self.config.expansion = params;
        self
    }

    /// Sampling parameters for the answer call.
    pub fn answer_params(mut self, params: GenerationParams) -> Self {
        self.config.answer = params;
        self
    }

    /// Set the per-stage deadline. `None` disables it.
    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.stage_timeout_ms = timeout.map(duration_millis);
        self
    }

    /// Set the whole-request deadline. `None` disables it.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout_ms = timeout.map(duration_millis);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] as described in [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
