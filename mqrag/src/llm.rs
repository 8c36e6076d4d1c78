//! Language model abstraction used for query expansion and answering.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling parameters sent with a generation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature. `None` leaves the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate. `None` leaves the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationParams {
    /// Deterministic decoding (`temperature = 0`).
    pub fn deterministic() -> Self {
        Self { temperature: Some(0.0), max_output_tokens: None }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap the length of the generated text.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// A single prompt sent to a [`LanguageModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Create a request for `prompt`.
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self { prompt: prompt.into(), params }
    }
}

/// An external text-generation endpoint.
///
/// Implementations perform exactly one outbound call per
/// [`generate`](LanguageModel::generate) and do not retry; failures are
/// returned as [`RagError::Generation`](crate::RagError::Generation).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate text for the prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}
