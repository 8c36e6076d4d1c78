//! Answer generation from an assembled context.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::document::Query;
use crate::error::{RagError, Result};
use crate::llm::{GenerationParams, GenerationRequest, LanguageModel};
use crate::template::PromptTemplate;

/// Default answer prompt. The model is told to rely on the context only.
pub const DEFAULT_ANSWER_TEMPLATE: &str = "Answer the question based only on the following \
context. If the context does not contain the answer, say that you don't know.\n\n\
{context}\n\nQuestion: {question}";

/// Slots every answer template must contain.
const REQUIRED_SLOTS: [&str; 2] = ["context", "question"];

/// Calls a [`LanguageModel`] once with the context and the original question.
///
/// There is no retry: a failed or blank completion is returned to the caller
/// as [`RagError::Generation`].
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    template: String,
    params: GenerationParams,
}

impl std::fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("model", &self.model.name())
            .field("template", &self.template)
            .field("params", &self.params)
            .finish()
    }
}

impl AnswerGenerator {
    /// Create a generator with the default answer template and deterministic sampling.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            template: DEFAULT_ANSWER_TEMPLATE.to_string(),
            params: GenerationParams::deterministic(),
        }
    }

    /// Use a custom prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Template`] if the template is malformed or lacks
    /// a `{context}` or `{question}` slot.
    pub fn with_template(mut self, template: &str) -> Result<Self> {
        let parsed = PromptTemplate::parse(template)?;
        parsed.require_slots(&REQUIRED_SLOTS)?;
        parsed.allow_only_slots(&REQUIRED_SLOTS)?;
        self.template = template.to_string();
        Ok(self)
    }

    /// Sampling parameters for the answer call.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// The model answers are requested from.
    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Render the prompt for `context` and `question`.
    pub fn prompt(&self, context: &str, question: &Query) -> Result<String> {
        PromptTemplate::parse(self.template.as_str())?
            .render(&HashMap::from([("context", context), ("question", question.as_str())]))
    }

    /// Generate an answer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the model call fails or the
    /// completion is blank.
    pub async fn generate(&self, context: &str, question: &Query) -> Result<String> {
        let prompt = self.prompt(context, question)?;
        let model = self.model.name().to_string();

        let answer =
            self.model.generate(GenerationRequest::new(prompt, self.params)).await.map_err(|e| {
                error!(model = %model, error = %e, "answer generation failed");
                match e {
                    RagError::Generation { .. } => e,
                    other => RagError::generation(model.as_str(), other.to_string()),
                }
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            error!(model = %model, "model returned an empty answer");
            return Err(RagError::generation(model, "model returned an empty answer"));
        }

        info!(model = %model, answer_len = answer.len(), "answer generated");
        Ok(answer.to_string())
    }
}
