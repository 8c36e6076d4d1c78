//! Multi-query expansion.
//!
//! A [`QueryExpander`] turns one question into an [`ExpandedQuerySet`]: the
//! original plus paraphrases that widen recall. Expansion never fails the
//! request. When the model errors, misses its deadline or returns too few
//! usable paraphrases the set degrades to the original question alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::Query;
use crate::error::Result;
use crate::llm::{GenerationParams, GenerationRequest, LanguageModel};
use crate::template::PromptTemplate;

/// Default prompt used to ask the model for paraphrases.
pub const DEFAULT_EXPANSION_TEMPLATE: &str = "You are an AI language model assistant. Your task \
is to generate {count} different versions of the given user question to retrieve relevant \
documents from a vector database. By generating multiple perspectives on the user question, your \
goal is to help the user overcome some of the limitations of distance-based similarity search. \
Keep the core subject of the question. Provide these alternative questions separated by \
newlines, without numbering or commentary.\nOriginal question: {question}";

/// How an [`ExpandedQuerySet`] came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpansionOutcome {
    /// Enough usable variants were produced.
    Expanded,
    /// Expansion was not attempted.
    NotRequested,
    /// Generation failed or produced too few variants; only the original is used.
    Degraded { reason: String },
}

/// The ordered set of queries searched for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuerySet {
    /// The user's question.
    pub original: Query,
    /// Paraphrases, in the order the model produced them.
    pub variants: Vec<Query>,
    /// How the set was produced.
    pub outcome: ExpansionOutcome,
    include_original: bool,
}

impl ExpandedQuerySet {
    /// A set holding only the original question.
    pub fn original_only(original: Query, outcome: ExpansionOutcome) -> Self {
        Self { original, variants: Vec::new(), outcome, include_original: true }
    }

    /// A set of the original and its variants.
    pub fn expanded(original: Query, variants: Vec<Query>, include_original: bool) -> Self {
        Self { original, variants, outcome: ExpansionOutcome::Expanded, include_original }
    }

    /// Whether expansion fell back to the original question alone.
    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, ExpansionOutcome::Degraded { .. })
    }

    /// The queries to search: the original (when included, or when there are
    /// no variants) followed by the variants. Never empty.
    pub fn queries(&self) -> Vec<&Query> {
        let mut queries = Vec::with_capacity(self.variants.len() + 1);
        if self.include_original || self.variants.is_empty() {
            queries.push(&self.original);
        }
        queries.extend(self.variants.iter());
        queries
    }
}

/// Produces reformulations of a question.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand `question`. Infallible: problems degrade the result instead.
    async fn expand(&self, question: &Query) -> ExpandedQuerySet;
}

/// An expander that never paraphrases; retrieval behaves like plain RAG.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

#[async_trait]
impl QueryExpander for NoExpansion {
    async fn expand(&self, question: &Query) -> ExpandedQuerySet {
        ExpandedQuerySet::original_only(question.clone(), ExpansionOutcome::NotRequested)
    }
}

/// Asks a [`LanguageModel`] for paraphrases, one per line.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::LlmQueryExpander;
///
/// let expander = LlmQueryExpander::new(model).num_variants(3);
/// let set = expander.expand(&"what is the nasa sales team?".into()).await;
/// for query in set.queries() {
///     println!("{query}");
/// }
/// ```
pub struct LlmQueryExpander {
    model: Arc<dyn LanguageModel>,
    template: String,
    params: GenerationParams,
    num_variants: usize,
    min_variants: usize,
    include_original: bool,
    timeout: Option<Duration>,
}

impl LlmQueryExpander {
    /// Create an expander asking for three variants with the default prompt.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            template: DEFAULT_EXPANSION_TEMPLATE.to_string(),
            params: GenerationParams::deterministic(),
            num_variants: 3,
            min_variants: 3,
            include_original: true,
            timeout: None,
        }
    }

    /// Use a custom prompt. It must contain a `{question}` slot and may use
    /// `{count}`; any other slot is rejected.
    pub fn with_template(mut self, template: &str) -> Result<Self> {
        let parsed = PromptTemplate::parse(template)?;
        parsed.require_slots(&["question"])?;
        parsed.allow_only_slots(&["question", "count"])?;
        self.template = template.to_string();
        Ok(self)
    }

    /// Sampling parameters for the paraphrase call.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Number of variants to request. Also resets the minimum to the same value.
    pub fn num_variants(mut self, n: usize) -> Self {
        self.num_variants = n;
        self.min_variants = n;
        self
    }

    /// Fewest usable variants accepted before degrading to the original alone.
    pub fn min_variants(mut self, n: usize) -> Self {
        self.min_variants = n.min(self.num_variants);
        self
    }

    /// Whether the original question is searched alongside its variants.
    pub fn include_original(mut self, include: bool) -> Self {
        self.include_original = include;
        self
    }

    /// Deadline for the paraphrase call. A call that runs past it degrades
    /// the set like any other model failure.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn paraphrase(&self, prompt: String) -> std::result::Result<String, String> {
        let call = self.model.generate(GenerationRequest::new(prompt, self.params));
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| format!("model did not answer within {limit:?}"))?,
            None => call.await,
        };
        output.map_err(|e| e.to_string())
    }

    fn prompt(&self, question: &Query) -> Result<String> {
        let count = self.num_variants.to_string();
        PromptTemplate::parse(self.template.as_str())?
            .render(&HashMap::from([("question", question.as_str()), ("count", count.as_str())]))
    }

    fn degrade(question: &Query, reason: String) -> ExpandedQuerySet {
        warn!(question = %question, reason = %reason, "query expansion degraded to original question");
        ExpandedQuerySet::original_only(question.clone(), ExpansionOutcome::Degraded { reason })
    }
}

/// Strip list markers (`1.`, `2)`, `-`, `*`, `•`) and wrapping quotes from a line.
fn clean_line(line: &str) -> &str {
    let mut line = line.trim();

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && matches!(line[digits..].chars().next(), Some('.' | ')' | ':')) {
        line = line[digits + 1..].trim_start();
    } else if let Some(rest) = line.strip_prefix(&['-', '*', '•'][..]) {
        line = rest.trim_start();
    }

    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = line.strip_prefix(open).and_then(|l| l.strip_suffix(close)) {
            line = inner.trim();
            break;
        }
    }
    line
}

/// Parse model output into at most `limit` distinct, non-trivial variants.
pub fn parse_variants(output: &str, original: &Query, limit: usize) -> Vec<Query> {
    let original_key = original.as_str().trim().to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut variants = Vec::new();

    for line in output.lines() {
        if variants.len() == limit {
            break;
        }
        let cleaned = clean_line(line);
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_lowercase();
        if key == original_key || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        variants.push(Query::new(cleaned));
    }

    variants
}

#[async_trait]
impl QueryExpander for LlmQueryExpander {
    async fn expand(&self, question: &Query) -> ExpandedQuerySet {
        if self.num_variants == 0 {
            return ExpandedQuerySet::original_only(question.clone(), ExpansionOutcome::NotRequested);
        }

        let prompt = match self.prompt(question) {
            Ok(prompt) => prompt,
            Err(e) => return Self::degrade(question, e.to_string()),
        };

        let output = match self.paraphrase(prompt).await {
            Ok(output) => output,
            Err(reason) => return Self::degrade(question, reason),
        };

        let variants = parse_variants(&output, question, self.num_variants);
        if variants.len() < self.min_variants.max(1) {
            return Self::degrade(
                question,
                format!(
                    "model produced {} usable variant(s), {} required",
                    variants.len(),
                    self.min_variants.max(1)
                ),
            );
        }

        debug!(question = %question, variants = variants.len(), "expanded question");
        ExpandedQuerySet::expanded(question.clone(), variants, self.include_original)
    }
}
