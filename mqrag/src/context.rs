//! Context assembly: format retrieved passages into one prompt-ready block.

use crate::document::{Passage, RetrievalResult};
use crate::error::Result;
use crate::template::PromptTemplate;

/// Default per-passage template.
pub const DEFAULT_PASSAGE_TEMPLATE: &str = "SOURCE: {source}\nCONTENT: {content}";

/// Default separator placed between formatted passages.
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Formats retrieved passages with a template and joins them with a separator.
///
/// Available slots: `content`, `source`, `document_id`, `position`, `score`,
/// and every metadata key of the passage. Slots with no value render empty.
/// Passages are emitted in the order received; no truncation is applied.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    template: PromptTemplate,
    separator: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            template: PromptTemplate::parse(DEFAULT_PASSAGE_TEMPLATE)
                .unwrap_or_else(|_| PromptTemplate::literal(DEFAULT_PASSAGE_TEMPLATE)),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl ContextAssembler {
    /// Create an assembler with the default passage template and separator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom per-passage template.
    pub fn with_template(mut self, template: &str) -> Result<Self> {
        self.template = PromptTemplate::parse(template)?;
        Ok(self)
    }

    /// Text placed between consecutive passage blocks.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Format a single retrieved passage.
    pub fn format(&self, result: &RetrievalResult) -> String {
        let passage: &Passage = &result.passage;
        self.template.render_lenient(|slot| match slot {
            "content" => Some(passage.text.clone()),
            "source" => Some(passage.source().to_string()),
            "document_id" => Some(passage.document_id.clone()),
            "position" => Some(passage.position.to_string()),
            "score" => Some(format!("{:.4}", result.score)),
            key => passage.metadata.get(key).map(ToString::to_string),
        })
    }

    /// Format every result and join them into one block.
    pub fn assemble(&self, results: &[RetrievalResult]) -> String {
        results.iter().map(|r| self.format(r)).collect::<Vec<_>>().join(&self.separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, SOURCE_KEY};

    fn result(doc: Document, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult { passage: Passage::from_document(&doc, 0, text), score }
    }

    #[test]
    fn default_template_labels_sources_in_order() {
        let results = vec![
            result(
                Document::new("wfh", "").with_metadata(SOURCE_KEY, "Work From Home Policy"),
                "Effective: March 2020",
                0.8,
            ),
            result(Document::new("sales", ""), "The NASA sales team", 0.6),
        ];

        let context = ContextAssembler::new().assemble(&results);
        assert_eq!(
            context,
            "SOURCE: Work From Home Policy\nCONTENT: Effective: March 2020\n\n\
             SOURCE: sales\nCONTENT: The NASA sales team"
        );
    }

    #[test]
    fn custom_template_reads_metadata_and_score() {
        let doc = Document::new("d", "").with_metadata("title", "Handbook");
        let assembler = ContextAssembler::new()
            .with_template("[{title}|{missing}|{score}] {content}")
            .unwrap()
            .with_separator("\n---\n");

        let out = assembler.assemble(&[result(doc.clone(), "one", 0.5), result(doc, "two", 0.25)]);
        assert_eq!(out, "[Handbook||0.5000] one\n---\n[Handbook||0.2500] two");
    }

    #[test]
    fn empty_results_make_empty_context() {
        assert_eq!(ContextAssembler::new().assemble(&[]), "");
    }
}
