//! Prompt templates with named `{slot}` placeholders.
//!
//! `{{` and `}}` produce literal braces.

use std::collections::HashMap;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// A parsed prompt template.
///
/// # Example
///
/// ```rust,ignore
/// use std::collections::HashMap;
/// use mqrag::PromptTemplate;
///
/// let template = PromptTemplate::parse("Context:\n{context}\n\nQuestion: {question}")?;
/// template.require_slots(&["context", "question"])?;
/// let prompt = template.render(&HashMap::from([("context", ctx), ("question", q)]))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Template`] for an unclosed `{`, a stray `}`, or an
    /// empty or non-identifier slot name.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let source = text.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(RagError::Template(format!("unclosed slot at byte {pos}")));
                    }
                    let name = name.trim().to_string();
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
                    {
                        return Err(RagError::Template(format!(
                            "invalid slot name '{name}' at byte {pos}"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => {
                    return Err(RagError::Template(format!("unmatched '}}' at byte {pos}")));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// A template with no slots that renders `text` verbatim.
    pub fn literal(text: impl Into<String>) -> Self {
        let source = text.into();
        let segments = vec![Segment::Literal(source.clone())];
        Self { source, segments }
    }

    /// The template text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Slot names in order of first appearance.
    pub fn slots(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Fail unless every name in `required` appears as a slot.
    pub fn require_slots(&self, required: &[&str]) -> Result<()> {
        let slots = self.slots();
        let missing: Vec<&str> = required.iter().copied().filter(|r| !slots.contains(r)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RagError::Template(format!("template is missing slot(s): {}", missing.join(", "))))
        }
    }

    /// Fail if any slot is not one of `allowed`.
    pub fn allow_only_slots(&self, allowed: &[&str]) -> Result<()> {
        let unknown: Vec<&str> = self.slots().into_iter().filter(|s| !allowed.contains(s)).collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RagError::Template(format!(
                "template has unknown slot(s): {} (allowed: {})",
                unknown.join(", "),
                allowed.join(", ")
            )))
        }
    }

    /// Render with every slot bound.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Template`] if a slot has no value.
    pub fn render<V: AsRef<str>>(&self, values: &HashMap<&str, V>) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = values.get(name.as_str()).ok_or_else(|| {
                        RagError::Template(format!("no value for slot '{name}'"))
                    })?;
                    out.push_str(value.as_ref());
                }
            }
        }
        Ok(out)
    }

    /// Render, substituting an empty string for slots `lookup` cannot resolve.
    pub fn render_lenient<F>(&self, mut lookup: F) -> String
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slots_and_escapes() {
        let t = PromptTemplate::parse("{{json}} {question} / {context} / {question}").unwrap();
        assert_eq!(t.slots(), ["question", "context"]);
        let out = t.render(&HashMap::from([("question", "q"), ("context", "c")])).unwrap();
        assert_eq!(out, "{json} q / c / q");
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(PromptTemplate::parse("open {slot"), Err(RagError::Template(_))));
        assert!(matches!(PromptTemplate::parse("empty {}"), Err(RagError::Template(_))));
        assert!(matches!(PromptTemplate::parse("stray }"), Err(RagError::Template(_))));
        assert!(matches!(PromptTemplate::parse("{a b}"), Err(RagError::Template(_))));
    }

    #[test]
    fn strict_render_requires_every_slot() {
        let t = PromptTemplate::parse("{context}\n{question}").unwrap();
        let err = t.render(&HashMap::from([("context", "c")])).unwrap_err();
        assert!(err.to_string().contains("question"));
        assert!(t.require_slots(&["context", "question"]).is_ok());
        assert!(t.require_slots(&["context", "answer"]).is_err());
    }

    #[test]
    fn unknown_slots_are_named() {
        let t = PromptTemplate::parse("{question} in {lang}").unwrap();
        assert!(t.allow_only_slots(&["question", "lang"]).is_ok());
        let err = t.allow_only_slots(&["question", "count"]).unwrap_err();
        assert!(err.to_string().contains("lang"));
    }

    #[test]
    fn lenient_render_blanks_unknown_slots() {
        let t = PromptTemplate::parse("SOURCE: {source} ({title})").unwrap();
        let out = t.render_lenient(|name| (name == "source").then(|| "Handbook".to_string()));
        assert_eq!(out, "SOURCE: Handbook ()");
    }
}
