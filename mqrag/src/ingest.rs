//! Loading documents from JSON record feeds.
//!
//! A feed is either a JSON array of objects or JSON Lines (one object per
//! line). Each object becomes one [`Document`]: the content field is the
//! body and every other scalar or string-list field becomes metadata.
//! Malformed records are reported and skipped; they never abort the load.

use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::document::{Document, SOURCE_KEY};
use crate::error::{RagError, Result};
use crate::metadata::{Metadata, MetadataValue};

/// The outcome of loading a feed.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents built from well-formed records, in feed order.
    pub documents: Vec<Document>,
    /// One [`RagError::Ingestion`] per skipped record.
    pub errors: Vec<RagError>,
}

impl LoadReport {
    /// Number of records that were skipped.
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

/// Parses JSON record feeds into [`Document`]s.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::RecordLoader;
///
/// let report = RecordLoader::new("policies").content_key("content").load_path("policies.json")?;
/// for error in &report.errors {
///     eprintln!("skipped: {error}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RecordLoader {
    source_name: String,
    content_key: String,
    id_key: String,
}

impl RecordLoader {
    /// Create a loader for the feed named `source_name`.
    ///
    /// The name is used to derive document ids for records without one.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self { source_name: source_name.into(), content_key: "content".into(), id_key: "id".into() }
    }

    /// Set the field holding the document body (default `content`).
    pub fn content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = key.into();
        self
    }

    /// Set the field holding the document id (default `id`).
    pub fn id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = key.into();
        self
    }

    /// Load a feed from a file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ingestion`] only if the file cannot be read at
    /// all; bad records inside it are reported in the [`LoadReport`].
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RagError::Ingestion {
            record: path.display().to_string(),
            message: format!("failed to read feed: {e}"),
        })?;
        Ok(self.load_str(&text))
    }

    /// Load a feed from any reader.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ingestion`] if the reader fails or yields invalid UTF-8.
    pub fn load_reader(&self, mut reader: impl Read) -> Result<LoadReport> {
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|e| RagError::Ingestion {
            record: self.source_name.clone(),
            message: format!("failed to read feed: {e}"),
        })?;
        Ok(self.load_str(&text))
    }

    /// Load a feed held in memory.
    pub fn load_str(&self, text: &str) -> LoadReport {
        let mut report = LoadReport::default();

        let trimmed = text.trim_start();
        if trimmed.starts_with('[') {
            match serde_json::from_str::<Vec<Value>>(trimmed) {
                Ok(records) => {
                    for (index, record) in records.iter().enumerate() {
                        self.push_record(&mut report, index, record);
                    }
                }
                Err(e) => report.errors.push(RagError::Ingestion {
                    record: self.source_name.clone(),
                    message: format!("feed is not a valid JSON array: {e}"),
                }),
            }
        } else {
            let lines = text.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());
            for (index, line) in lines {
                match serde_json::from_str::<Value>(line) {
                    Ok(record) => self.push_record(&mut report, index, &record),
                    Err(e) => report.errors.push(RagError::Ingestion {
                        record: index.to_string(),
                        message: format!("invalid JSON: {e}"),
                    }),
                }
            }
        }

        for error in &report.errors {
            warn!(feed = %self.source_name, error = %error, "skipped malformed record");
        }
        info!(
            feed = %self.source_name,
            documents = report.documents.len(),
            skipped = report.skipped(),
            "loaded feed"
        );

        report
    }

    fn push_record(&self, report: &mut LoadReport, index: usize, record: &Value) {
        match self.parse_record(index, record) {
            Ok(document) => report.documents.push(document),
            Err(e) => report.errors.push(e),
        }
    }

    /// Convert one record into a document.
    pub fn parse_record(&self, index: usize, record: &Value) -> Result<Document> {
        let malformed = |message: &str| RagError::Ingestion {
            record: index.to_string(),
            message: message.to_string(),
        };

        let object = record.as_object().ok_or_else(|| malformed("record is not an object"))?;
        let content = match object.get(&self.content_key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => return Err(malformed("content is blank")),
            Some(_) => {
                return Err(malformed(&format!("field '{}' is not a string", self.content_key)));
            }
            None => return Err(malformed(&format!("missing field '{}'", self.content_key))),
        };

        let id = match object.get(&self.id_key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("{}-{index}", self.source_name),
        };

        let mut metadata: Metadata = object
            .iter()
            .filter(|(key, _)| *key != &self.content_key && *key != &self.id_key)
            .filter_map(|(key, value)| MetadataValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        metadata.entry(SOURCE_KEY.to_string()).or_insert_with(|| self.source_name.clone().into());

        Ok(Document::new(id, content).with_metadata_map(metadata))
    }
}
